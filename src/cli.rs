use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::results::DEFAULT_XML_PATH;
use crate::settings::DEFAULT_SETTINGS_PATH;

#[derive(Parser, Debug)]
#[command(
    name = "confluence-report",
    about = "Publish pytest JUnit results to a Confluence page"
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run at the end of a test session: publish the results when upload is requested
    Finalize {
        /// Convert pytest results into a Confluence page
        #[arg(long = "confluence-upload", visible_alias = "cu")]
        confluence_upload: bool,

        /// Path to Confluence settings file
        #[arg(
            long = "confluence-settings",
            visible_alias = "cs",
            default_value = DEFAULT_SETTINGS_PATH
        )]
        confluence_settings: PathBuf,

        /// Path to pytest XML file
        #[arg(long = "pytest-xml-path", visible_alias = "px", default_value = DEFAULT_XML_PATH)]
        pytest_xml_path: PathBuf,
    },

    /// Render the page body without publishing it
    Render {
        /// Path to pytest XML file
        #[arg(long = "pytest-xml-path", visible_alias = "px", default_value = DEFAULT_XML_PATH)]
        pytest_xml_path: PathBuf,

        /// Write the body to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print a per-test summary of the results file
    Summary {
        /// Path to pytest XML file
        #[arg(long = "pytest-xml-path", visible_alias = "px", default_value = DEFAULT_XML_PATH)]
        pytest_xml_path: PathBuf,

        /// Also write the parsed summary as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
    },
}
