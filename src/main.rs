mod cli;
mod confluence;
mod error;
mod logging;
#[cfg(test)]
mod mock_server;
mod plugin;
mod progress;
mod render;
mod results;
mod settings;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use confluence::PublishOutcome;
use plugin::FinalizeOutcome;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Finalize {
            confluence_upload,
            confluence_settings,
            pytest_xml_path,
        } => {
            if cli.verbose {
                eprintln!("{}", plugin::report_header());
            }
            match plugin::finalize(&pytest_xml_path, &confluence_settings, confluence_upload).await
            {
                Ok(FinalizeOutcome::Skipped) => std::process::exit(0),
                Ok(FinalizeOutcome::Published(PublishOutcome::Created { id })) => {
                    eprintln!("Created Confluence page {id}");
                    std::process::exit(0);
                }
                Ok(FinalizeOutcome::Published(PublishOutcome::Updated { id, version })) => {
                    eprintln!("Updated Confluence page {id} to version {version}");
                    std::process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: confluence upload failed (test results unaffected): {e:#}");
                    std::process::exit(2);
                }
            }
        }
        Commands::Render {
            pytest_xml_path,
            output,
        } => match run_render(&pytest_xml_path, output.as_deref()) {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("Error: {e:#}");
                std::process::exit(2);
            }
        },
        Commands::Summary {
            pytest_xml_path,
            json,
        } => match run_summary(&pytest_xml_path, json.as_deref()) {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("Error: {e:#}");
                std::process::exit(2);
            }
        },
    }
}

fn run_render(xml_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let summary = results::parse_junit_xml(xml_path)?;
    let body = render::render_page(&summary)?;
    match output {
        Some(path) => std::fs::write(path, body.as_str())
            .with_context(|| format!("Failed to write page body to {}", path.display()))?,
        None => println!("{body}"),
    }
    Ok(())
}

fn run_summary(xml_path: &Path, json: Option<&Path>) -> anyhow::Result<()> {
    let summary = results::parse_junit_xml(xml_path)?;
    results::print_results(&summary);
    if let Some(path) = json {
        results::write_json(&summary, path)?;
        eprintln!("Results written to {}", path.display());
    }
    Ok(())
}
