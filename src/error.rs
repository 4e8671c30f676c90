use std::path::PathBuf;

use thiserror::Error;

/// The settings file could not be turned into a [`Settings`](crate::settings::Settings) value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("invalid value for `{key}` in {}: {reason}", .path.display())]
    Invalid {
        path: PathBuf,
        key: &'static str,
        reason: String,
    },
}

/// The results file is missing, malformed, or not a JUnit report.
#[derive(Debug, Error)]
pub enum ReportParseError {
    #[error("failed to read results file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed results XML{}", location(.path))]
    Xml {
        path: Option<PathBuf>,
        #[source]
        source: quick_xml::DeError,
    },
    #[error("results file has no root element{}", location(.path))]
    NoRoot { path: Option<PathBuf> },
    #[error("unexpected root element <{root}>{}, expected <testsuites> or <testsuite>", location(.path))]
    Schema { path: Option<PathBuf>, root: String },
}

impl ReportParseError {
    /// Attach the file the XML came from, for errors raised while parsing a string.
    pub fn with_path(self, file: &std::path::Path) -> Self {
        match self {
            ReportParseError::Xml { source, .. } => ReportParseError::Xml {
                path: Some(file.to_path_buf()),
                source,
            },
            ReportParseError::Schema { root, .. } => ReportParseError::Schema {
                path: Some(file.to_path_buf()),
                root,
            },
            ReportParseError::NoRoot { .. } => ReportParseError::NoRoot {
                path: Some(file.to_path_buf()),
            },
            other => other,
        }
    }
}

fn location(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" in {}", p.display()),
        None => String::new(),
    }
}

/// Content that cannot be placed into a storage-format page.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{field} of test `{test}` contains control character U+{code:04X}, which XML cannot carry")]
    IllegalCharacter {
        test: String,
        field: &'static str,
        code: u32,
    },
    #[error("failed to write page markup")]
    Write(#[from] std::io::Error),
    #[error("page markup is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// The page could not be created or updated.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("{method} {url} failed")]
    Transport {
        method: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("authentication rejected by {url} (HTTP {status})")]
    Auth { url: String, status: u16 },
    #[error("{method} {url} returned HTTP {status}: {message}")]
    Remote {
        method: &'static str,
        url: String,
        status: u16,
        message: String,
    },
    #[error("parent page `{title}` not found in space {space}")]
    ParentNotFound { space: String, title: String },
    #[error("unexpected response from {url}: {message}")]
    Response { url: String, message: String },
}
