use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Settings file read when `--confluence-settings` is not given.
pub const DEFAULT_SETTINGS_PATH: &str = "settings.yml";

/// HTTP timeout applied to every request when the settings file does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection and target-page settings for one run.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub url: String,
    pub credential: Credential,
    pub space: String,
    pub page: PageTarget,
    pub timeout_secs: u64,
}

/// HTTP basic credentials. The secret never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub token: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("url", &self.url)
            .field("credential", &self.credential)
            .field("space", &self.space)
            .field("page", &self.page)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTarget {
    pub title: String,
    /// Title of the page new pages are created under.
    pub parent: Option<String>,
}

// --- On-disk shape ---

#[derive(Debug, Deserialize)]
struct SettingsFile {
    confluence: RawSettings,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    url: String,
    username: String,
    #[serde(alias = "password")]
    token: String,
    space: String,
    page: RawPage,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPage {
    title: String,
    #[serde(default)]
    parent: Option<String>,
}

/// Load settings from a YAML file (or TOML, when the extension is `.toml`).
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let parsed: SettingsFile = if is_toml(path) {
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    } else {
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };

    validate(parsed.confluence, path)
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn validate(raw: RawSettings, path: &Path) -> Result<Settings, ConfigError> {
    let invalid = |key: &'static str, reason: &str| ConfigError::Invalid {
        path: path.to_path_buf(),
        key,
        reason: reason.to_string(),
    };

    let url = raw.url.trim().trim_end_matches('/').to_string();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(invalid("url", "must start with http:// or https://"));
    }

    let required = [
        ("username", &raw.username),
        ("token", &raw.token),
        ("space", &raw.space),
        ("page.title", &raw.page.title),
    ];
    for (key, value) in required {
        if value.trim().is_empty() {
            return Err(invalid(key, "must not be empty"));
        }
    }

    let timeout_secs = raw.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(invalid("timeout_secs", "must be greater than zero"));
    }

    let parent = raw.page.parent.filter(|p| !p.trim().is_empty());

    Ok(Settings {
        url,
        credential: Credential {
            username: raw.username,
            token: raw.token,
        },
        space: raw.space,
        page: PageTarget {
            title: raw.page.title,
            parent,
        },
        timeout_secs,
    })
}
