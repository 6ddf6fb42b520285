//! Client configuration
//!
//! Settings are read from a JSON file in the system's standard config
//! directory. Every setting has a default, so a missing file or missing
//! keys are fine.

use crate::transport::RetryPolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default XML-RPC endpoint of the subtitle service
pub const DEFAULT_SERVER_URL: &str = "https://api.opensubtitles.org/xml-rpc";

/// User agent the service accepts for testing and development
pub const DEFAULT_USER_AGENT: &str = "TemporaryUserAgent";

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to determine the config directory location
    #[error("Failed to determine config directory location")]
    ConfigDirectoryNotFound,

    /// Failed to read the config file
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the config file
    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Settings for connecting to the subtitle service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// URL of the XML-RPC endpoint
    pub server_url: String,
    /// User agent registered with the service
    pub user_agent: String,
    /// ISO 639 two-letter code for server messages
    pub language: String,
    /// Timeout for a single request in seconds
    pub timeout_secs: u64,
    /// Retry policy for transient network failures
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            language: "en".to_string(),
            timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Loads the configuration from a JSON file
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ClientConfig::load(Path::new("config.json"))?;
    /// ```
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Loads the configuration from the default location
    ///
    /// Falls back to the defaults if no config file exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path()?;
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(&path)
    }
}

/// Returns the platform-specific config file path
///
/// - Linux: ~/.config/subtitlesleuth/config.json
/// - macOS: ~/Library/Application Support/de.westhoffswelt.subtitlesleuth/config.json
/// - Windows: %APPDATA%\westhoffswelt\subtitlesleuth\config\config.json
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let proj_dirs = directories::ProjectDirs::from("de", "westhoffswelt", "subtitlesleuth")
        .ok_or(ConfigError::ConfigDirectoryNotFound)?;

    Ok(proj_dirs.config_dir().join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"user_agent": "MyPlayer v1", "retry": {{"max_retries": 5, "initial_backoff": 100}}}}"#
        )
        .unwrap();

        let config = ClientConfig::load(file.path()).unwrap();

        assert_eq!(config.user_agent, "MyPlayer v1");
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(100));
        assert_eq!(config.retry.max_backoff, RetryPolicy::default().max_backoff);
    }

    #[test]
    fn test_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(matches!(
            ClientConfig::load(file.path()),
            Err(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn test_missing_config_file() {
        assert!(matches!(
            ClientConfig::load(Path::new("/nonexistent/config.json")),
            Err(ConfigError::ReadFailed { .. })
        ));
    }
}
