//! Configuration management for the tracker.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default Identity Toolkit endpoint (override at compile time via TRACKER_AUTH_API_URL).
pub const DEFAULT_AUTH_API_URL: &str = match option_env!("TRACKER_AUTH_API_URL") {
    Some(url) => url,
    None => "https://identitytoolkit.googleapis.com/v1",
};

/// Default Realtime Database URL (override at compile time via TRACKER_DATABASE_URL).
pub const DEFAULT_DATABASE_URL: &str = match option_env!("TRACKER_DATABASE_URL") {
    Some(url) => url,
    None => "https://expense-tracker-default-rtdb.firebaseio.com",
};

/// Default web API key (override at compile time via TRACKER_API_KEY).
pub const DEFAULT_API_KEY: &str = match option_env!("TRACKER_API_KEY") {
    Some(key) => key,
    None => "",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Ledger total above which the premium offer is shown.
pub const DEFAULT_PREMIUM_THRESHOLD: u64 = 10_000;

/// Default cadence for the live ledger refresh loop.
pub const DEFAULT_LIVE_REFRESH_SECS: u64 = 30;

/// Main tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the auth provider REST API.
    #[serde(default = "default_auth_api_url")]
    pub auth_api_url: String,
    /// Public web API key sent with auth provider requests.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Base URL of the remote ledger store.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Ledger total that makes the premium offer available.
    #[serde(default = "default_premium_threshold")]
    pub premium_threshold: u64,
    /// Seconds between live ledger refreshes.
    #[serde(default = "default_live_refresh_secs")]
    pub live_refresh_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_auth_api_url() -> String {
    DEFAULT_AUTH_API_URL.to_string()
}

fn default_api_key() -> String {
    DEFAULT_API_KEY.to_string()
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_premium_threshold() -> u64 {
    DEFAULT_PREMIUM_THRESHOLD
}

fn default_live_refresh_secs() -> u64 {
    DEFAULT_LIVE_REFRESH_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            auth_api_url: default_auth_api_url(),
            api_key: default_api_key(),
            database_url: default_database_url(),
            premium_threshold: DEFAULT_PREMIUM_THRESHOLD,
            live_refresh_secs: DEFAULT_LIVE_REFRESH_SECS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file (if present), then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Reject configurations the runtime cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        self.auth_api_url()?;
        self.database_url()?;
        if self.premium_threshold == 0 {
            return Err(CoreError::Config(
                "premium_threshold must be greater than zero".to_string(),
            ));
        }
        if self.live_refresh_secs == 0 {
            return Err(CoreError::Config(
                "live_refresh_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Some(level) = env_override("TRACKER_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(key) = env_override("TRACKER_API_KEY") {
            self.api_key = key;
        }
        if let Some(url) = env_override("TRACKER_DATABASE_URL") {
            self.database_url = url;
        }
    }

    /// The auth provider base URL, parsed.
    pub fn auth_api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.auth_api_url).map_err(CoreError::from)
    }

    /// The ledger store base URL, parsed.
    pub fn database_url(&self) -> CoreResult<Url> {
        Url::parse(&self.database_url).map_err(CoreError::from)
    }
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.auth_api_url, DEFAULT_AUTH_API_URL);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.premium_threshold, 10_000);
        assert_eq!(config.live_refresh_secs, 30);
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(
            &config_path,
            r#"{ "log_level": "debug", "premium_threshold": 500 }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.premium_threshold, 500);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            database_url: "https://ledger-test.firebaseio.com".to_string(),
            live_refresh_secs: 5,
            ..Config::default()
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.auth_api_url, DEFAULT_AUTH_API_URL);
    }

    #[test]
    fn test_config_invalid_url() {
        let config = Config {
            database_url: "not a valid url".to_string(),
            ..Config::default()
        };

        assert!(config.database_url().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_zero_threshold() {
        let config = Config {
            premium_threshold: 0,
            ..Config::default()
        };

        match config.validate() {
            Err(CoreError::Config(msg)) => assert!(msg.contains("premium_threshold")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_urls_parse() {
        let config = Config::default();
        assert_eq!(config.auth_api_url().unwrap().scheme(), "https");
        assert_eq!(config.database_url().unwrap().scheme(), "https");
    }
}
