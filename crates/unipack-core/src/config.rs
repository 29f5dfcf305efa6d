//! Process-wide configuration.
//!
//! The configuration is resolved once at the process boundary (file, then
//! environment, then CLI flags) and handed to the core explicitly. Nothing in
//! the core reads it from ambient state.
//!
//! ```text
//! ~/.unipack/
//! ├── config.toml   # this file
//! └── cache/        # downloaded archives and cached remote indexes
//! ```

use crate::error::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use unipack_schema::{AuthConfig, LogType};

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "UNIPACK_HOME";
/// Environment variable overriding the log type.
pub const LOG_TYPE_ENV: &str = "UNIPACK_LOG_TYPE";
/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "UNIPACK_LOG_LEVEL";

/// Returns the home directory, or None if the user's home cannot be resolved.
pub fn try_unipack_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var(HOME_ENV) {
        return Some(PathBuf::from(val));
    }
    dirs::home_dir().map(|h| h.join(".unipack"))
}

/// Logger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub level: String,
    /// Output style; also selects the process tree renderer.
    #[serde(rename = "type")]
    pub log_type: LogType,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_type: LogType::Fancy,
        }
    }
}

/// Catalog index sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Index locations: local file paths or http(s) URLs.
    pub sources: Vec<String>,
}

/// Resolved configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logger settings.
    pub log: LogConfig,
    /// Registry credentials, passed through to catalog pulls.
    pub auth: AuthConfig,
    /// Catalog settings.
    pub catalog: CatalogConfig,
    /// Home directory; not read from the file.
    #[serde(skip)]
    pub home: PathBuf,
}

impl Config {
    /// Load `config.toml` from `home`, or defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(home: &Path) -> Result<Self> {
        let path = home.join("config.toml");
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Config::default()
        };
        config.home = home.to_path_buf();
        Ok(config)
    }

    /// Apply overrides from environment lookups.
    ///
    /// Takes the lookup as a function so callers (and tests) decide where the
    /// values come from.
    ///
    /// # Errors
    ///
    /// Returns a usage error if `UNIPACK_LOG_TYPE` names no known log type.
    /// Nothing is applied in that case.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let log_type = match lookup(LOG_TYPE_ENV) {
            Some(raw) => Some(
                raw.parse::<LogType>()
                    .map_err(|e| Error::usage(format!("invalid {LOG_TYPE_ENV}: {e}")))?,
            ),
            None => None,
        };
        if let Some(t) = log_type {
            self.log.log_type = t;
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV) {
            self.log.level = level;
        }
        Ok(())
    }

    /// Cache directory: `<home>/cache`
    pub fn cache_path(&self) -> PathBuf {
        self.home.join("cache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.log.log_type, LogType::Fancy);
        assert_eq!(config.log.level, "info");
        assert!(config.catalog.sources.is_empty());
        assert_eq!(config.cache_path(), dir.path().join("cache"));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
            [log]
            type = "basic"

            [catalog]
            sources = ["https://index.example.com/index.toml"]

            [auth."index.example.com"]
            user = "ci"
            token = "abc"
            "#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.log.log_type, LogType::Basic);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.catalog.sources.len(), 1);
        assert_eq!(config.auth.for_host("index.example.com").unwrap().user, "ci");
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "log = 3").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            LOG_TYPE_ENV => Some("basic".to_string()),
            LOG_LEVEL_ENV => Some("debug".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.log.log_type, LogType::Basic);
        assert_eq!(config.log.level, "debug");

        let err = config
            .apply_env(|key| match key {
                LOG_TYPE_ENV => Some("nonsense".to_string()),
                LOG_LEVEL_ENV => Some("trace".to_string()),
                _ => None,
            })
            .unwrap_err();
        assert!(err.is_usage());
        assert!(err.to_string().contains("invalid UNIPACK_LOG_TYPE"));
        assert_eq!(config.log.log_type, LogType::Basic);
        assert_eq!(config.log.level, "debug");
    }
}
