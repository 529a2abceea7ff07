//! Bootstrap configuration loaded before the database is opened.
//!
//! Runtime options (labels, tracking, icon style, ...) live in the `options`
//! table and are handled by [`Settings`](crate::Settings). This file only holds
//! what is needed to find the database and the upload directory.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_MAX_CONNECTIONS};

/// Default cache lifetime for query results (one hour).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`LibraryConfig`].
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    Invalid {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// File library bootstrap configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Directory that holds the upload folder.
    pub uploads_dir: PathBuf,
    /// Public URL of `uploads_dir`.
    pub base_url: String,
    /// Public URL of the site, used for the export filename.
    pub site_url: String,
    /// Public URL of the bundled icon images.
    pub assets_url: String,
    /// Prefix for the download log table name.
    pub table_prefix: String,
    /// Secret mixed into request nonces.
    pub nonce_secret: String,
    /// Query cache lifetime in seconds.
    pub cache_ttl_secs: u64,
    /// Database pool max connections (1..=20).
    pub db_max_connections: u32,
    /// Database busy timeout in milliseconds (0..=120000).
    pub db_busy_timeout_ms: u32,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("file-library.db"),
            uploads_dir: PathBuf::from("uploads"),
            base_url: "http://localhost/uploads".to_string(),
            site_url: "http://localhost".to_string(),
            assets_url: "http://localhost/erifl-assets/".to_string(),
            table_prefix: String::new(),
            nonce_secret: "change-me".to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            db_max_connections: DEFAULT_MAX_CONNECTIONS,
            db_busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl LibraryConfig {
    /// Parses a TOML document and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, plus the
    /// errors of [`LibraryConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Validates config values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self
            .table_prefix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ConfigError::Invalid {
                field: "table_prefix",
                value: self.table_prefix.clone(),
                expected: "characters in [a-z0-9_]",
            });
        }
        if !(1..=86_400).contains(&self.cache_ttl_secs) {
            return Err(ConfigError::Invalid {
                field: "cache_ttl_secs",
                value: self.cache_ttl_secs.to_string(),
                expected: "range 1..=86400",
            });
        }
        if !(1..=20).contains(&self.db_max_connections) {
            return Err(ConfigError::Invalid {
                field: "db_max_connections",
                value: self.db_max_connections.to_string(),
                expected: "range 1..=20",
            });
        }
        if self.db_busy_timeout_ms > 120_000 {
            return Err(ConfigError::Invalid {
                field: "db_busy_timeout_ms",
                value: self.db_busy_timeout_ms.to_string(),
                expected: "range 0..=120000",
            });
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::Invalid {
                field: "base_url",
                value: self.base_url.clone(),
                expected: "an absolute URL",
            });
        }
        if url::Url::parse(&self.site_url).is_err() {
            return Err(ConfigError::Invalid {
                field: "site_url",
                value: self.site_url.clone(),
                expected: "an absolute URL",
            });
        }
        Ok(())
    }

    /// Name of the download log table, `{prefix}eri_file_library`.
    #[must_use]
    pub fn download_table(&self) -> String {
        format!("{}eri_file_library", self.table_prefix)
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/file-library/config.toml`
/// 2. `$HOME/.config/file-library/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("file-library")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("file-library")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loaded config plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Path that was consulted, if any.
    pub path: Option<PathBuf>,
    /// Effective configuration.
    pub config: LibraryConfig,
    /// Whether `path` existed and was parsed.
    pub loaded_from_file: bool,
}

/// Loads the explicit config path, or the default path when present, or defaults.
///
/// An explicit path that does not exist is an error; a missing default file is not.
///
/// # Errors
///
/// Returns [`ConfigError`] when a file exists but cannot be read or parsed.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = explicit {
        let config = LibraryConfig::load(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(default_path) if default_path.exists() => {
            let config = LibraryConfig::load(default_path)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            config: LibraryConfig::default(),
            loaded_from_file: false,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(LibraryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
database_path = "/var/lib/files/library.db"
table_prefix = "wp_"
"#;
        let config = LibraryConfig::from_toml_str(raw, Path::new("inline")).unwrap();
        assert_eq!(
            config.database_path,
            PathBuf::from("/var/lib/files/library.db")
        );
        assert_eq!(config.download_table(), "wp_eri_file_library");
        assert_eq!(config.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
    }

    #[test]
    fn test_prefix_with_sql_characters_rejected() {
        let raw = r#"table_prefix = "x; DROP TABLE files""#;
        let err = LibraryConfig::from_toml_str(raw, Path::new("inline")).unwrap_err();
        assert!(err.to_string().contains("table_prefix"));
    }

    #[test]
    fn test_db_max_connections_range() {
        let raw = "db_max_connections = 0";
        assert!(LibraryConfig::from_toml_str(raw, Path::new("inline")).is_err());
        let raw = "db_max_connections = 21";
        assert!(LibraryConfig::from_toml_str(raw, Path::new("inline")).is_err());
    }

    #[test]
    fn test_malformed_toml_reports_parse_error() {
        let err = LibraryConfig::from_toml_str("cache_ttl_secs = ", Path::new("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            load_config(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "site_url = \"https://example.com\"\n").unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert!(loaded.loaded_from_file);
        assert_eq!(loaded.config.site_url, "https://example.com");
    }
}
