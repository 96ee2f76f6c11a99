//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then `VOD_COLLECTOR_*` environment variables
//! (`__` separates nesting, e.g. `VOD_COLLECTOR_COLLECTOR__DUPLICATE_THRESHOLD=30`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::constants::{collection, localization};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "vod-collector";
pub const ENV_PREFIX: &str = "VOD_COLLECTOR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub collector: CollectorConfig,
    pub localizer: LocalizerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite:` URL; defaults to a file under the user data directory
    pub url: Option<String>,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 8,
            busy_timeout_secs: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn database_url(&self) -> String {
        self.url.clone().unwrap_or_else(|| {
            format!("sqlite:{}", default_data_dir().join("vod-collector.db").display())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    /// Accept self-signed and otherwise invalid upstream certificates
    pub accept_invalid_certs: bool,
    /// Process-wide request rate; 0 disables limiting
    pub max_requests_per_second: u32,
    pub connect_timeout_secs: u64,
    /// Base delay of the transport-level exponential backoff
    pub retry_base_delay_ms: u64,
    /// `Referer` sent with poster downloads; empty sends none
    pub poster_referer: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("vod-collector/{}", env!("CARGO_PKG_VERSION")),
            accept_invalid_certs: true,
            max_requests_per_second: 0,
            connect_timeout_secs: 10,
            retry_base_delay_ms: 1000,
            poster_referer: "https://www.google.com/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub default_workers: usize,
    pub default_timeout_secs: u64,
    pub default_max_retries: u32,
    pub duplicate_threshold: u32,
    pub max_recent_errors: usize,
    /// Base delay of the fetch-and-parse retry loop
    pub retry_base_delay_ms: u64,
    /// Number of lock stripes serializing upserts by name
    pub upsert_lock_stripes: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            default_workers: collection::DEFAULT_WORKERS,
            default_timeout_secs: collection::DEFAULT_TIMEOUT_SECS,
            default_max_retries: collection::DEFAULT_MAX_RETRIES,
            duplicate_threshold: collection::DUPLICATE_STREAK_THRESHOLD,
            max_recent_errors: collection::MAX_RECENT_ERRORS,
            retry_base_delay_ms: 1000,
            upsert_lock_stripes: 64,
        }
    }
}

impl CollectorConfig {
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    pub workers: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Step of the linear backoff between download attempts
    pub retry_step_ms: u64,
    pub poster_dir: PathBuf,
    /// URL prefix under which `poster_dir` is served
    pub public_prefix: String,
    pub placeholder_url: String,
    pub max_recent_errors: usize,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            workers: localization::DEFAULT_WORKERS,
            timeout_secs: localization::DEFAULT_TIMEOUT_SECS,
            max_retries: localization::DEFAULT_MAX_RETRIES,
            retry_step_ms: 1000,
            poster_dir: PathBuf::from("uploads/posters"),
            public_prefix: "/static/uploads/posters".to_string(),
            placeholder_url: "/static/img/no-poster.svg".to_string(),
            max_recent_errors: localization::MAX_RECENT_ERRORS,
        }
    }
}

impl LocalizerConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub const fn retry_step(&self) -> Duration {
        Duration::from_millis(self.retry_step_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    /// Directory for rolling log files; defaults to `<data dir>/logs`
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
    /// Per-module overrides, e.g. `{"vod_collector::application" = "debug"}`
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            file_prefix: "vod-collector.log".to_string(),
            module_filters: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    pub fn log_directory(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| default_data_dir().join("logs"))
    }
}

/// Per-user data directory, falling back to the working directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("vod-collector"))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl AppConfig {
    /// Loads defaults, then `path` (or `vod-collector.toml` when present),
    /// then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.collector.default_workers == 0, "collector.default_workers must be greater than 0"),
            (self.collector.duplicate_threshold == 0, "collector.duplicate_threshold must be greater than 0"),
            (self.collector.upsert_lock_stripes == 0, "collector.upsert_lock_stripes must be greater than 0"),
            (self.localizer.workers == 0, "localizer.workers must be greater than 0"),
            (self.localizer.timeout_secs == 0, "localizer.timeout_secs must be greater than 0"),
            (self.database.max_connections == 0, "database.max_connections must be greater than 0"),
        ];
        if let Some((_, message)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(ConfigError::Validation {
                message: (*message).to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.collector.duplicate_threshold, 20);
        assert_eq!(config.collector.default_workers, 3);
        assert_eq!(config.localizer.workers, 10);
        assert!(config.http.accept_invalid_certs);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[collector]\nduplicate_threshold = 7\n\n[localizer]\nposter_dir = \"/tmp/posters\"\n"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.collector.duplicate_threshold, 7);
        assert_eq!(config.collector.default_workers, 3);
        assert_eq!(config.localizer.poster_dir, PathBuf::from("/tmp/posters"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[localizer]\nworkers = 0\n").unwrap();

        let err = AppConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }
}
