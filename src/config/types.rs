//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::limits::{BucketsConfig, LimitsConfig};

/// Environment variable naming the config file when no argument is given.
pub const CONFIG_ENV: &str = "BRUTEGUARD_CONFIG";

/// Config file used when neither an argument nor [`CONFIG_ENV`] is set.
pub const DEFAULT_CONFIG_PATH: &str = "bruteguard.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    /// Database configuration. Absent means lists live only in memory.
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub buckets: BucketsConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Emit warnings for settings that are accepted but probably unintended.
    pub fn warn_questionable(&self) {
        if self.buckets.sweep_interval() >= self.buckets.window() {
            tracing::warn!(
                sweep_interval_ms = self.buckets.sweep_interval_ms,
                expire_secs = self.buckets.expire_secs,
                "[buckets].sweep_interval_ms is not smaller than the expiry window; expired attempts may keep counting for up to a full extra interval"
            );
        }
        if self.database.is_none() {
            tracing::warn!("No [database] section - whitelist and blacklist will not survive a restart");
        }
    }
}

/// Pick the config file: explicit argument, then environment, then default.
pub fn config_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.filter(|p| !p.is_empty())
        .or(env.filter(|p| !p.is_empty()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Bind address (default: 127.0.0.1:8080).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Expose `/metrics` (default: true).
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            metrics: true,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:`.
    pub path: String,
}

/// Administrative call settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Deadline applied to each list or bucket mutation (default: 2000ms).
    #[serde(default = "default_admin_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_admin_timeout_ms(),
        }
    }
}

impl AdminConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

pub(super) fn default_true() -> bool {
    true
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_admin_timeout_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.http.listen, default_listen());
        assert!(config.http.metrics);
        assert!(config.database.is_none());
        assert_eq!(config.limits.login, 10);
        assert_eq!(config.admin.timeout(), Duration::from_secs(2));
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn full_file_parses() {
        let toml = r#"
[http]
listen = "0.0.0.0:9000"
metrics = false

[database]
path = "/var/lib/bruteguard/lists.db"

[limits]
login = 5
password = 50
ip = 500

[buckets]
expire_secs = 120
sweep_interval_ms = 1000
backend = "memory"

[admin]
timeout_ms = 750

[log]
level = "debug"
format = "json"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.http.listen.port(), 9000);
        assert!(!config.http.metrics);
        assert_eq!(
            config.database.as_ref().map(|d| d.path.as_str()),
            Some("/var/lib/bruteguard/lists.db")
        );
        assert_eq!(config.limits.ip, 500);
        assert_eq!(config.buckets.expire_secs, 120);
        assert_eq!(config.admin.timeout_ms, 750);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn load_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[limits]\nlogin = \"ten\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn config_path_precedence() {
        assert_eq!(
            config_path(Some("a.toml".into()), Some("b.toml".into())),
            PathBuf::from("a.toml")
        );
        assert_eq!(
            config_path(None, Some("b.toml".into())),
            PathBuf::from("b.toml")
        );
        assert_eq!(config_path(None, None), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn default_true_helper_returns_true() {
        assert!(default_true());
    }
}
