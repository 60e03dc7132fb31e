//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("limits.{0} must be at least 1")]
    ZeroCeiling(&'static str),
    #[error("buckets.expire_secs must be greater than 0")]
    ZeroWindow,
    #[error("buckets.sweep_interval_ms must be greater than 0")]
    ZeroSweepInterval,
    #[error("admin.timeout_ms must be greater than 0")]
    ZeroAdminTimeout,
    #[error("log.level is not a valid filter: {0}")]
    InvalidLogLevel(String),
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, value) in [
        ("login", config.limits.login),
        ("password", config.limits.password),
        ("ip", config.limits.ip),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroCeiling(name));
        }
    }

    if config.buckets.expire_secs == 0 {
        errors.push(ValidationError::ZeroWindow);
    }
    if config.buckets.sweep_interval_ms == 0 {
        errors.push(ValidationError::ZeroSweepInterval);
    }
    if config.admin.timeout_ms == 0 {
        errors.push(ValidationError::ZeroAdminTimeout);
    }

    if EnvFilter::try_new(&config.log.level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(config.log.level.clone()));
    }

    if let Some(ref db) = config.database
        && db.path != ":memory:"
    {
        let db_path = Path::new(&db.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(db.path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
