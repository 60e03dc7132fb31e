//! Configuration loading and management.
//!
//! - [`types`]: top-level `Config`, HTTP, database, admin and log sections
//! - [`limits`]: attempt ceilings and bucket timing
//! - [`validation`]: startup checks that collect every problem at once

mod limits;
mod types;
pub mod validation;

pub use limits::{BucketBackend, BucketsConfig, LimitsConfig};
pub use types::{
    AdminConfig, CONFIG_ENV, Config, ConfigError, DEFAULT_CONFIG_PATH, DatabaseConfig, HttpConfig,
    LogConfig, LogFormat, config_path,
};
pub use validation::{ValidationError, validate};
