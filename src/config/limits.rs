//! Attempt ceilings and bucket timing configuration.

use serde::Deserialize;
use std::time::Duration;

use crate::security::buckets::{BucketPolicy, Ceilings};

/// Per-type attempt ceilings within one expiry window.
///
/// A ceiling of `N` admits `N - 1` attempts and denies the `N`-th.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Ceiling for each login name (default: 10).
    #[serde(default = "default_login_limit")]
    pub login: u32,
    /// Ceiling for each password (default: 100).
    #[serde(default = "default_password_limit")]
    pub password: u32,
    /// Ceiling for each client IP (default: 1000).
    #[serde(default = "default_ip_limit")]
    pub ip: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            login: default_login_limit(),
            password: default_password_limit(),
            ip: default_ip_limit(),
        }
    }
}

impl LimitsConfig {
    pub fn ceilings(&self) -> Ceilings {
        Ceilings {
            ip: self.ip,
            login: self.login,
            password: self.password,
        }
    }
}

/// Attempt counter implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketBackend {
    /// Exact in-process sliding window.
    #[default]
    Memory,
}

/// Bucket expiry and sweeping.
#[derive(Debug, Clone, Deserialize)]
pub struct BucketsConfig {
    /// Seconds after which an attempt stops counting (default: 60).
    #[serde(default = "default_expire_secs")]
    pub expire_secs: u64,
    /// Milliseconds between sweeper passes (default: 500).
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Counter implementation (default: memory).
    #[serde(default)]
    pub backend: BucketBackend,
}

impl Default for BucketsConfig {
    fn default() -> Self {
        Self {
            expire_secs: default_expire_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            backend: BucketBackend::default(),
        }
    }
}

impl BucketsConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.expire_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Combine with `limits` into the policy a bucket store is built from.
    pub fn policy(&self, limits: &LimitsConfig) -> BucketPolicy {
        BucketPolicy {
            ceilings: limits.ceilings(),
            window: self.window(),
            sweep_interval: self.sweep_interval(),
        }
    }
}

fn default_login_limit() -> u32 {
    10
}

fn default_password_limit() -> u32 {
    100
}

fn default_ip_limit() -> u32 {
    1000
}

fn default_expire_secs() -> u64 {
    60
}

fn default_sweep_interval_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_correct() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.login, 10);
        assert_eq!(limits.password, 100);
        assert_eq!(limits.ip, 1000);

        let buckets = BucketsConfig::default();
        assert_eq!(buckets.window(), Duration::from_secs(60));
        assert_eq!(buckets.sweep_interval(), Duration::from_millis(500));
        assert_eq!(buckets.backend, BucketBackend::Memory);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let limits: LimitsConfig = toml::from_str("login = 3").unwrap();
        assert_eq!(limits.login, 3);
        assert_eq!(limits.password, 100);
    }

    #[test]
    fn policy_carries_every_value() {
        let limits = LimitsConfig {
            login: 2,
            password: 4,
            ip: 8,
        };
        let buckets = BucketsConfig {
            expire_secs: 30,
            sweep_interval_ms: 250,
            backend: BucketBackend::Memory,
        };
        let policy = buckets.policy(&limits);
        assert_eq!(policy.ceilings.login, 2);
        assert_eq!(policy.ceilings.password, 4);
        assert_eq!(policy.ceilings.ip, 8);
        assert_eq!(policy.window, Duration::from_secs(30));
        assert_eq!(policy.sweep_interval, Duration::from_millis(250));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(toml::from_str::<BucketsConfig>(r#"backend = "redis""#).is_err());
    }
}
