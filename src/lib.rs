//! bruteguard - authentication brute-force throttle.
//!
//! Counts how often an IP address, a login and a password are presented within
//! a sliding window and denies attempts past per-type ceilings. Operator-managed
//! IPv4 whitelist and blacklist ranges bypass or block the counters entirely.

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod metrics;
pub mod security;
pub mod telemetry;

pub use error::{ErrorKind, GuardError, GuardResult};
pub use security::{AdmissionPolicy, BucketStore, IpListStore, Verdict};
