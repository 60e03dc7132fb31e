//! Unified error handling for bruteguard.
//!
//! Every fallible core operation returns [`GuardError`]. Variants are specific
//! enough for logs and metrics, while [`GuardError::kind`] folds them into the
//! small closed set that transports map onto status codes.

use crate::db::DbError;
use crate::security::buckets::KeyType;
use thiserror::Error;

// ============================================================================
// Error kinds (closed taxonomy)
// ============================================================================

/// Coarse classification of a [`GuardError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing caller input. Detected before any mutation.
    InvalidInput,
    /// The request contradicts existing state (opposite-list overlap).
    Conflict,
    /// The addressed bucket or range does not exist.
    NotFound,
    /// The backing store failed. Surfaced unchanged, never retried.
    StorageFailure,
    /// The caller's deadline passed before the mutation was applied.
    Cancelled,
}

// ============================================================================
// Guard errors (core operations)
// ============================================================================

/// Errors raised by the admission-control engine.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("empty {0} key")]
    EmptyKey(KeyType),

    #[error("invalid IPv4 address: {0:?}")]
    InvalidAddress(String),

    #[error("invalid mask: {0:?} (expected 0..=32)")]
    InvalidMask(String),

    #[error("range {0} overlaps the blacklist")]
    OverlapsBlacklist(String),

    #[error("range {0} overlaps the whitelist")]
    OverlapsWhitelist(String),

    #[error("bucket not found")]
    BucketNotFound,

    #[error("no range with base address {0}")]
    RangeNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),

    #[error("operation cancelled: deadline exceeded")]
    Cancelled,
}

impl GuardError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyKey(_) | Self::InvalidAddress(_) | Self::InvalidMask(_) => {
                ErrorKind::InvalidInput
            }
            Self::OverlapsBlacklist(_) | Self::OverlapsWhitelist(_) => ErrorKind::Conflict,
            Self::BucketNotFound | Self::RangeNotFound(_) => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::StorageFailure,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyKey(_) => "empty_key",
            Self::InvalidAddress(_) => "invalid_address",
            Self::InvalidMask(_) => "invalid_mask",
            Self::OverlapsBlacklist(_) => "overlaps_blacklist",
            Self::OverlapsWhitelist(_) => "overlaps_whitelist",
            Self::BucketNotFound => "bucket_not_found",
            Self::RangeNotFound(_) => "range_not_found",
            Self::Storage(_) => "storage_error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Result type for core operations.
pub type GuardResult<T> = Result<T, GuardError>;
