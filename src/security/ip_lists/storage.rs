//! Persistence contract for the allow/deny range lists.

use crate::db::DbError;
use crate::security::ip_range::IpRange;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;

/// Which of the two lists an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    White,
    Black,
}

impl ListKind {
    /// The list an insert into `self` must not overlap.
    pub fn opposite(self) -> Self {
        match self {
            ListKind::White => ListKind::Black,
            ListKind::Black => ListKind::White,
        }
    }

    /// Table / label name.
    pub fn name(self) -> &'static str {
        match self {
            ListKind::White => "whitelist",
            ListKind::Black => "blacklist",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Durable home of the range lists.
///
/// Implementations store what they are given. The cross-list overlap rule is
/// enforced by [`super::IpListStore`] before any call reaches this layer.
#[async_trait]
pub trait RangeStorage: Send + Sync {
    /// Insert `range`, replacing any entry with the same base address.
    async fn add(&self, kind: ListKind, range: &IpRange) -> Result<(), DbError>;

    /// Delete the entry whose base address is `base`. Returns whether one existed.
    async fn remove(&self, kind: ListKind, base: u32) -> Result<bool, DbError>;

    /// Whether any stored range in `kind` contains `addr`.
    async fn contains(&self, kind: ListKind, addr: u32) -> Result<bool, DbError>;

    /// All ranges in `kind`, in insertion order.
    async fn list(&self, kind: ListKind) -> Result<Vec<IpRange>, DbError>;

    /// Release the backing resources.
    async fn close(&self) -> Result<(), DbError>;
}

/// Process-local storage used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryRangeStorage {
    white: RwLock<Vec<IpRange>>,
    black: RwLock<Vec<IpRange>>,
}

impl MemoryRangeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn list_for(&self, kind: ListKind) -> &RwLock<Vec<IpRange>> {
        match kind {
            ListKind::White => &self.white,
            ListKind::Black => &self.black,
        }
    }
}

#[async_trait]
impl RangeStorage for MemoryRangeStorage {
    async fn add(&self, kind: ListKind, range: &IpRange) -> Result<(), DbError> {
        let mut list = self.list_for(kind).write();
        list.retain(|r| r.base() != range.base());
        list.push(*range);
        Ok(())
    }

    async fn remove(&self, kind: ListKind, base: u32) -> Result<bool, DbError> {
        let mut list = self.list_for(kind).write();
        let before = list.len();
        list.retain(|r| r.base() != base);
        Ok(list.len() != before)
    }

    async fn contains(&self, kind: ListKind, addr: u32) -> Result<bool, DbError> {
        Ok(self.list_for(kind).read().iter().any(|r| r.contains(addr)))
    }

    async fn list(&self, kind: ListKind) -> Result<Vec<IpRange>, DbError> {
        Ok(self.list_for(kind).read().clone())
    }

    async fn close(&self) -> Result<(), DbError> {
        Ok(())
    }
}
