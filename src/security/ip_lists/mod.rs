//! IP range allow/deny lists.
//!
//! Holds the whitelist and blacklist in memory for lock-cheap containment
//! checks and writes every change through a [`RangeStorage`] backend.
//!
//! # Invariant
//!
//! No address is covered by a whitelist range and a blacklist range at the same
//! time. The check runs at insertion under the write gate, so two concurrent
//! inserts into opposite lists cannot both pass it.

mod storage;

pub use storage::{ListKind, MemoryRangeStorage, RangeStorage};

use crate::error::{GuardError, GuardResult};
use crate::metrics;
use crate::security::ip_range::{IpRange, format_address, parse_address};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// In-memory view of both lists, backed by durable storage.
pub struct IpListStore {
    white: RwLock<Vec<IpRange>>,
    black: RwLock<Vec<IpRange>>,
    /// Serializes mutations (check, persist, apply) across both lists.
    write_gate: Mutex<()>,
    storage: Arc<dyn RangeStorage>,
}

impl IpListStore {
    /// Build a store from whatever `storage` already holds.
    pub async fn load(storage: Arc<dyn RangeStorage>) -> GuardResult<Self> {
        let white = storage.list(ListKind::White).await?;
        let black = storage.list(ListKind::Black).await?;

        for w in &white {
            if let Some(b) = black.iter().find(|b| b.overlaps(w)) {
                warn!(whitelist = %w, blacklist = %b, "stored ranges overlap; blacklist wins");
            }
        }

        metrics::set_list_entries(ListKind::White.name(), white.len());
        metrics::set_list_entries(ListKind::Black.name(), black.len());
        info!(
            whitelist = white.len(),
            blacklist = black.len(),
            "IP lists loaded"
        );

        Ok(Self {
            white: RwLock::new(white),
            black: RwLock::new(black),
            write_gate: Mutex::new(()),
            storage,
        })
    }

    /// Empty lists over process-local storage.
    pub fn in_memory() -> Self {
        Self {
            white: RwLock::new(Vec::new()),
            black: RwLock::new(Vec::new()),
            write_gate: Mutex::new(()),
            storage: Arc::new(MemoryRangeStorage::new()),
        }
    }

    fn ranges(&self, kind: ListKind) -> &RwLock<Vec<IpRange>> {
        match kind {
            ListKind::White => &self.white,
            ListKind::Black => &self.black,
        }
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Add `addr/mask` to `kind`.
    ///
    /// Fails with a conflict if the range shares any address with the other
    /// list. An existing entry with the same base address is replaced.
    pub async fn add(
        &self,
        kind: ListKind,
        addr_text: &str,
        mask_text: &str,
        deadline: Instant,
    ) -> GuardResult<IpRange> {
        let range = IpRange::parse(addr_text, mask_text)?;
        let _gate = self.acquire_gate(deadline).await?;

        let conflict = self
            .ranges(kind.opposite())
            .read()
            .iter()
            .find(|r| r.overlaps(&range))
            .copied();
        if let Some(existing) = conflict {
            warn!(list = %kind, range = %range, conflicts_with = %existing, "range rejected");
            return Err(match kind {
                ListKind::White => GuardError::OverlapsBlacklist(range.to_string()),
                ListKind::Black => GuardError::OverlapsWhitelist(range.to_string()),
            });
        }

        with_deadline(deadline, self.storage.add(kind, &range))
            .await
            .inspect_err(|e| log_storage_failure("add", kind, e))?;

        let len = {
            let mut ranges = self.ranges(kind).write();
            ranges.retain(|r| r.base() != range.base());
            ranges.push(range);
            ranges.len()
        };
        metrics::set_list_entries(kind.name(), len);
        info!(list = %kind, range = %range, "range added");
        Ok(range)
    }

    /// Remove the range in `kind` whose base address is exactly `addr_text`.
    ///
    /// Storage is asked even when memory has no such entry, so a row persisted
    /// by an add that timed out can still be deleted.
    pub async fn remove(&self, kind: ListKind, addr_text: &str, deadline: Instant) -> GuardResult<()> {
        let base = parse_address(addr_text)?;
        let _gate = self.acquire_gate(deadline).await?;

        let in_memory = self.ranges(kind).read().iter().any(|r| r.base() == base);
        let stored = with_deadline(deadline, self.storage.remove(kind, base))
            .await
            .inspect_err(|e| log_storage_failure("remove", kind, e))?;
        if !in_memory {
            if !stored {
                return Err(GuardError::RangeNotFound(format_address(base)));
            }
            warn!(list = %kind, base = %format_address(base), "removed range present only in storage");
        }

        let len = {
            let mut ranges = self.ranges(kind).write();
            ranges.retain(|r| r.base() != base);
            ranges.len()
        };
        metrics::set_list_entries(kind.name(), len);
        info!(list = %kind, base = %format_address(base), "range removed");
        Ok(())
    }

    async fn acquire_gate(&self, deadline: Instant) -> GuardResult<tokio::sync::MutexGuard<'_, ()>> {
        if Instant::now() >= deadline {
            return Err(GuardError::Cancelled);
        }
        tokio::time::timeout_at(deadline, self.write_gate.lock())
            .await
            .map_err(|_| GuardError::Cancelled)
    }

    pub async fn add_white(&self, addr: &str, mask: &str, deadline: Instant) -> GuardResult<IpRange> {
        self.add(ListKind::White, addr, mask, deadline).await
    }

    pub async fn add_black(&self, addr: &str, mask: &str, deadline: Instant) -> GuardResult<IpRange> {
        self.add(ListKind::Black, addr, mask, deadline).await
    }

    pub async fn del_white(&self, addr: &str, deadline: Instant) -> GuardResult<()> {
        self.remove(ListKind::White, addr, deadline).await
    }

    pub async fn del_black(&self, addr: &str, deadline: Instant) -> GuardResult<()> {
        self.remove(ListKind::Black, addr, deadline).await
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Whether `addr_text` falls inside any range of `kind`.
    pub fn contains(&self, kind: ListKind, addr_text: &str) -> GuardResult<bool> {
        let addr = parse_address(addr_text)?;
        Ok(self.contains_addr(kind, addr))
    }

    /// Same as [`IpListStore::contains`] for an already parsed address.
    pub fn contains_addr(&self, kind: ListKind, addr: u32) -> bool {
        self.ranges(kind).read().iter().any(|r| r.contains(addr))
    }

    pub fn is_whitelisted(&self, addr: &str) -> GuardResult<bool> {
        self.contains(ListKind::White, addr)
    }

    pub fn is_blacklisted(&self, addr: &str) -> GuardResult<bool> {
        self.contains(ListKind::Black, addr)
    }

    /// Snapshot of `kind` in insertion order.
    pub fn list(&self, kind: ListKind) -> Vec<IpRange> {
        self.ranges(kind).read().clone()
    }

    pub fn list_white(&self) -> Vec<IpRange> {
        self.list(ListKind::White)
    }

    pub fn list_black(&self) -> Vec<IpRange> {
        self.list(ListKind::Black)
    }

    /// Close the backing storage.
    pub async fn close(&self) -> GuardResult<()> {
        self.storage.close().await?;
        Ok(())
    }
}

/// Run a storage call, abandoning it once `deadline` passes.
///
/// Dropping the storage future rolls back whatever it had not committed.
async fn with_deadline<T, F>(deadline: Instant, op: F) -> GuardResult<T>
where
    F: Future<Output = Result<T, crate::db::DbError>>,
{
    match tokio::time::timeout_at(deadline, op).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(GuardError::Cancelled),
    }
}

fn log_storage_failure(op: &'static str, kind: ListKind, err: &GuardError) {
    match err {
        GuardError::Cancelled => warn!(op, list = %kind, "storage call cancelled by deadline"),
        other => error!(op, list = %kind, error = %other, "storage call failed"),
    }
}
