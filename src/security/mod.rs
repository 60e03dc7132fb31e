//! Admission-control engine.
//!
//! - **Range arithmetic**: IPv4 address/prefix to `[from, to]` intervals
//! - **IP lists**: whitelist and blacklist with a no-overlap invariant
//! - **Buckets**: per-identifier sliding-window attempt counters
//! - **Admission**: the per-attempt decision combining the two
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    AdmissionPolicy                       │
//! ├─────────────────────────────┬────────────────────────────┤
//! │        IpListStore          │   dyn AttemptLimiter       │
//! │  white/black Vec<IpRange>   │     BucketStore            │
//! │  RwLock + write gate        │  DashMap + sweeper task    │
//! │  RangeStorage (SQLite/mem)  │  per-bucket Mutex          │
//! └─────────────────────────────┴────────────────────────────┘
//! ```

pub mod admission;
pub mod buckets;
pub mod ip_lists;
pub mod ip_range;

pub use admission::{AdmissionPolicy, Verdict};
pub use buckets::{AttemptLimiter, BucketPolicy, BucketStore, Ceilings, KeyType};
pub use ip_lists::{IpListStore, ListKind, MemoryRangeStorage, RangeStorage};
pub use ip_range::IpRange;
