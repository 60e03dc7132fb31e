//! Attempt buckets for brute-force throttling.
//!
//! Each identifier presented during authentication (IP, login, password) owns a
//! bucket: the timestamps of its recent attempts plus a frequency ceiling.
//!
//! # Architecture
//!
//! - `DashMap<BucketKey, Arc<Mutex<Bucket>>>`: structural changes (create,
//!   evict) take a shard lock; attempt bookkeeping takes only the bucket's own
//!   mutex, so attempts on different keys never serialize on each other.
//! - A background sweeper ticks every `sweep_interval`, drops attempts older
//!   than the expiry window and evicts buckets left empty. Memory is bounded
//!   by the keys seen within the last window.

use crate::error::{GuardError, GuardResult};
use crate::metrics;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Floor for the sweep period; a zero interval would spin.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

// ============================================================================
// Keys
// ============================================================================

/// Identifier namespace. The same literal used as a login and as a password
/// lands in two different buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Ip,
    Login,
    Password,
}

impl KeyType {
    /// Get the display name for this key type.
    pub fn name(&self) -> &'static str {
        match self {
            KeyType::Ip => "IP",
            KeyType::Login => "LOGIN",
            KeyType::Password => "PASS",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Error)]
#[error("unknown bucket type: {0:?} (expected ip, login or password)")]
pub struct ParseKeyTypeError(String);

impl FromStr for KeyType {
    type Err = ParseKeyTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ip" => Ok(KeyType::Ip),
            "login" => Ok(KeyType::Login),
            "pass" | "password" => Ok(KeyType::Password),
            _ => Err(ParseKeyTypeError(s.to_string())),
        }
    }
}

/// Bucket identity: namespace plus caller-supplied value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    kind: KeyType,
    value: String,
}

impl BucketKey {
    /// Build a key. Empty values are rejected.
    pub fn new(kind: KeyType, value: impl Into<String>) -> GuardResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(GuardError::EmptyKey(kind));
        }
        Ok(Self { kind, value })
    }

    pub fn kind(&self) -> KeyType {
        self.kind
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Per-type frequency ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ceilings {
    pub ip: u32,
    pub login: u32,
    pub password: u32,
}

impl Ceilings {
    pub fn for_kind(&self, kind: KeyType) -> u32 {
        match kind {
            KeyType::Ip => self.ip,
            KeyType::Login => self.login,
            KeyType::Password => self.password,
        }
    }
}

/// Everything a [`BucketStore`] fixes at construction.
#[derive(Debug, Clone, Copy)]
pub struct BucketPolicy {
    pub ceilings: Ceilings,
    /// Age after which an attempt stops counting.
    pub window: Duration,
    /// How often the sweeper runs.
    pub sweep_interval: Duration,
}

// ============================================================================
// Bucket
// ============================================================================

/// Sliding-window attempt counter for a single identifier.
#[derive(Debug)]
pub struct Bucket {
    ceiling: u32,
    /// Oldest first; never decreasing.
    attempts: VecDeque<Instant>,
}

impl Bucket {
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling,
            attempts: VecDeque::new(),
        }
    }

    /// Record an attempt at `now` and report whether it is admitted.
    ///
    /// The count is evaluated after the append: a fresh bucket admits
    /// `ceiling - 1` attempts and denies the `ceiling`-th and later ones.
    pub fn record_attempt(&mut self, now: Instant) -> bool {
        let now = self.attempts.back().map_or(now, |&last| now.max(last));
        self.attempts.push_back(now);
        self.attempts.len() < self.ceiling as usize
    }

    /// Forget every attempt. The ceiling is kept.
    pub fn reset(&mut self) {
        self.attempts.clear();
    }

    /// Drop attempts whose age has reached `window`.
    ///
    /// Scans newest to oldest; the first expired attempt and everything older
    /// is cut in one piece. Returns how many attempts were dropped.
    pub fn sweep(&mut self, now: Instant, window: Duration) -> usize {
        let cut = self
            .attempts
            .iter()
            .rposition(|&at| now.saturating_duration_since(at) >= window);
        match cut {
            Some(idx) => {
                self.attempts.drain(..=idx);
                idx + 1
            }
            None => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }
}

// ============================================================================
// Limiter seam
// ============================================================================

/// Contract the admission policy needs from an attempt counter.
///
/// [`BucketStore`] is the exact in-process implementation.
#[async_trait]
pub trait AttemptLimiter: Send + Sync {
    /// Record an attempt for `value` and report whether it is admitted.
    async fn check(&self, kind: KeyType, value: &str) -> GuardResult<bool>;

    /// Clear the bucket for `value`. Fails with `BucketNotFound` if none exists.
    async fn reset(&self, kind: KeyType, value: &str) -> GuardResult<()>;
}

// ============================================================================
// Bucket store
// ============================================================================

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Attempts dropped across all buckets.
    pub expired_attempts: usize,
    /// Buckets evicted because they became empty.
    pub evicted_buckets: usize,
}

/// Owner of every live bucket.
#[derive(Debug)]
pub struct BucketStore {
    buckets: DashMap<BucketKey, Arc<Mutex<Bucket>>>,
    policy: BucketPolicy,
    shutdown_tx: broadcast::Sender<()>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl BucketStore {
    /// Create a store without a background sweeper.
    ///
    /// Callers drive [`BucketStore::sweep`] themselves; use
    /// [`BucketStore::start`] for the self-maintaining variant.
    pub fn new(policy: BucketPolicy) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            buckets: DashMap::new(),
            policy,
            shutdown_tx,
            sweeper: Mutex::new(None),
        }
    }

    /// Create a store and spawn its sweeper on the current tokio runtime.
    pub fn start(policy: BucketPolicy) -> Arc<Self> {
        let store = Arc::new(Self::new(policy));
        let handle = spawn_sweeper(
            Arc::downgrade(&store),
            store.shutdown_tx.subscribe(),
            policy.sweep_interval,
        );
        *store.sweeper.lock() = Some(handle);
        info!(
            ip = policy.ceilings.ip,
            login = policy.ceilings.login,
            password = policy.ceilings.password,
            window = ?policy.window,
            sweep_interval = ?policy.sweep_interval,
            "bucket store started"
        );
        store
    }

    /// Record an attempt for `(kind, value)`, creating the bucket on first use.
    ///
    /// Returns `true` if admitted, `false` if over the ceiling.
    pub fn check(&self, kind: KeyType, value: &str) -> GuardResult<bool> {
        let key = BucketKey::new(kind, value)?;

        // The shard guard stays alive while the attempt is recorded so the
        // sweeper cannot evict the bucket between lookup and append.
        if let Some(bucket) = self.buckets.get(&key) {
            return Ok(bucket.lock().record_attempt(Instant::now()));
        }

        let ceiling = self.policy.ceilings.for_kind(kind);
        let bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::new(ceiling))));
        let admitted = bucket.lock().record_attempt(Instant::now());
        Ok(admitted)
    }

    /// Clear the bucket for `(kind, value)` without creating one.
    pub fn reset(&self, kind: KeyType, value: &str) -> GuardResult<()> {
        let key = BucketKey::new(kind, value)?;
        match self.buckets.get(&key) {
            Some(bucket) => {
                bucket.lock().reset();
                debug!(kind = %kind, "bucket reset");
                Ok(())
            }
            None => Err(GuardError::BucketNotFound),
        }
    }

    /// Number of attempts currently counted for `(kind, value)`.
    pub fn attempts(&self, kind: KeyType, value: &str) -> Option<usize> {
        let key = BucketKey::new(kind, value).ok()?;
        self.buckets.get(&key).map(|b| b.lock().len())
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Run one sweep pass as of `now`.
    ///
    /// Takes a snapshot of bucket handles, sweeps each one holding only its own
    /// lock, then evicts the buckets that are still empty.
    pub fn sweep(&self, now: Instant) -> SweepStats {
        let snapshot: Vec<(BucketKey, Arc<Mutex<Bucket>>)> = self
            .buckets
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let mut stats = SweepStats::default();
        for (key, bucket) in snapshot {
            let emptied = {
                let mut bucket = bucket.lock();
                stats.expired_attempts += bucket.sweep(now, self.policy.window);
                bucket.is_empty()
            };
            if emptied
                && self
                    .buckets
                    .remove_if(&key, |_, b| b.lock().is_empty())
                    .is_some()
            {
                stats.evicted_buckets += 1;
            }
        }

        metrics::set_active_buckets(self.buckets.len());
        metrics::record_evicted_buckets(stats.evicted_buckets);
        stats
    }

    /// Stop the sweeper and wait for an in-flight tick to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
            info!("bucket sweeper stopped");
        }
    }
}

#[async_trait]
impl AttemptLimiter for BucketStore {
    async fn check(&self, kind: KeyType, value: &str) -> GuardResult<bool> {
        BucketStore::check(self, kind, value)
    }

    async fn reset(&self, kind: KeyType, value: &str) -> GuardResult<()> {
        BucketStore::reset(self, kind, value)
    }
}

/// Spawn the periodic sweep loop.
///
/// The loop holds only a weak handle, so it also ends once the store is gone.
fn spawn_sweeper(
    store: Weak<BucketStore>,
    mut shutdown_rx: broadcast::Receiver<()>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(MIN_SWEEP_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let Some(store) = store.upgrade() else { break };
                    let stats = store.sweep(Instant::now());
                    if stats.evicted_buckets > 0 || stats.expired_attempts > 0 {
                        debug!(
                            expired_attempts = stats.expired_attempts,
                            evicted_buckets = stats.evicted_buckets,
                            live = store.len(),
                            "bucket sweep"
                        );
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}
