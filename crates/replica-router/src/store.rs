//! Records the router shares through the coordination store.
//!
//! Two record types exist per replica index: a health snapshot and a breaker
//! record. Both expire on their own, and both are always judged by time
//! comparison, never by existence: an entry the backend has not yet evicted
//! must read the same as one that is already gone.

use replica_router_core::store::{CoordinationStore, StoreError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// The cached health verdict for one replica.
///
/// Stored with a TTL equal to the health-check interval; an absent or expired
/// snapshot means "unknown", which callers treat conservatively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Verdict of the most recent probe.
    pub is_healthy: bool,

    /// When the most recent probe ran (milliseconds since epoch).
    pub last_check_millis: Option<u64>,

    /// Failed probes in a row, accumulated across instances.
    pub consecutive_failures: u32,
}

impl HealthSnapshot {
    /// Snapshot written after a successful probe.
    pub fn healthy(now_millis: u64) -> Self {
        Self {
            is_healthy: true,
            last_check_millis: Some(now_millis),
            consecutive_failures: 0,
        }
    }

    /// Snapshot written after a failed probe.
    pub fn unhealthy(now_millis: u64, consecutive_failures: u32) -> Self {
        Self {
            is_healthy: false,
            last_check_millis: Some(now_millis),
            consecutive_failures,
        }
    }

    /// Whether this verdict is recent enough to use without re-probing.
    ///
    /// A snapshot with no check time is never fresh. A check time in the
    /// future (clock skew between instances) reads as fresh rather than
    /// triggering a probe storm.
    pub fn is_fresh(&self, now_millis: u64, interval: Duration) -> bool {
        match self.last_check_millis {
            Some(checked) => now_millis.saturating_sub(checked) < interval.as_millis() as u64,
            None => false,
        }
    }
}

/// The breaker record for one replica.
///
/// Stored with a TTL equal to the breaker timeout. Whether the breaker
/// excludes a replica is decided by [`BreakerRecord::is_tripped`], never by
/// whether the record still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerRecord {
    /// Whether the breaker was open when last written.
    pub is_open: bool,

    /// When the exclusion window ends (milliseconds since epoch).
    pub open_until_millis: u64,

    /// Failed probes in a row at the time the breaker opened.
    pub consecutive_failures: u32,
}

impl BreakerRecord {
    /// Record for a breaker opened at `now_millis` for `timeout`.
    pub fn open(now_millis: u64, timeout: Duration, consecutive_failures: u32) -> Self {
        Self {
            is_open: true,
            open_until_millis: now_millis + timeout.as_millis() as u64,
            consecutive_failures,
        }
    }

    /// Whether routing to this replica is currently forbidden.
    ///
    /// Once `now` reaches `open_until_millis` the record is stale and reads
    /// as closed, whether or not the backend has evicted it.
    pub fn is_tripped(&self, now_millis: u64) -> bool {
        self.is_open && now_millis < self.open_until_millis
    }
}

/// Typed access to one router's records, bound to its key namespace.
pub(crate) struct Records<'a> {
    store: &'a dyn CoordinationStore,
    namespace: &'a str,
}

impl<'a> Records<'a> {
    pub(crate) fn new(store: &'a dyn CoordinationStore, namespace: &'a str) -> Self {
        Self { store, namespace }
    }

    fn health_key(&self, index: usize) -> String {
        format!("{}:replica:{}:health", self.namespace, index)
    }

    fn breaker_key(&self, index: usize) -> String {
        format!("{}:replica:{}:breaker", self.namespace, index)
    }

    pub(crate) fn lock_key(&self, index: usize) -> String {
        format!("{}:replica:{}:probe-lock", self.namespace, index)
    }

    pub(crate) async fn health(&self, index: usize) -> Result<Option<HealthSnapshot>, StoreError> {
        match self.store.get(&self.health_key(index)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn put_health(
        &self,
        index: usize,
        snapshot: &HealthSnapshot,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.store.put(&self.health_key(index), &bytes, ttl).await
    }

    pub(crate) async fn breaker(&self, index: usize) -> Result<Option<BreakerRecord>, StoreError> {
        match self.store.get(&self.breaker_key(index)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn open_breaker(
        &self,
        index: usize,
        record: &BreakerRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        self.store.put(&self.breaker_key(index), &bytes, ttl).await
    }

    pub(crate) async fn clear_breaker(&self, index: usize) -> Result<(), StoreError> {
        self.store.delete(&self.breaker_key(index)).await
    }
}
