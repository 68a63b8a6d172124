//! Best-effort distributed mutex over the coordination store.
//!
//! The lock exists only to keep several instances from probing the same
//! replica at once. Nothing correctness-critical hangs off it: losing the
//! race means using the cached verdict, and a lock that is never released
//! (process death, abandoned scan) self-heals when its TTL lapses.

use replica_router_core::store::{CoordinationStore, StoreError};
use std::time::Duration;

/// A held probe lock for one replica.
///
/// Acquired with [`ProbeLock::try_acquire`]; release it with
/// [`ProbeLock::release`] once the probe's write-backs are done. Dropping a
/// held lock without releasing is safe (the TTL reclaims it); it just keeps
/// the replica unprobed for up to the TTL.
#[must_use = "a held lock should be released; otherwise only its TTL frees it"]
pub struct ProbeLock<'a> {
    store: &'a dyn CoordinationStore,
    key: String,
}

impl<'a> ProbeLock<'a> {
    /// Attempts to take the lock at `key`.
    ///
    /// Returns `Ok(None)` if another holder already has a live entry; the
    /// caller should fall back to its cached verdict rather than wait.
    pub async fn try_acquire(
        store: &'a dyn CoordinationStore,
        key: String,
        ttl: Duration,
    ) -> Result<Option<ProbeLock<'a>>, StoreError> {
        let acquired = store.put_if_absent(&key, b"1", ttl).await?;
        Ok(acquired.then_some(ProbeLock { store, key }))
    }

    /// Releases the lock (best-effort delete).
    pub async fn release(self) -> Result<(), StoreError> {
        self.store.delete(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn second_acquire_loses() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);

        let held = ProbeLock::try_acquire(&store, "lock".into(), ttl)
            .await
            .unwrap();
        assert!(held.is_some());

        let contender = ProbeLock::try_acquire(&store, "lock".into(), ttl)
            .await
            .unwrap();
        assert!(contender.is_none());
    }

    #[tokio::test]
    async fn release_frees_the_key() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);

        let held = ProbeLock::try_acquire(&store, "lock".into(), ttl)
            .await
            .unwrap()
            .unwrap();
        held.release().await.unwrap();

        assert!(ProbeLock::try_acquire(&store, "lock".into(), ttl)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn abandoned_lock_self_heals_via_ttl() {
        let store = MemoryStore::new();

        let held = ProbeLock::try_acquire(&store, "lock".into(), Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        drop(held); // never released

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(ProbeLock::try_acquire(&store, "lock".into(), Duration::from_secs(10))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);

        let a = ProbeLock::try_acquire(&store, "lock:0".into(), ttl)
            .await
            .unwrap();
        let b = ProbeLock::try_acquire(&store, "lock:1".into(), ttl)
            .await
            .unwrap();
        assert!(a.is_some());
        assert!(b.is_some());
    }
}
