//! Shared test doubles for the integration suite.

#![allow(dead_code)] // Each integration test binary uses a subset of this.

use async_trait::async_trait;
use replica_router::{CoordinationStore, DbEndpoint, MemoryStore, Prober, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Route tracing output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn primary() -> DbEndpoint {
    DbEndpoint::new("db-primary", 5432, "orders")
}

pub fn replica(n: usize) -> DbEndpoint {
    DbEndpoint::new(format!("db-replica-{n}"), 5432, "orders")
}

/// Prober scripted per host, counting probes per host.
///
/// Hosts not scripted report unhealthy.
#[derive(Default)]
pub struct ScriptedProber {
    healthy: Mutex<HashMap<String, bool>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_healthy(&self, host: &str, healthy: bool) {
        self.healthy
            .lock()
            .unwrap()
            .insert(host.to_string(), healthy);
    }

    pub fn calls_for(&self, host: &str) -> usize {
        self.calls.lock().unwrap().get(host).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, endpoint: &DbEndpoint) -> bool {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(endpoint.host.clone())
            .or_insert(0) += 1;
        self.healthy
            .lock()
            .unwrap()
            .get(&endpoint.host)
            .copied()
            .unwrap_or(false)
    }
}

/// Store wrapper that counts every backend operation.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    ops: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> usize {
        self.ops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoordinationStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value, ttl).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        self.inner.put_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.ops.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }
}

/// Store where every operation fails, as during a backend outage.
#[derive(Default)]
pub struct FailingStore;

impl FailingStore {
    fn error() -> StoreError {
        StoreError::backend(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "coordination backend down",
        ))
    }
}

#[async_trait]
impl CoordinationStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(Self::error())
    }

    async fn put(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), StoreError> {
        Err(Self::error())
    }

    async fn put_if_absent(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Duration,
    ) -> Result<bool, StoreError> {
        Err(Self::error())
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(Self::error())
    }
}

/// Store whose every operation hangs, as during a backend stall.
#[derive(Default)]
pub struct HangingStore;

#[async_trait]
impl CoordinationStore for HangingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(None)
    }

    async fn put(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), StoreError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    async fn put_if_absent(
        &self,
        _key: &str,
        _value: &[u8],
        _ttl: Duration,
    ) -> Result<bool, StoreError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(false)
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}
