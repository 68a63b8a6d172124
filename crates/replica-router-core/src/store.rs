//! The coordination store seam.
//!
//! Every piece of state the router shares across service instances (health
//! snapshots, breaker records, probe locks) goes through this trait. It maps
//! 1:1 onto any TTL-capable key/value client: the only operations required are
//! get, set-with-expiry, atomic set-if-absent-with-expiry, and delete. No
//! transactions, no pub/sub.
//!
//! Implementations must make `put_if_absent` atomic with respect to concurrent
//! callers on the same key; it is the primitive the probe lock is built on.
//!
//! # Examples
//!
//! Backing the router with a Redis-style client:
//!
//! ```rust,ignore
//! use replica_router_core::{CoordinationStore, StoreError};
//! use async_trait::async_trait;
//! use std::time::Duration;
//!
//! struct RedisStore {
//!     client: redis::Client,
//! }
//!
//! #[async_trait]
//! impl CoordinationStore for RedisStore {
//!     async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
//!         let mut conn = self.client.get_async_connection().await.map_err(StoreError::backend)?;
//!         redis::cmd("GET").arg(key).query_async(&mut conn).await.map_err(StoreError::backend)
//!     }
//!     // put -> SET PX, put_if_absent -> SET NX PX, delete -> DEL
//!     # async fn put(&self, _: &str, _: &[u8], _: Duration) -> Result<(), StoreError> { unimplemented!() }
//!     # async fn put_if_absent(&self, _: &str, _: &[u8], _: Duration) -> Result<bool, StoreError> { unimplemented!() }
//!     # async fn delete(&self, _: &str) -> Result<(), StoreError> { unimplemented!() }
//! }
//! ```

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a [`CoordinationStore`].
///
/// The router never propagates these to its caller; any store error during a
/// routing attempt demotes that attempt to the plain round-robin tier.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the operation.
    #[error("coordination backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A stored record could not be decoded.
    #[error("malformed record: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// Wraps a backend client error.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        StoreError::Backend(err.into())
    }
}

/// A shared, TTL-capable key/value backend reachable by all service instances.
///
/// Keys are opaque strings, values are opaque bytes. Entries expire on their
/// own once the supplied TTL lapses; callers never rely on expiry being
/// prompt, since every freshness decision in the router is a time comparison,
/// not an existence check.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Reads the value at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes `value` at `key`, overwriting any existing entry, expiring
    /// after `ttl`.
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Writes `value` at `key` only if no live entry exists. Returns `true`
    /// if the write happened.
    ///
    /// Must be atomic: of any set of concurrent callers on the same key, at
    /// most one may observe `true`.
    async fn put_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Removes the entry at `key`, if any.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
