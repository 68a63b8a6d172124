//! Health-aware read routing across interchangeable database replicas.
//!
//! Every read-only database operation has a choice: one of several read
//! replicas, or the single primary endpoint. This crate makes that choice,
//! tolerating replica failures, refusing to hammer a failing replica, and
//! sharing health knowledge across independent service instances through a
//! TTL-capable key/value backend, with no central coordinator.
//!
//! ## Fallback tiers
//! - **Gate-healthy replica**: round-robin scan, first replica whose breaker
//!   is closed and whose (cached or freshly probed) verdict is healthy
//! - **Plain round robin**: the coordination backend is missing or erroring;
//!   rotate health-blind across replicas rather than fail the caller
//! - **Primary**: no replicas configured, every replica unhealthy, or the
//!   caller's deadline expired
//!
//! The caller of the router never observes an error: a broken coordination
//! backend degrades *selection*, never the read itself.
//!
//! ## Usage
//!
//! ```rust
//! use replica_router::{DbEndpoint, MemoryStore, ReadRouter};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let router = ReadRouter::builder()
//!     .primary(DbEndpoint::new("db-primary", 5432, "orders"))
//!     .replica(DbEndpoint::new("db-replica-1", 5432, "orders"))
//!     .replica(DbEndpoint::new("db-replica-2", 5432, "orders"))
//!     .store(MemoryStore::new())
//!     .health_check_interval(Duration::from_secs(30))
//!     .circuit_breaker_timeout(Duration::from_secs(60))
//!     .build();
//!
//! let target = router.select_read_target().await;
//! println!("connect to {}", target.endpoint());
//! # }
//! ```
//!
//! ### Sharing health across instances
//!
//! Several service processes routing over the same replicas supply the same
//! [`CoordinationStore`] (typically a distributed cache client) and the same
//! router name. Health snapshots, breaker records and probe locks then flow
//! through the shared backend: one instance's failed probe excludes the
//! replica for all of them until the breaker timeout lapses, and a
//! per-replica probe lock keeps a due health check from turning into a
//! thundering herd.
//!
//! ### Custom probing
//!
//! The default [`TcpProber`] answers "is anything listening"; a database-level
//! prober issues a trivial statement instead:
//!
//! ```rust
//! use replica_router::{DbEndpoint, Prober, ReadRouter, MemoryStore};
//! use async_trait::async_trait;
//!
//! struct PingProber;
//!
//! #[async_trait]
//! impl Prober for PingProber {
//!     async fn probe(&self, endpoint: &DbEndpoint) -> bool {
//!         // Open a connection, run `SELECT 1`, report the outcome.
//!         true
//!     }
//! }
//!
//! let router = ReadRouter::builder()
//!     .primary(DbEndpoint::new("db-primary", 5432, "orders"))
//!     .replica(DbEndpoint::new("db-replica-1", 5432, "orders"))
//!     .store(MemoryStore::new())
//!     .prober(PingProber)
//!     .build();
//! ```
//!
//! ### Event listeners
//!
//! ```rust
//! use replica_router::{DbEndpoint, ReadRouter};
//!
//! let router = ReadRouter::builder()
//!     .primary(DbEndpoint::new("db-primary", 5432, "orders"))
//!     .replica(DbEndpoint::new("db-replica-1", 5432, "orders"))
//!     .on_replica_selected(|index| println!("read -> replica {index}"))
//!     .on_breaker_opened(|index, failures| {
//!         eprintln!("replica {index} excluded ({failures} consecutive failures)");
//!     })
//!     .build();
//! ```
//!
//! ### Deadline-bound and blocking selection
//!
//! [`ReadRouter::select_read_target_within`] wraps the scan in a deadline and
//! falls back to the primary on expiry; [`ReadRouter::select_read_target_blocking`]
//! serves synchronous call sites.
//!
//! ## Feature Flags
//! - `metrics`: enables metrics collection using the `metrics` crate
//! - `tracing`: enables logging and tracing using the `tracing` crate

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge};
#[cfg(feature = "metrics")]
use std::sync::Once;

pub use replica_router_core::events::{EventListener, EventListeners, FnListener, RoutingEvent};
pub use replica_router_core::store::{CoordinationStore, StoreError};

pub use config::{RouterConfig, RouterConfigBuilder};
pub use endpoint::{DbEndpoint, ReadTarget, ReplicaEndpoint};
pub use events::{FallbackReason, RouterEvent};
pub use lock::ProbeLock;
pub use memory::MemoryStore;
pub use prober::{Prober, TcpProber};
pub use router::{ReadRouter, ReadRouterBuilder, ReplicaHealth};
pub use store::{BreakerRecord, HealthSnapshot};

mod config;
mod endpoint;
mod events;
mod gate;
mod lock;
mod memory;
mod prober;
mod router;
mod store;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Returns a new builder for a `ReadRouter`.
///
/// This is a convenience function that returns a builder. You can also use
/// `ReadRouter::builder()` directly.
///
/// # Example
///
/// ```rust
/// use replica_router::{read_router_builder, DbEndpoint};
///
/// let router = read_router_builder()
///     .primary(DbEndpoint::new("db-primary", 5432, "orders"))
///     .replica(DbEndpoint::new("db-replica-1", 5432, "orders"))
///     .build();
/// ```
pub fn read_router_builder() -> ReadRouterBuilder {
    #[cfg(feature = "metrics")]
    {
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "replica_router_selections_total",
                "Routing decisions by target tier (replica, round_robin, primary)"
            );
            describe_counter!(
                "replica_router_probes_total",
                "Liveness probes by outcome"
            );
            describe_counter!(
                "replica_router_breaker_opened_total",
                "Circuit breakers opened after failed probes"
            );
            describe_counter!(
                "replica_router_breaker_rejections_total",
                "Replicas skipped because their breaker was open"
            );
            describe_counter!(
                "replica_router_lock_contention_total",
                "Probes skipped because another instance held the probe lock"
            );
            describe_gauge!(
                "replica_router_replicas",
                "Number of configured read replicas"
            );
        });
    }
    ReadRouterBuilder::new()
}
