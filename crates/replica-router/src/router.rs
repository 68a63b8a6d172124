//! The read router.

use crate::config::{RouterConfig, RouterConfigBuilder};
use crate::endpoint::{DbEndpoint, ReadTarget, ReplicaEndpoint};
use crate::events::{FallbackReason, RouterEvent};
use crate::gate::HealthGate;
use crate::prober::{Prober, TcpProber};
use crate::store::{BreakerRecord, HealthSnapshot, Records};
#[cfg(feature = "metrics")]
use metrics::counter;
use replica_router_core::store::{CoordinationStore, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point-in-time health view of one replica, read from the coordination
/// store. For admin and health endpoints.
#[derive(Debug, Clone)]
pub struct ReplicaHealth {
    /// The replica this entry describes.
    pub replica: ReplicaEndpoint,

    /// Its cached health snapshot, if one is live.
    pub snapshot: Option<HealthSnapshot>,

    /// Its breaker record, if one is live.
    pub breaker: Option<BreakerRecord>,
}

/// Decides which endpoint serves the next read-only operation.
///
/// The router never fails its caller: every selection path bottoms out at
/// the primary endpoint, which is assumed reachable (a dead primary is
/// surfaced by query execution, not by routing). The fallback tiers, in
/// order: gate-healthy replica → plain round robin (coordination backend
/// missing or erroring) → primary (no replicas, all unhealthy, or deadline
/// expired).
///
/// Instances of the same service share health knowledge through the
/// coordination store; each keeps its own round-robin cursor, which spreads
/// load without requiring global agreement.
pub struct ReadRouter {
    primary: DbEndpoint,
    replicas: Arc<[ReplicaEndpoint]>,
    config: Arc<RouterConfig>,
    store: Option<Arc<dyn CoordinationStore>>,
    gate: Option<HealthGate>,
    cursor: AtomicUsize,
}

impl ReadRouter {
    /// Creates a new builder.
    pub fn builder() -> ReadRouterBuilder {
        ReadRouterBuilder::new()
    }

    /// The configured primary endpoint.
    pub fn primary(&self) -> &DbEndpoint {
        &self.primary
    }

    /// The configured replica list, in index order.
    pub fn replicas(&self) -> &[ReplicaEndpoint] {
        &self.replicas
    }

    /// Selects the endpoint for the next read.
    ///
    /// Never returns an error and never blocks beyond the configured probe
    /// timeout plus the coordination store's own latency; callers that need
    /// a hard ceiling use [`select_read_target_within`].
    ///
    /// [`select_read_target_within`]: ReadRouter::select_read_target_within
    pub async fn select_read_target(&self) -> ReadTarget {
        if self.replicas.is_empty() {
            self.emit(RouterEvent::PrimaryFallback {
                source: self.config.name.clone(),
                timestamp: Instant::now(),
                reason: FallbackReason::NoReplicas,
            });
            return ReadTarget::Primary(self.primary.clone());
        }

        let Some(gate) = &self.gate else {
            return self.round_robin();
        };

        let len = self.replicas.len();
        let start = self.cursor.load(Ordering::Relaxed);
        for i in 0..len {
            let index = (start + i) % len;
            let replica = &self.replicas[index];
            match gate.check(replica).await {
                Ok(true) => {
                    self.cursor.store((index + 1) % len, Ordering::Relaxed);
                    #[cfg(feature = "tracing")]
                    tracing::debug!(replica = index, "read routed to replica");
                    #[cfg(feature = "metrics")]
                    counter!("replica_router_selections_total", "router" => self.config.name.clone(), "target" => "replica")
                        .increment(1);
                    self.emit(RouterEvent::ReplicaSelected {
                        source: self.config.name.clone(),
                        timestamp: Instant::now(),
                        index,
                    });
                    return ReadTarget::Replica(replica.clone());
                }
                Ok(false) => continue,
                Err(_error) => {
                    // A broken coordination backend degrades selection, never
                    // the read itself.
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        error = %_error,
                        "coordination backend unavailable, routing round-robin"
                    );
                    #[cfg(feature = "metrics")]
                    counter!("replica_router_selections_total", "router" => self.config.name.clone(), "target" => "round_robin")
                        .increment(1);
                    self.emit(RouterEvent::RoundRobinFallback {
                        source: self.config.name.clone(),
                        timestamp: Instant::now(),
                    });
                    return self.round_robin();
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::warn!("all replicas unhealthy, using primary");
        self.primary_fallback(FallbackReason::AllReplicasUnhealthy)
    }

    /// Selects the endpoint for the next read, bounded by `deadline`.
    ///
    /// If the scan has not finished within the deadline (pathological
    /// coordination backend slowdown, hung probe), it is abandoned and the
    /// primary is returned. A probe lock abandoned mid-flight is reclaimed
    /// by its TTL.
    pub async fn select_read_target_within(&self, deadline: Duration) -> ReadTarget {
        match tokio::time::timeout(deadline, self.select_read_target()).await {
            Ok(target) => target,
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(deadline_millis = deadline.as_millis() as u64, "selection deadline expired, using primary");
                self.primary_fallback(FallbackReason::DeadlineExpired)
            }
        }
    }

    /// Synchronous-style selection for callers outside async code.
    ///
    /// Inside a multi-threaded tokio runtime this parks the current worker
    /// with [`tokio::task::block_in_place`]; outside any runtime it drives
    /// the selection on a transient current-thread runtime. If no runtime
    /// can be built, the primary is returned; selection never fails.
    ///
    /// # Panics
    ///
    /// Panics if called from within a current-thread tokio runtime, where
    /// `block_in_place` is unavailable. Use [`select_read_target`] there.
    ///
    /// [`select_read_target`]: ReadRouter::select_read_target
    pub fn select_read_target_blocking(&self) -> ReadTarget {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tokio::task::block_in_place(|| handle.block_on(self.select_read_target()))
            }
            Err(_) => match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime.block_on(self.select_read_target()),
                Err(_error) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_error, "no runtime available for blocking selection, using primary");
                    ReadTarget::Primary(self.primary.clone())
                }
            },
        }
    }

    /// Reads the current shared health records for every replica.
    ///
    /// Purely observational: no probes run, no records change. Without a
    /// coordination store every entry comes back empty.
    pub async fn health_details(&self) -> Result<Vec<ReplicaHealth>, StoreError> {
        let mut details = Vec::with_capacity(self.replicas.len());
        match &self.store {
            Some(store) => {
                let records = Records::new(store.as_ref(), self.config.name());
                for replica in self.replicas.iter() {
                    details.push(ReplicaHealth {
                        replica: replica.clone(),
                        snapshot: records.health(replica.index).await?,
                        breaker: records.breaker(replica.index).await?,
                    });
                }
            }
            None => {
                for replica in self.replicas.iter() {
                    details.push(ReplicaHealth {
                        replica: replica.clone(),
                        snapshot: None,
                        breaker: None,
                    });
                }
            }
        }
        Ok(details)
    }

    /// Health-blind rotation over the replica list.
    fn round_robin(&self) -> ReadTarget {
        let len = self.replicas.len();
        if len == 0 {
            return ReadTarget::Primary(self.primary.clone());
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        ReadTarget::Replica(self.replicas[index].clone())
    }

    fn primary_fallback(&self, reason: FallbackReason) -> ReadTarget {
        #[cfg(feature = "metrics")]
        counter!("replica_router_selections_total", "router" => self.config.name.clone(), "target" => "primary")
            .increment(1);
        self.emit(RouterEvent::PrimaryFallback {
            source: self.config.name.clone(),
            timestamp: Instant::now(),
            reason,
        });
        ReadTarget::Primary(self.primary.clone())
    }

    fn emit(&self, event: RouterEvent) {
        self.config.event_listeners.emit(&event);
    }
}

/// Builder for [`ReadRouter`].
///
/// # Examples
///
/// ```rust
/// use replica_router::{DbEndpoint, MemoryStore, ReadRouter};
/// use std::time::Duration;
///
/// let router = ReadRouter::builder()
///     .primary(DbEndpoint::new("db-primary", 5432, "orders"))
///     .replica(DbEndpoint::new("db-replica-1", 5432, "orders"))
///     .replica(DbEndpoint::new("db-replica-2", 5432, "orders"))
///     .store(MemoryStore::new())
///     .health_check_interval(Duration::from_secs(30))
///     .build();
/// ```
pub struct ReadRouterBuilder {
    primary: Option<DbEndpoint>,
    replicas: Vec<DbEndpoint>,
    store: Option<Arc<dyn CoordinationStore>>,
    prober: Option<Arc<dyn Prober>>,
    config: RouterConfigBuilder,
}

impl ReadRouterBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            primary: None,
            replicas: Vec::new(),
            store: None,
            prober: None,
            config: RouterConfig::builder(),
        }
    }

    /// Sets the primary (writable) endpoint. Required.
    pub fn primary(mut self, endpoint: DbEndpoint) -> Self {
        self.primary = Some(endpoint);
        self
    }

    /// Appends a read replica. Indices are assigned in call order and stay
    /// stable for the router's lifetime.
    pub fn replica(mut self, endpoint: DbEndpoint) -> Self {
        self.replicas.push(endpoint);
        self
    }

    /// Appends several read replicas in iteration order.
    pub fn replicas<I>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = DbEndpoint>,
    {
        self.replicas.extend(endpoints);
        self
    }

    /// Sets the coordination store shared by all service instances.
    ///
    /// Without one the router runs in plain round-robin mode: no health
    /// awareness, no breaker, no probes, but also no backend to fail.
    pub fn store<S>(mut self, store: S) -> Self
    where
        S: CoordinationStore + 'static,
    {
        self.store = Some(Arc::new(store));
        self
    }

    /// Like [`store`](ReadRouterBuilder::store), for an already-shared store.
    pub fn shared_store(mut self, store: Arc<dyn CoordinationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the liveness prober.
    ///
    /// Default: [`TcpProber`]
    pub fn prober<P>(mut self, prober: P) -> Self
    where
        P: Prober + 'static,
    {
        self.prober = Some(Arc::new(prober));
        self
    }

    /// Sets how long a cached health verdict stays fresh.
    ///
    /// Default: 30 seconds
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.health_check_interval(interval);
        self
    }

    /// Sets how long an opened breaker keeps a replica excluded.
    ///
    /// Default: 60 seconds
    pub fn circuit_breaker_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.circuit_breaker_timeout(timeout);
        self
    }

    /// Sets the upper bound on a single liveness probe.
    ///
    /// Default: 3 seconds
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.probe_timeout(timeout);
        self
    }

    /// Sets the TTL of the per-replica probe lock.
    ///
    /// Default: 10 seconds
    pub fn lock_ttl(mut self, ttl: Duration) -> Self {
        self.config = self.config.lock_ttl(ttl);
        self
    }

    /// Gives this router a name for observability and key namespacing.
    ///
    /// Default: `replica-router`
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.config = self.config.name(name);
        self
    }

    /// Registers a callback for every selection that lands on a replica.
    pub fn on_replica_selected<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.config = self.config.on_replica_selected(f);
        self
    }

    /// Registers a callback for every decision that fell through to the
    /// primary.
    pub fn on_primary_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(FallbackReason) + Send + Sync + 'static,
    {
        self.config = self.config.on_primary_fallback(f);
        self
    }

    /// Registers a callback invoked when a replica's breaker opens.
    pub fn on_breaker_opened<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, u32) + Send + Sync + 'static,
    {
        self.config = self.config.on_breaker_opened(f);
        self
    }

    /// Registers a callback for failed probes.
    pub fn on_probe_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, u32) + Send + Sync + 'static,
    {
        self.config = self.config.on_probe_failed(f);
        self
    }

    /// Registers a callback for probes skipped due to lock contention.
    pub fn on_lock_contended<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.config = self.config.on_lock_contended(f);
        self
    }

    /// Replaces the whole timing/listener configuration.
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = RouterConfigBuilder::from_config(config);
        self
    }

    /// Builds the router.
    ///
    /// # Panics
    ///
    /// Panics if no primary endpoint was provided. A router without a
    /// primary has no safe fallback, so this is the one configuration error
    /// that is fatal at startup rather than absorbed at request time.
    pub fn build(self) -> ReadRouter {
        let primary = self.primary.expect("primary endpoint must be provided");
        let replicas: Arc<[ReplicaEndpoint]> = self
            .replicas
            .into_iter()
            .enumerate()
            .map(|(index, endpoint)| ReplicaEndpoint { index, endpoint })
            .collect();
        let config = Arc::new(self.config.build());
        let prober = self.prober.unwrap_or_else(|| Arc::new(TcpProber));

        let gate = self.store.clone().map(|store| {
            HealthGate::new(Arc::clone(&store), Arc::clone(&prober), Arc::clone(&config))
        });

        #[cfg(feature = "tracing")]
        if gate.is_none() {
            tracing::info!(
                router = %config.name(),
                "no coordination store configured, routing reads round-robin"
            );
        }

        #[cfg(feature = "metrics")]
        metrics::gauge!("replica_router_replicas", "router" => config.name.clone())
            .set(replicas.len() as f64);

        ReadRouter {
            primary,
            replicas,
            config,
            store: self.store,
            gate,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for ReadRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;

    struct AlwaysHealthy;

    #[async_trait]
    impl Prober for AlwaysHealthy {
        async fn probe(&self, _endpoint: &DbEndpoint) -> bool {
            true
        }
    }

    fn primary() -> DbEndpoint {
        DbEndpoint::new("db-primary", 5432, "orders")
    }

    fn replica_endpoint(n: usize) -> DbEndpoint {
        DbEndpoint::new(format!("db-replica-{n}"), 5432, "orders")
    }

    #[tokio::test]
    async fn no_replicas_always_primary() {
        let router = ReadRouter::builder().primary(primary()).build();
        for _ in 0..3 {
            let target = router.select_read_target().await;
            assert!(target.is_primary());
            assert_eq!(target.endpoint(), &primary());
        }
    }

    #[tokio::test]
    async fn no_store_rotates_round_robin() {
        let router = ReadRouter::builder()
            .primary(primary())
            .replica(replica_endpoint(0))
            .replica(replica_endpoint(1))
            .build();

        let first = router.select_read_target().await;
        let second = router.select_read_target().await;
        let third = router.select_read_target().await;

        assert_eq!(first.replica_index(), Some(0));
        assert_eq!(second.replica_index(), Some(1));
        assert_eq!(third.replica_index(), Some(0)); // Wraps around
    }

    #[tokio::test]
    async fn healthy_replicas_rotate_through_the_gate() {
        let router = ReadRouter::builder()
            .primary(primary())
            .replica(replica_endpoint(0))
            .replica(replica_endpoint(1))
            .replica(replica_endpoint(2))
            .store(MemoryStore::new())
            .prober(AlwaysHealthy)
            .build();

        assert_eq!(router.select_read_target().await.replica_index(), Some(0));
        assert_eq!(router.select_read_target().await.replica_index(), Some(1));
        assert_eq!(router.select_read_target().await.replica_index(), Some(2));
        assert_eq!(router.select_read_target().await.replica_index(), Some(0));
    }

    #[tokio::test]
    async fn replica_indices_follow_configuration_order() {
        let router = ReadRouter::builder()
            .primary(primary())
            .replicas(vec![replica_endpoint(0), replica_endpoint(1)])
            .build();

        let replicas = router.replicas();
        assert_eq!(replicas.len(), 2);
        assert_eq!(replicas[0].index, 0);
        assert_eq!(replicas[0].endpoint, replica_endpoint(0));
        assert_eq!(replicas[1].index, 1);
        assert_eq!(replicas[1].endpoint, replica_endpoint(1));
    }

    #[tokio::test]
    async fn health_details_without_store_is_empty_per_replica() {
        let router = ReadRouter::builder()
            .primary(primary())
            .replica(replica_endpoint(0))
            .build();

        let details = router.health_details().await.unwrap();
        assert_eq!(details.len(), 1);
        assert!(details[0].snapshot.is_none());
        assert!(details[0].breaker.is_none());
    }

    #[test]
    #[should_panic(expected = "primary endpoint must be provided")]
    fn build_without_primary_panics() {
        let _ = ReadRouter::builder().replica(replica_endpoint(0)).build();
    }

    #[test]
    fn blocking_selection_outside_a_runtime() {
        let router = ReadRouter::builder()
            .primary(primary())
            .replica(replica_endpoint(0))
            .replica(replica_endpoint(1))
            .build();

        assert_eq!(
            router.select_read_target_blocking().replica_index(),
            Some(0)
        );
        assert_eq!(
            router.select_read_target_blocking().replica_index(),
            Some(1)
        );
    }
}
