//! Configuration for the read router.

use crate::events::{FallbackReason, RouterEvent};
use replica_router_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Timing knobs, instance name, and event listeners for a router.
///
/// The name doubles as the key namespace in the coordination store, so two
/// routers sharing a backend must either share a name (to share health
/// knowledge) or use distinct names (to keep their records apart).
#[derive(Clone)]
pub struct RouterConfig {
    pub(crate) health_check_interval: Duration,
    pub(crate) circuit_breaker_timeout: Duration,
    pub(crate) probe_timeout: Duration,
    pub(crate) lock_ttl: Duration,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<RouterEvent>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            circuit_breaker_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(3),
            lock_ttl: Duration::from_secs(10),
            name: String::from("replica-router"),
            event_listeners: EventListeners::new(),
        }
    }
}

impl RouterConfig {
    /// Creates a new builder.
    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::default()
    }

    /// How long a health verdict stays fresh before a re-probe is due.
    pub fn health_check_interval(&self) -> Duration {
        self.health_check_interval
    }

    /// How long an opened breaker excludes a replica.
    pub fn circuit_breaker_timeout(&self) -> Duration {
        self.circuit_breaker_timeout
    }

    /// Upper bound on a single liveness probe.
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// TTL of the per-replica probe lock.
    pub fn lock_ttl(&self) -> Duration {
        self.lock_ttl
    }

    /// The router instance name, also used as the coordination key namespace.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for [`RouterConfig`].
#[derive(Default)]
pub struct RouterConfigBuilder {
    health_check_interval: Option<Duration>,
    circuit_breaker_timeout: Option<Duration>,
    probe_timeout: Option<Duration>,
    lock_ttl: Option<Duration>,
    name: Option<String>,
    event_listeners: EventListeners<RouterEvent>,
}

impl RouterConfigBuilder {
    /// Builder seeded from an existing configuration.
    pub(crate) fn from_config(config: RouterConfig) -> Self {
        Self {
            health_check_interval: Some(config.health_check_interval),
            circuit_breaker_timeout: Some(config.circuit_breaker_timeout),
            probe_timeout: Some(config.probe_timeout),
            lock_ttl: Some(config.lock_ttl),
            name: Some(config.name),
            event_listeners: config.event_listeners,
        }
    }

    /// Sets how long a cached health verdict stays fresh.
    ///
    /// A replica probed within this window is not probed again; its cached
    /// verdict is used as-is. Health snapshots in the coordination store
    /// carry this as their TTL.
    ///
    /// Default: 30 seconds
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = Some(interval);
        self
    }

    /// Sets how long an opened breaker keeps a replica excluded.
    ///
    /// After a failed probe the replica is skipped by every instance sharing
    /// the coordination store until this much time has passed.
    ///
    /// Default: 60 seconds
    pub fn circuit_breaker_timeout(mut self, timeout: Duration) -> Self {
        self.circuit_breaker_timeout = Some(timeout);
        self
    }

    /// Sets the upper bound on a single liveness probe.
    ///
    /// A probe that has not completed within this duration counts as a
    /// failure. Probes never retry internally; the next attempt happens on
    /// the next health-check interval.
    ///
    /// Default: 3 seconds
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Sets the TTL of the per-replica probe lock.
    ///
    /// An instance that dies mid-probe leaves its lock behind; the TTL is the
    /// bound on how long the replica stays unprobed because of it.
    ///
    /// Default: 10 seconds
    pub fn lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = Some(ttl);
        self
    }

    /// Gives this router a name for observability and key namespacing.
    ///
    /// Default: `replica-router`
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Registers a callback for every selection that lands on a replica.
    ///
    /// The callback receives the selected replica's index.
    ///
    /// # Example
    /// ```rust
    /// use replica_router::RouterConfig;
    ///
    /// let config = RouterConfig::builder()
    ///     .on_replica_selected(|index| {
    ///         println!("read routed to replica {index}");
    ///     })
    ///     .build();
    /// ```
    pub fn on_replica_selected<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RouterEvent| {
                if let RouterEvent::ReplicaSelected { index, .. } = event {
                    f(*index);
                }
            }));
        self
    }

    /// Registers a callback for every decision that fell through to the
    /// primary, with the reason.
    pub fn on_primary_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(FallbackReason) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RouterEvent| {
                if let RouterEvent::PrimaryFallback { reason, .. } = event {
                    f(*reason);
                }
            }));
        self
    }

    /// Registers a callback invoked when a replica's breaker opens.
    ///
    /// The callback receives the replica index and its consecutive failure
    /// count, which may have been accumulated across several instances.
    ///
    /// # Example
    /// ```rust
    /// use replica_router::RouterConfig;
    ///
    /// let config = RouterConfig::builder()
    ///     .on_breaker_opened(|index, failures| {
    ///         eprintln!("replica {index} excluded after {failures} consecutive failures");
    ///     })
    ///     .build();
    /// ```
    pub fn on_breaker_opened<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, u32) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RouterEvent| {
                if let RouterEvent::BreakerOpened {
                    index,
                    consecutive_failures,
                    ..
                } = event
                {
                    f(*index, *consecutive_failures);
                }
            }));
        self
    }

    /// Registers a callback for failed probes.
    pub fn on_probe_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, u32) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RouterEvent| {
                if let RouterEvent::ProbeFailed {
                    index,
                    consecutive_failures,
                    ..
                } = event
                {
                    f(*index, *consecutive_failures);
                }
            }));
        self
    }

    /// Registers a callback for probes skipped because another instance holds
    /// the probe lock.
    pub fn on_lock_contended<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RouterEvent| {
                if let RouterEvent::LockContended { index, .. } = event {
                    f(*index);
                }
            }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RouterConfig {
        let default = RouterConfig::default();
        RouterConfig {
            health_check_interval: self
                .health_check_interval
                .unwrap_or(default.health_check_interval),
            circuit_breaker_timeout: self
                .circuit_breaker_timeout
                .unwrap_or(default.circuit_breaker_timeout),
            probe_timeout: self.probe_timeout.unwrap_or(default.probe_timeout),
            lock_ttl: self.lock_ttl.unwrap_or(default.lock_ttl),
            name: self.name.unwrap_or(default.name),
            event_listeners: self.event_listeners,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.health_check_interval(), Duration::from_secs(30));
        assert_eq!(config.circuit_breaker_timeout(), Duration::from_secs(60));
        assert_eq!(config.probe_timeout(), Duration::from_secs(3));
        assert_eq!(config.lock_ttl(), Duration::from_secs(10));
        assert_eq!(config.name(), "replica-router");
    }

    #[test]
    fn builder_overrides() {
        let config = RouterConfig::builder()
            .health_check_interval(Duration::from_secs(5))
            .circuit_breaker_timeout(Duration::from_secs(20))
            .probe_timeout(Duration::from_millis(500))
            .lock_ttl(Duration::from_secs(2))
            .name("orders-read")
            .build();

        assert_eq!(config.health_check_interval(), Duration::from_secs(5));
        assert_eq!(config.circuit_breaker_timeout(), Duration::from_secs(20));
        assert_eq!(config.probe_timeout(), Duration::from_millis(500));
        assert_eq!(config.lock_ttl(), Duration::from_secs(2));
        assert_eq!(config.name(), "orders-read");
    }

    #[test]
    fn builder_partial() {
        let config = RouterConfig::builder()
            .health_check_interval(Duration::from_secs(10))
            .build();

        assert_eq!(config.health_check_interval(), Duration::from_secs(10));
        assert_eq!(config.probe_timeout(), Duration::from_secs(3)); // Default
    }
}
