//! Per-replica health gate.
//!
//! Combines the breaker record, the cached snapshot, the probe lock and the
//! prober into a single verdict per replica. States are implicit in the
//! records:
//!
//! ```text
//! UNKNOWN ── probe ok ──▶ HEALTHY ── interval elapses ──▶ UNKNOWN
//! HEALTHY | UNKNOWN ── probe fails ──▶ UNHEALTHY + breaker open
//! breaker open ── open_until elapses ──▶ UNKNOWN
//! ```
//!
//! While the breaker is open, probing is suppressed regardless of snapshot
//! freshness.

use crate::config::RouterConfig;
use crate::endpoint::ReplicaEndpoint;
use crate::events::RouterEvent;
use crate::lock::ProbeLock;
use crate::prober::Prober;
use crate::store::{now_millis, BreakerRecord, HealthSnapshot, Records};
#[cfg(feature = "metrics")]
use metrics::counter;
use replica_router_core::store::{CoordinationStore, StoreError};
use std::sync::Arc;
use std::time::Instant;

pub(crate) struct HealthGate {
    store: Arc<dyn CoordinationStore>,
    prober: Arc<dyn Prober>,
    config: Arc<RouterConfig>,
}

impl HealthGate {
    pub(crate) fn new(
        store: Arc<dyn CoordinationStore>,
        prober: Arc<dyn Prober>,
        config: Arc<RouterConfig>,
    ) -> Self {
        Self {
            store,
            prober,
            config,
        }
    }

    /// Whether `replica` may serve the next read.
    ///
    /// Probe failures are a verdict (`Ok(false)`), not an error; only
    /// coordination store failures propagate, and the router maps those to
    /// its round-robin tier. The caller of the router never sees either.
    pub(crate) async fn check(&self, replica: &ReplicaEndpoint) -> Result<bool, StoreError> {
        let records = Records::new(self.store.as_ref(), self.config.name());
        let index = replica.index;
        let now = now_millis();

        // Fast reject: a tripped breaker suppresses everything else.
        if let Some(breaker) = records.breaker(index).await? {
            if breaker.is_tripped(now) {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    replica = index,
                    open_until_millis = breaker.open_until_millis,
                    "replica excluded, breaker open"
                );
                #[cfg(feature = "metrics")]
                counter!("replica_router_breaker_rejections_total", "router" => self.config.name.clone())
                    .increment(1);
                self.emit(RouterEvent::BreakerRejected {
                    source: self.config.name.clone(),
                    timestamp: Instant::now(),
                    index,
                });
                return Ok(false);
            }
        }

        let snapshot = records.health(index).await?;
        if let Some(snapshot) = &snapshot {
            if snapshot.is_fresh(now, self.config.health_check_interval()) {
                return Ok(snapshot.is_healthy);
            }
        }

        // A probe is due. Whoever wins the lock probes; everyone else reuses
        // the previous verdict, stale or not, and an unknown replica is never
        // assumed healthy.
        let lock_ttl = self.config.lock_ttl();
        let Some(lock) =
            ProbeLock::try_acquire(self.store.as_ref(), records.lock_key(index), lock_ttl).await?
        else {
            #[cfg(feature = "tracing")]
            tracing::debug!(replica = index, "probe skipped, another instance is probing");
            #[cfg(feature = "metrics")]
            counter!("replica_router_lock_contention_total", "router" => self.config.name.clone())
                .increment(1);
            self.emit(RouterEvent::LockContended {
                source: self.config.name.clone(),
                timestamp: Instant::now(),
                index,
            });
            return Ok(snapshot.map(|s| s.is_healthy).unwrap_or(false));
        };

        let healthy = match tokio::time::timeout(
            self.config.probe_timeout(),
            self.prober.probe(&replica.endpoint),
        )
        .await
        {
            Ok(verdict) => verdict,
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(replica = index, "liveness probe timed out");
                false
            }
        };

        let write_back = self.write_back(&records, index, now, healthy, snapshot).await;

        // The lock is released on every path out of the probe; if the delete
        // itself fails, the TTL reclaims it.
        if let Err(_error) = lock.release().await {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                replica = index,
                error = %_error,
                "failed to release probe lock, waiting for TTL"
            );
        }

        write_back?;
        Ok(healthy)
    }

    async fn write_back(
        &self,
        records: &Records<'_>,
        index: usize,
        now: u64,
        healthy: bool,
        previous: Option<HealthSnapshot>,
    ) -> Result<(), StoreError> {
        let interval = self.config.health_check_interval();
        let breaker_timeout = self.config.circuit_breaker_timeout();

        if healthy {
            records
                .put_health(index, &HealthSnapshot::healthy(now), interval)
                .await?;
            records.clear_breaker(index).await?;

            #[cfg(feature = "tracing")]
            tracing::debug!(replica = index, "liveness probe succeeded");
            #[cfg(feature = "metrics")]
            counter!("replica_router_probes_total", "router" => self.config.name.clone(), "outcome" => "success")
                .increment(1);
            self.emit(RouterEvent::ProbeSucceeded {
                source: self.config.name.clone(),
                timestamp: Instant::now(),
                index,
            });
            return Ok(());
        }

        let consecutive_failures = previous
            .map(|s| s.consecutive_failures)
            .unwrap_or(0)
            .saturating_add(1);
        records
            .put_health(
                index,
                &HealthSnapshot::unhealthy(now, consecutive_failures),
                interval,
            )
            .await?;

        let breaker = BreakerRecord::open(now, breaker_timeout, consecutive_failures);
        records
            .open_breaker(index, &breaker, breaker_timeout)
            .await?;

        #[cfg(feature = "tracing")]
        tracing::warn!(
            replica = index,
            consecutive_failures,
            open_until_millis = breaker.open_until_millis,
            "probe failed, breaker opened"
        );
        #[cfg(feature = "metrics")]
        {
            counter!("replica_router_probes_total", "router" => self.config.name.clone(), "outcome" => "failure")
                .increment(1);
            counter!("replica_router_breaker_opened_total", "router" => self.config.name.clone())
                .increment(1);
        }
        self.emit(RouterEvent::ProbeFailed {
            source: self.config.name.clone(),
            timestamp: Instant::now(),
            index,
            consecutive_failures,
        });
        self.emit(RouterEvent::BreakerOpened {
            source: self.config.name.clone(),
            timestamp: Instant::now(),
            index,
            open_until_millis: breaker.open_until_millis,
            consecutive_failures,
        });
        Ok(())
    }

    fn emit(&self, event: RouterEvent) {
        self.config.event_listeners.emit(&event);
    }
}
