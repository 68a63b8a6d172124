//! Events emitted while routing reads.

use replica_router_core::events::RoutingEvent;
use std::time::Instant;

/// Why a routing decision fell through to the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No replicas are configured; the primary is the only target.
    NoReplicas,

    /// A full scan found no replica that passed the health gate.
    AllReplicasUnhealthy,

    /// The caller's deadline expired before the scan finished.
    DeadlineExpired,
}

/// Events emitted by a router instance.
///
/// Every variant carries the router's configured name (`source`) and the
/// moment it occurred; listeners are registered through the configuration
/// builder.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    /// A replica passed the health gate and was selected.
    ReplicaSelected {
        source: String,
        timestamp: Instant,
        index: usize,
    },

    /// The decision fell through to the primary endpoint.
    PrimaryFallback {
        source: String,
        timestamp: Instant,
        reason: FallbackReason,
    },

    /// The coordination backend failed mid-scan; this decision was made by
    /// plain round robin instead.
    RoundRobinFallback {
        source: String,
        timestamp: Instant,
    },

    /// A replica was excluded because its breaker is open.
    BreakerRejected {
        source: String,
        timestamp: Instant,
        index: usize,
    },

    /// A probe failed and the replica's breaker was opened.
    BreakerOpened {
        source: String,
        timestamp: Instant,
        index: usize,
        open_until_millis: u64,
        consecutive_failures: u32,
    },

    /// A probe completed successfully.
    ProbeSucceeded {
        source: String,
        timestamp: Instant,
        index: usize,
    },

    /// A probe failed or timed out.
    ProbeFailed {
        source: String,
        timestamp: Instant,
        index: usize,
        consecutive_failures: u32,
    },

    /// A due probe was skipped because another instance holds the probe lock.
    LockContended {
        source: String,
        timestamp: Instant,
        index: usize,
    },
}

impl RoutingEvent for RouterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RouterEvent::ReplicaSelected { .. } => "replica_selected",
            RouterEvent::PrimaryFallback { .. } => "primary_fallback",
            RouterEvent::RoundRobinFallback { .. } => "round_robin_fallback",
            RouterEvent::BreakerRejected { .. } => "breaker_rejected",
            RouterEvent::BreakerOpened { .. } => "breaker_opened",
            RouterEvent::ProbeSucceeded { .. } => "probe_succeeded",
            RouterEvent::ProbeFailed { .. } => "probe_failed",
            RouterEvent::LockContended { .. } => "lock_contended",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RouterEvent::ReplicaSelected { timestamp, .. }
            | RouterEvent::PrimaryFallback { timestamp, .. }
            | RouterEvent::RoundRobinFallback { timestamp, .. }
            | RouterEvent::BreakerRejected { timestamp, .. }
            | RouterEvent::BreakerOpened { timestamp, .. }
            | RouterEvent::ProbeSucceeded { timestamp, .. }
            | RouterEvent::ProbeFailed { timestamp, .. }
            | RouterEvent::LockContended { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            RouterEvent::ReplicaSelected { source, .. }
            | RouterEvent::PrimaryFallback { source, .. }
            | RouterEvent::RoundRobinFallback { source, .. }
            | RouterEvent::BreakerRejected { source, .. }
            | RouterEvent::BreakerOpened { source, .. }
            | RouterEvent::ProbeSucceeded { source, .. }
            | RouterEvent::ProbeFailed { source, .. }
            | RouterEvent::LockContended { source, .. } => source,
        }
    }
}
