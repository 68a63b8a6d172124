//! Connection descriptors for the primary and its read replicas.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque database connection descriptor.
///
/// Carries everything the embedding application needs to open a connection:
/// host, port, database name, and an optional reference into whatever secret
/// storage the application uses. The router never dereferences credentials;
/// it only hands the descriptor back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbEndpoint {
    /// Host name or address.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Reference to a credential in the application's secret store, if any.
    pub credentials_ref: Option<String>,
}

impl DbEndpoint {
    /// Creates a descriptor with no credentials reference.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            credentials_ref: None,
        }
    }

    /// Attaches a credentials reference.
    pub fn with_credentials_ref(mut self, reference: impl Into<String>) -> Self {
        self.credentials_ref = Some(reference.into());
        self
    }
}

impl fmt::Display for DbEndpoint {
    // Credentials references are deliberately left out of the rendering.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.database)
    }
}

/// A replica endpoint plus its stable position in the configured list.
///
/// The index is assigned by the router builder in configuration order and
/// never changes for the lifetime of the process; it keys every record the
/// router shares through the coordination store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaEndpoint {
    /// Position in the configured replica list.
    pub index: usize,

    /// The connection descriptor.
    pub endpoint: DbEndpoint,
}

/// The connection target a routing decision resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadTarget {
    /// The single writable endpoint, used as the universal fallback.
    Primary(DbEndpoint),

    /// A read replica that passed the health gate (or was picked by plain
    /// round robin when no coordination backend is available).
    Replica(ReplicaEndpoint),
}

impl ReadTarget {
    /// The connection descriptor to open.
    pub fn endpoint(&self) -> &DbEndpoint {
        match self {
            ReadTarget::Primary(endpoint) => endpoint,
            ReadTarget::Replica(replica) => &replica.endpoint,
        }
    }

    /// Returns true if the decision fell through to the primary.
    pub fn is_primary(&self) -> bool {
        matches!(self, ReadTarget::Primary(_))
    }

    /// The replica index, when a replica was selected.
    pub fn replica_index(&self) -> Option<usize> {
        match self {
            ReadTarget::Primary(_) => None,
            ReadTarget::Replica(replica) => Some(replica.index),
        }
    }
}
