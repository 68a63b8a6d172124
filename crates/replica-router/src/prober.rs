//! Liveness probing of candidate replicas.

use crate::endpoint::DbEndpoint;
use async_trait::async_trait;
use tokio::net::TcpStream;

/// Checks whether one replica endpoint can serve a read right now.
///
/// The router applies its configured probe timeout around every call; a probe
/// that runs past it counts as a failure. Implementations must not retry
/// internally (a failed probe is retried on the next health-check interval,
/// not within the call) and must close whatever connection they open on
/// every exit path.
///
/// # Examples
///
/// A database-level prober that runs a trivial statement:
///
/// ```rust,ignore
/// use replica_router::{DbEndpoint, Prober};
/// use async_trait::async_trait;
///
/// struct SelectOneProber {
///     pool: sqlx::PgPool,
/// }
///
/// #[async_trait]
/// impl Prober for SelectOneProber {
///     async fn probe(&self, endpoint: &DbEndpoint) -> bool {
///         let url = format!("postgres://{}", endpoint);
///         match sqlx::PgConnection::connect(&url).await {
///             Ok(mut conn) => sqlx::query("SELECT 1").execute(&mut conn).await.is_ok(),
///             Err(_) => false,
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Prober: Send + Sync {
    /// Returns true if the endpoint answered the liveness check.
    async fn probe(&self, endpoint: &DbEndpoint) -> bool;
}

// Shared probers can be handed to several routers.
#[async_trait]
impl<P> Prober for std::sync::Arc<P>
where
    P: Prober + ?Sized,
{
    async fn probe(&self, endpoint: &DbEndpoint) -> bool {
        self.as_ref().probe(endpoint).await
    }
}

/// Connect-level liveness: the endpoint is healthy if a TCP connection to it
/// can be established.
///
/// This is the default prober. It cannot tell a replica that accepts
/// connections but fails queries from a healthy one; applications that need
/// that distinction supply their own [`Prober`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, endpoint: &DbEndpoint) -> bool {
        match TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await {
            Ok(stream) => {
                drop(stream);
                true
            }
            Err(_error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(endpoint = %endpoint, error = %_error, "liveness probe failed");
                false
            }
        }
    }
}
