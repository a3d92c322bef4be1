// Boundary to the wire transport. The channel hands out client handles once connected;
// status changes reach the agent through the ConnectionStatusMonitor.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::models::MetricBatch;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport channel is not connected")]
    NotConnected,
    #[error("client handle belongs to a previous connection")]
    StaleHandle,
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("request timed out after {0} ms")]
    Timeout(u64),
}

/// Outbound handle bound to one live connection.
pub trait MetricsClient: Send + Sync {
    /// Sends one batch. The response body is not used.
    fn collect(&self, batch: MetricBatch) -> BoxFuture<'_, Result<(), TransportError>>;
}

pub trait TransportChannel: Send + Sync {
    /// Builds a client bound to the current connection. Called from a status listener,
    /// so it must not block.
    fn client(&self) -> Result<Arc<dyn MetricsClient>, TransportError>;
}
