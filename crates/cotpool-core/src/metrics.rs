// ── Connection heartbeats ──

use async_trait::async_trait;

use crate::error::CoreError;

/// Receives liveness heartbeats for persisted connections.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn post_heartbeat(&self, connection: i64) -> Result<(), CoreError>;
}
