// ── Backing stores ──
//
// Read-only views of the connection and sink tables. The pool never
// writes to either; CRUD happens elsewhere and invalidates caches.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::CoreError;
use crate::model::{ConnectionConfig, ConnectionId, Sink};

/// Sequential read of every connection row.
///
/// Rows are validated independently. A row that cannot be turned into a
/// `ConnectionConfig` is yielded as [`CoreError::InvalidConnection`] and
/// only that row fails. Any other `Err` item is a stream-level failure
/// and aborts the bring-up pass consuming the stream. Credential checks
/// happen in [`ConnectionRegistry::add`](crate::ConnectionRegistry::add).
pub trait ConfigStore: Send + Sync {
    fn connections(&self) -> BoxStream<'_, Result<ConnectionConfig, CoreError>>;
}

/// Lookup of delivery sinks by connection.
#[async_trait]
pub trait SinkStore: Send + Sync {
    /// All sinks for `connection` with `enabled = true`.
    async fn list_enabled_sinks(&self, connection: &ConnectionId) -> Result<Vec<Sink>, CoreError>;
}

/// In-memory sink table, grouped by connection.
#[derive(Debug, Default)]
pub struct StaticSinkStore {
    by_connection: HashMap<ConnectionId, Vec<Sink>>,
}

impl StaticSinkStore {
    pub fn new(sinks: impl IntoIterator<Item = Sink>) -> Self {
        let mut by_connection: HashMap<ConnectionId, Vec<Sink>> = HashMap::new();
        for sink in sinks {
            by_connection
                .entry(sink.connection.clone())
                .or_default()
                .push(sink);
        }
        Self { by_connection }
    }

    pub fn len(&self) -> usize {
        self.by_connection.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SinkStore for StaticSinkStore {
    async fn list_enabled_sinks(&self, connection: &ConnectionId) -> Result<Vec<Sink>, CoreError> {
        Ok(self
            .by_connection
            .get(connection)
            .map(|sinks| sinks.iter().filter(|s| s.enabled).cloned().collect())
            .unwrap_or_default())
    }
}
