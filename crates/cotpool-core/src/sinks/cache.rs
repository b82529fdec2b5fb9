// ── Per-connection sink list cache ──
//
// Each key holds a `OnceCell` so concurrent misses share one backing
// query: the first caller runs the loader, the rest wait on the cell.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::error::CoreError;
use crate::model::{ConnectionId, Sink};

pub(crate) type SinkList = Arc<[Sink]>;

#[derive(Default)]
pub(crate) struct SinkCache {
    entries: DashMap<ConnectionId, Arc<OnceCell<SinkList>>>,
}

impl SinkCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Cached list for `connection`, running `load` on a miss. A failed
    /// load leaves the entry empty; the next caller retries.
    pub(crate) async fn get_or_load<F, Fut>(
        &self,
        connection: &ConnectionId,
        load: F,
    ) -> Result<SinkList, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Sink>, CoreError>>,
    {
        // Clone the cell out so no shard lock is held across the await.
        let cell = Arc::clone(self.entries.entry(connection.clone()).or_default().value());

        let sinks = cell
            .get_or_try_init(|| async move { load().await.map(SinkList::from) })
            .await?;
        Ok(Arc::clone(sinks))
    }

    /// Drop the cached list. Returns `true` if an entry existed.
    pub(crate) fn invalidate(&self, connection: &ConnectionId) -> bool {
        self.entries.remove(connection).is_some()
    }

    pub(crate) fn is_cached(&self, connection: &ConnectionId) -> bool {
        self.entries
            .get(connection)
            .is_some_and(|cell| cell.initialized())
    }
}
