// ── Sink fanout ──
//
// Turns one inbound atom into one delivery job per enabled sink and
// hands each job to the delivery queue. Every sink is prepared in its
// own task so a failing handler only costs that sink its job.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::cache::SinkCache;
use super::handler::SinkHandlers;
use crate::error::CoreError;
use crate::model::{ConnectionId, CotMessage, DeliveryJob, Feature};
use crate::queue::DeliveryQueue;
use crate::store::SinkStore;

/// Outcome of fanning one message out to a connection's sinks.
#[derive(Debug, Default)]
pub struct SinkReport {
    /// Sink ids whose job the queue accepted.
    pub submitted: Vec<i64>,
    /// Sinks skipped because they were not ready or their job could not
    /// be built or queued.
    pub skipped: Vec<(i64, CoreError)>,
}

pub struct SinkFanout {
    store: Arc<dyn SinkStore>,
    handlers: Arc<SinkHandlers>,
    queue: Arc<dyn DeliveryQueue>,
    cache: SinkCache,
}

impl SinkFanout {
    pub fn new(
        store: Arc<dyn SinkStore>,
        handlers: SinkHandlers,
        queue: Arc<dyn DeliveryQueue>,
    ) -> Self {
        Self {
            store,
            handlers: Arc::new(handlers),
            queue,
            cache: SinkCache::new(),
        }
    }

    pub fn handlers(&self) -> &SinkHandlers {
        &self.handlers
    }

    /// Forget the cached sink list for `connection`. Sink create, update,
    /// and delete paths call this so the next message reloads it.
    pub fn invalidate(&self, connection: &ConnectionId) -> bool {
        self.cache.invalidate(connection)
    }

    /// Build and submit a delivery job for every enabled sink of
    /// `connection`. Returns once every job has been handed to the queue.
    ///
    /// Only the sink-list lookup can fail the call as a whole; per-sink
    /// failures are logged and reported in [`SinkReport::skipped`].
    pub async fn deliver(
        &self,
        connection: &ConnectionId,
        message: &CotMessage,
    ) -> Result<SinkReport, CoreError> {
        let sinks = self
            .cache
            .get_or_load(connection, || self.store.list_enabled_sinks(connection))
            .await?;

        let mut report = SinkReport::default();
        if sinks.is_empty() {
            return Ok(report);
        }

        let feature = Arc::new(message.to_geojson());
        let mut jobs = JoinSet::new();

        for sink in sinks.iter() {
            let Some(handler) = self.handlers.get(&sink.sink_type).cloned() else {
                let err = CoreError::UnknownSinkType {
                    sink: sink.id,
                    sink_type: sink.sink_type.clone(),
                };
                warn!(connection = %connection, sink = sink.id, error = %err, "skipping sink");
                report.skipped.push((sink.id, err));
                continue;
            };

            let sink = sink.clone();
            let feature = Arc::clone(&feature);
            let queue = Arc::clone(&self.queue);
            let partition = connection.clone();

            jobs.spawn(async move {
                let result = async {
                    if !handler.is_prepared(&sink).await? {
                        return Err(CoreError::SinkNotReady { sink: sink.id });
                    }
                    let secrets = handler.secrets(&sink).await?;
                    let job = DeliveryJob::new(&sink, Feature::clone(&feature), secrets);
                    queue.submit(&partition, job).await
                }
                .await;
                (sink.id, result)
            });
        }

        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok((id, Ok(()))) => report.submitted.push(id),
                Ok((id, Err(e))) => {
                    warn!(connection = %connection, sink = id, error = %e, "sink delivery skipped");
                    report.skipped.push((id, e));
                }
                Err(e) => error!(connection = %connection, error = %e, "sink task panicked"),
            }
        }

        report.submitted.sort_unstable();
        debug!(
            connection = %connection,
            submitted = report.submitted.len(),
            skipped = report.skipped.len(),
            "sink fanout complete"
        );
        Ok(report)
    }
}
