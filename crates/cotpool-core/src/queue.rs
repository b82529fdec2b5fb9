// ── Delivery queue ──
//
// Hand-off point to the asynchronous delivery workers. Submitting is the
// last thing the pool does with a job; acknowledgements never come back.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::CoreError;
use crate::model::{ConnectionId, DeliveryJob};

#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    /// Enqueue `job` on the partition for `partition`. Returns once the
    /// queue has accepted the job, not once it has been delivered.
    async fn submit(&self, partition: &ConnectionId, job: DeliveryJob) -> Result<(), CoreError>;
}

/// A serialized job as seen by the worker side of [`ChannelDeliveryQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub partition: String,
    pub payload: String,
}

/// Bounded in-process queue. Jobs are serialized to JSON at submit time
/// so workers see exactly what an external queue would carry.
pub struct ChannelDeliveryQueue {
    tx: mpsc::Sender<QueuedJob>,
}

impl ChannelDeliveryQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueuedJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DeliveryQueue for ChannelDeliveryQueue {
    async fn submit(&self, partition: &ConnectionId, job: DeliveryJob) -> Result<(), CoreError> {
        let queued = QueuedJob {
            partition: partition.to_string(),
            payload: serde_json::to_string(&job)?,
        };
        self.tx.try_send(queued).map_err(|e| CoreError::Queue {
            message: match e {
                TrySendError::Full(_) => "queue full".into(),
                TrySendError::Closed(_) => "queue closed".into(),
            },
        })
    }
}
