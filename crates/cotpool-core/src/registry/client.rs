// ── Connection client ──
//
// One registered connection: its config snapshot, its transport, the
// retry state the controller mutates, and every task spawned on its
// behalf. `shutdown` is the only way resources are released.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::retry;
use crate::config::RetryPolicy;
use crate::model::{ConnectionConfig, ConnectionId};
use crate::transport::Transport;

pub struct ConnectionClient {
    config: Arc<ConnectionConfig>,
    transport: Arc<dyn Transport>,
    ephemeral: bool,
    retry: AtomicU32,
    initial: AtomicBool,
    pub(crate) retry_pending: AtomicBool,
    pub(crate) cancel: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionClient {
    pub(crate) fn new(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        ephemeral: bool,
    ) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            ephemeral,
            retry: AtomicU32::new(0),
            initial: AtomicBool::new(true),
            retry_pending: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
            pump: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.config.id
    }

    pub fn config(&self) -> &Arc<ConnectionConfig> {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Ephemeral clients are excluded from heartbeats and sink fanout.
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Consecutive failed attempts since the last received message.
    pub fn retry_count(&self) -> u32 {
        self.retry.load(Ordering::Acquire)
    }

    /// True until the first message arrives on this client.
    pub fn is_initial(&self) -> bool {
        self.initial.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// A message arrived: the connection is healthy again.
    pub(crate) fn mark_received(&self) {
        self.retry.store(0, Ordering::Release);
        self.initial.store(false, Ordering::Release);
    }

    /// Advance the retry counter and return how long to wait before the
    /// next attempt, or `None` if the client has been abandoned.
    pub(crate) fn next_retry_delay(&self, policy: &RetryPolicy) -> Option<Duration> {
        let initial = self.is_initial();
        let mut delay = None;
        self.retry
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                let (next, wait) = retry::next_attempt(policy, initial, count)?;
                delay = Some(wait);
                Some(next)
            })
            .ok()?;
        delay
    }

    /// Spawn a task owned by this client. Returns `false` once the client
    /// has been shut down.
    pub(crate) fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return false;
        }
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
        true
    }

    pub(crate) fn set_pump(&self, handle: JoinHandle<()>) {
        *self.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Stop the event task, abort every task spawned for this client
    /// (pending retries included), and destroy the transport. Nothing
    /// spawned for the client is still running when this returns.
    pub(crate) async fn shutdown(&self) {
        self.cancel.cancel();

        let pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pump) = pump {
            pump.abort();
            let _ = pump.await;
        }

        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        self.transport.destroy();
        debug!(connection = %self.config.id, "client shut down");
    }
}

impl std::fmt::Debug for ConnectionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionClient")
            .field("id", &self.config.id)
            .field("name", &self.config.name)
            .field("ephemeral", &self.ephemeral)
            .field("retry", &self.retry_count())
            .field("initial", &self.is_initial())
            .finish_non_exhaustive()
    }
}
