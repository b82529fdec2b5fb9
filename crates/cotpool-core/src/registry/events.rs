// ── Per-connection event task ──
//
// Drains one transport's event channel in order. Nothing here awaits a
// collaborator: fanout only enqueues, and mission, heartbeat and retry
// work is spawned onto the client so the next frame is never held up.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::client::ConnectionClient;
use super::retry;
use crate::config::PoolSettings;
use crate::fanout::InboundFanout;
use crate::metrics::MetricsSink;
use crate::mission::MissionResubscriber;
use crate::transport::TransportEvent;

/// Shared collaborators every event task needs.
#[derive(Clone)]
pub(crate) struct EventContext {
    pub(crate) fanout: Arc<InboundFanout>,
    pub(crate) resubscriber: MissionResubscriber,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    pub(crate) settings: Arc<PoolSettings>,
}

pub(crate) async fn run(
    ctx: EventContext,
    client: Arc<ConnectionClient>,
    mut events: mpsc::Receiver<TransportEvent>,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = client.cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        dispatch(&ctx, &client, event);
    }
    debug!(connection = %client.id(), "event task stopped");
}

fn dispatch(ctx: &EventContext, client: &Arc<ConnectionClient>, event: TransportEvent) {
    let name = event.name();
    trace!(connection = %client.id(), event = name, "transport event");

    match event {
        TransportEvent::Cot(message) => {
            client.mark_received();
            let _ = ctx
                .fanout
                .deliver(client.id(), Arc::new(message), client.is_ephemeral());
        }
        TransportEvent::SecureConnect => {
            let resubscriber = ctx.resubscriber.clone();
            let config = Arc::clone(client.config());
            client.spawn(async move {
                resubscriber.resubscribe(&config).await;
            });
        }
        TransportEvent::Ping => heartbeat(ctx, client),
        TransportEvent::Error(reason) => {
            warn!(connection = %client.id(), error = %reason, "transport error");
            retry::schedule(client, &ctx.settings.retry);
        }
        TransportEvent::End | TransportEvent::Timeout => {
            warn!(connection = %client.id(), event = name, "transport closed");
            retry::schedule(client, &ctx.settings.retry);
        }
    }
}

fn heartbeat(ctx: &EventContext, client: &ConnectionClient) {
    let settings = &ctx.settings;
    if client.is_ephemeral() || settings.is_test_stack() || !settings.metrics_enabled {
        return;
    }
    let Some(id) = client.id().as_numeric() else {
        return;
    };

    let metrics = Arc::clone(&ctx.metrics);
    client.spawn(async move {
        if let Err(e) = metrics.post_heartbeat(id).await {
            warn!(connection = id, error = %e, "heartbeat failed");
        }
    });
}
