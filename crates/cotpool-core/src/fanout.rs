// ── Inbound message fanout ──
//
// Runs on the connection's event task for every received message, so it
// must never wait: UI sessions only enqueue, and sink delivery is spawned
// behind its own error boundary.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{ConnectionId, CotMessage};
use crate::session::{Envelope, SessionRegistry};
use crate::sinks::SinkFanout;

/// What happened to one inbound message.
#[derive(Debug, Default)]
pub struct FanoutOutcome {
    pub sessions_reached: usize,
    pub sessions_failed: usize,
    /// Present when the message was handed to sink fanout.
    pub sink_dispatch: Option<JoinHandle<()>>,
}

pub struct InboundFanout {
    sessions: Arc<dyn SessionRegistry>,
    sinks: Arc<SinkFanout>,
    sinks_enabled: bool,
}

impl InboundFanout {
    pub fn new(sessions: Arc<dyn SessionRegistry>, sinks: Arc<SinkFanout>, sinks_enabled: bool) -> Self {
        Self {
            sessions,
            sinks,
            sinks_enabled,
        }
    }

    pub fn sinks(&self) -> &Arc<SinkFanout> {
        &self.sinks
    }

    /// Push `message` to every session watching `connection`, then hand
    /// atoms from non-ephemeral connections to sink fanout.
    pub fn deliver(
        &self,
        connection: &ConnectionId,
        message: Arc<CotMessage>,
        ephemeral: bool,
    ) -> FanoutOutcome {
        let mut outcome = FanoutOutcome::default();

        let sessions = self.sessions.sessions_for(connection);
        if !sessions.is_empty() {
            let mut frames = Frames::new(connection, &message);
            for session in sessions {
                let sent = frames
                    .for_session(session.wants_structured())
                    .and_then(|frame| session.send(frame));
                match sent {
                    Ok(()) => outcome.sessions_reached += 1,
                    Err(e) => {
                        outcome.sessions_failed += 1;
                        debug!(connection = %connection, error = %e, "session send failed");
                    }
                }
            }
        }

        if !ephemeral && self.sinks_enabled && message.is_atom() {
            let sinks = Arc::clone(&self.sinks);
            let connection = connection.clone();
            outcome.sink_dispatch = Some(tokio::spawn(async move {
                if let Err(e) = sinks.deliver(&connection, &message).await {
                    warn!(connection = %connection, error = %e, "sink fanout failed");
                }
            }));
        }

        outcome
    }
}

/// Lazily serialized frames, at most one per output format per message.
struct Frames<'a> {
    connection: &'a ConnectionId,
    message: &'a CotMessage,
    structured: Option<Arc<str>>,
    raw: Option<Arc<str>>,
}

impl<'a> Frames<'a> {
    fn new(connection: &'a ConnectionId, message: &'a CotMessage) -> Self {
        Self {
            connection,
            message,
            structured: None,
            raw: None,
        }
    }

    fn for_session(&mut self, structured: bool) -> Result<Arc<str>, CoreError> {
        let slot = if structured {
            &mut self.structured
        } else {
            &mut self.raw
        };
        if let Some(frame) = slot.as_ref() {
            return Ok(Arc::clone(frame));
        }

        let frame = if structured {
            let feature = self.message.to_geojson();
            Envelope::structured(self.connection, &feature).to_frame()?
        } else {
            Envelope::raw(self.connection, &self.message.raw_text()).to_frame()?
        };
        *slot = Some(Arc::clone(&frame));
        Ok(frame)
    }
}
