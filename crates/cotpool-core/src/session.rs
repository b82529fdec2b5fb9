// ── Live UI subscribers ──
//
// Browser sessions watch one connection each and receive every inbound
// message as a JSON text frame. A session's `send` only enqueues: the
// socket writer drains its own queue, so a stalled browser can fill its
// queue and lose frames but can never hold up the connection that feeds
// it.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use strum::Display;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{ConnectionId, Feature};

// ── Envelopes ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EnvelopeKind {
    Cot,
    Chat,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EnvelopeData<'a> {
    Feature(&'a Feature),
    Raw(&'a str),
}

/// Frame pushed to UI sessions: `{"type", "connection", "data"}`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<'a> {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub connection: &'a ConnectionId,
    pub data: EnvelopeData<'a>,
}

impl<'a> Envelope<'a> {
    /// Structured envelope; chat messages get their own envelope type.
    pub fn structured(connection: &'a ConnectionId, feature: &'a Feature) -> Self {
        let kind = if feature.chat().is_some() {
            EnvelopeKind::Chat
        } else {
            EnvelopeKind::Cot
        };
        Self {
            kind,
            connection,
            data: EnvelopeData::Feature(feature),
        }
    }

    pub fn raw(connection: &'a ConnectionId, raw: &'a str) -> Self {
        Self {
            kind: EnvelopeKind::Cot,
            connection,
            data: EnvelopeData::Raw(raw),
        }
    }

    pub fn to_frame(&self) -> Result<Arc<str>, CoreError> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }
}

// ── Sessions ────────────────────────────────────────────────────────

/// Output format a session asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionFormat {
    /// GeoJSON features.
    Geojson,
    /// Unmodified protocol frames.
    Raw,
}

/// One connected UI client.
pub trait UiSession: Send + Sync {
    fn format(&self) -> SessionFormat;

    fn wants_structured(&self) -> bool {
        self.format() == SessionFormat::Geojson
    }

    /// Enqueue a frame. Must return without waiting on the client.
    fn send(&self, frame: Arc<str>) -> Result<(), CoreError>;
}

/// Lookup of the sessions watching a connection.
pub trait SessionRegistry: Send + Sync {
    fn sessions_for(&self, connection: &ConnectionId) -> Vec<Arc<dyn UiSession>>;
}

/// Session backed by a bounded channel; the receiver belongs to whatever
/// task writes to the client socket.
pub struct ChannelSession {
    format: SessionFormat,
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelSession {
    pub fn new(format: SessionFormat, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self { format, tx }), rx)
    }
}

impl UiSession for ChannelSession {
    fn format(&self) -> SessionFormat {
        self.format
    }

    fn send(&self, frame: Arc<str>) -> Result<(), CoreError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => CoreError::Session {
                message: "outbound queue full".into(),
            },
            TrySendError::Closed(_) => CoreError::Session {
                message: "session closed".into(),
            },
        })
    }
}

/// Handle returned by [`SessionHub::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

/// In-process session registry keyed by connection.
#[derive(Default)]
pub struct SessionHub {
    sessions: DashMap<ConnectionId, Vec<(SessionId, Arc<dyn UiSession>)>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: ConnectionId, session: Arc<dyn UiSession>) -> SessionId {
        let id = SessionId(Uuid::new_v4());
        debug!(connection = %connection, format = %session.format(), "session registered");
        self.sessions.entry(connection).or_default().push((id, session));
        id
    }

    /// Returns `true` if the session was registered.
    pub fn unregister(&self, connection: &ConnectionId, id: SessionId) -> bool {
        let Some(mut entry) = self.sessions.get_mut(connection) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|(sid, _)| *sid != id);
        let removed = entry.len() != before;
        let empty = entry.is_empty();
        drop(entry);

        if empty {
            self.sessions.remove_if(connection, |_, v| v.is_empty());
        }
        removed
    }

    pub fn session_count(&self, connection: &ConnectionId) -> usize {
        self.sessions.get(connection).map_or(0, |v| v.len())
    }
}

impl SessionRegistry for SessionHub {
    fn sessions_for(&self, connection: &ConnectionId) -> Vec<Arc<dyn UiSession>> {
        self.sessions
            .get(connection)
            .map(|v| v.iter().map(|(_, s)| Arc::clone(s)).collect())
            .unwrap_or_default()
    }
}
