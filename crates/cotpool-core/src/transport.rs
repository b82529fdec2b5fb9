// ── Protocol transport surface ──
//
// The wire protocol (TLS handshake, framing, CoT decoding) lives outside
// this crate. A `Connector` opens one `Transport` per connection and hands
// back the receiving half of its event channel; the registry drains that
// channel in a per-connection task.

use std::sync::Arc;

use async_trait::async_trait;
use strum::IntoStaticStr;
use tokio::sync::mpsc;
use url::Url;

use crate::error::CoreError;
use crate::model::{ConnectionId, CotMessage, Credentials};

/// Everything a transport can report about its connection.
#[derive(Debug, Clone, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum TransportEvent {
    /// A CoT message arrived.
    Cot(CotMessage),
    /// The TLS handshake completed (initial connect or reconnect).
    SecureConnect,
    /// The peer closed the stream.
    End,
    /// The socket went idle past the transport's timeout.
    Timeout,
    /// Keepalive tick.
    Ping,
    /// Socket or protocol failure.
    Error(String),
}

impl TransportEvent {
    /// Short event name for log fields.
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// An open connection to a collaboration server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send messages to the server.
    async fn write(&self, messages: &[CotMessage]) -> Result<(), CoreError>;

    /// Tear down the current socket and dial again. Failures may be
    /// returned here or reported later through the event channel.
    async fn reconnect(&self) -> Result<(), CoreError>;

    /// Close the socket and release its resources. Must not block.
    fn destroy(&self);

    fn is_open(&self) -> bool;
}

/// A freshly opened transport plus its event stream.
pub struct TransportSession {
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens transports. Resolves once the initial handshake attempt has
/// finished, whether it succeeded or not; only unusable input (bad URL,
/// unreadable credentials) is returned as an error.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        id: &ConnectionId,
        url: &Url,
        credentials: &Credentials,
    ) -> Result<TransportSession, CoreError>;
}
