// ── Core error types ──
//
// Every failure the pool can observe. Transport failures never surface
// through here on the event path -- they drive the retry controller.
// Sink, session, and mission failures are logged at their isolation
// boundary and only reach callers through direct API calls.

use thiserror::Error;

use crate::model::ConnectionId;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Connection {connection} must have both a certificate and a key")]
    MissingCredentials { connection: ConnectionId },

    #[error("Unknown sink type '{sink_type}' on sink {sink}")]
    UnknownSinkType { sink: i64, sink_type: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Connection {connection} is misconfigured: {message}")]
    InvalidConnection {
        connection: ConnectionId,
        message: String,
    },

    #[error("Sink {sink} is not ready to accept data")]
    SinkNotReady { sink: i64 },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect {connection} to {url}: {reason}")]
    ConnectionFailed {
        connection: ConnectionId,
        url: String,
        reason: String,
    },

    #[error("Connection not found: {connection}")]
    ConnectionNotFound { connection: ConnectionId },

    #[error("Connection {connection} is disabled")]
    ConnectionDisabled { connection: ConnectionId },

    #[error("Transport error: {0}")]
    Transport(String),

    // ── Collaborator errors ──────────────────────────────────────────
    #[error("Config store read failed: {message}")]
    ConfigStream { message: String },

    #[error("Sink store query failed for {connection}: {message}")]
    SinkStore {
        connection: ConnectionId,
        message: String,
    },

    #[error("Secret resolution failed for sink {sink}: {message}")]
    SinkSecrets { sink: i64, message: String },

    #[error("Mission subscription to '{mission}' failed: {message}")]
    Mission { mission: String, message: String },

    #[error("Heartbeat failed for {connection}: {message}")]
    Metrics {
        connection: ConnectionId,
        message: String,
    },

    #[error("Delivery queue rejected job: {message}")]
    Queue { message: String },

    #[error("Session send failed: {message}")]
    Session { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether this error stems from invalid configuration rather than a
    /// runtime failure. Configuration errors are not worth retrying.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials { .. }
                | Self::InvalidConnection { .. }
                | Self::UnknownSinkType { .. }
                | Self::Config { .. }
        )
    }
}
