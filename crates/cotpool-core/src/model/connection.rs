// ── Connection configuration ──
//
// An immutable snapshot of one connection row. The registry never patches
// a config in place: a refresh tears the client down and builds a new one
// from the fresh snapshot.

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::ConnectionId;
use crate::error::CoreError;

/// Client certificate material used for the mutual-TLS handshake and for
/// authenticating mission API calls.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// PEM-encoded client certificate.
    pub cert: String,
    /// PEM-encoded private key.
    pub key: SecretString,
}

impl Credentials {
    pub fn new(cert: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            cert: cert.into(),
            key: SecretString::from(key.into()),
        }
    }

    fn is_complete(&self) -> bool {
        !self.cert.trim().is_empty() && !self.key.expose_secret().trim().is_empty()
    }
}

/// Configuration for a single server connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub id: ConnectionId,
    /// Display name, used in log lines.
    pub name: String,
    pub enabled: bool,
    /// Streaming endpoint of the collaboration server.
    pub url: Url,
    pub auth: Option<Credentials>,
    /// Missions to (re)subscribe to on every secure connect.
    pub subscriptions: Vec<String>,
}

impl ConnectionConfig {
    /// Returns the credentials when both certificate and key are present.
    pub fn credentials(&self) -> Result<&Credentials, CoreError> {
        match &self.auth {
            Some(creds) if creds.is_complete() => Ok(creds),
            _ => Err(CoreError::MissingCredentials {
                connection: self.id.clone(),
            }),
        }
    }
}
