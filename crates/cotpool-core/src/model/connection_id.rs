// ── Connection identity ──
//
// Connections are keyed either by a database row id (numeric) or by a
// caller-chosen name (ephemeral and externally managed connections).

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a single server connection.
///
/// Numeric ids come from the connection table and are the only ones that
/// report heartbeats. Named ids are used for transient connections.
///
/// Deserializes from a number or a string; strings that parse as an
/// integer become `Numeric`, the same as `From<&str>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum ConnectionId {
    Numeric(i64),
    Named(String),
}

impl ConnectionId {
    pub fn as_numeric(&self) -> Option<i64> {
        match self {
            Self::Numeric(n) => Some(*n),
            Self::Named(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric(_))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Named(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for ConnectionId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<i64> for ConnectionId {
    fn from(n: i64) -> Self {
        Self::Numeric(n)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        match s.parse::<i64>() {
            Ok(n) => Self::Numeric(n),
            Err(_) => Self::Named(s),
        }
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ConnectionIdVisitor)
    }
}

struct ConnectionIdVisitor;

impl Visitor<'_> for ConnectionIdVisitor {
    type Value = ConnectionId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer or string connection id")
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<ConnectionId, E> {
        Ok(ConnectionId::Numeric(n))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<ConnectionId, E> {
        i64::try_from(n)
            .map(ConnectionId::Numeric)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(n), &self))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<ConnectionId, E> {
        Ok(ConnectionId::from(s))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<ConnectionId, E> {
        Ok(ConnectionId::from(s))
    }
}
