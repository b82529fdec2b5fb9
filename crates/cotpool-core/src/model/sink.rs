// ── Delivery sinks and jobs ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ConnectionId, Feature};

/// A pluggable external delivery backend attached to one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sink {
    pub id: i64,
    pub connection: ConnectionId,
    /// Backend type, resolved against the registered handler table.
    #[serde(rename = "type")]
    pub sink_type: String,
    #[serde(default)]
    pub name: String,
    pub enabled: bool,
    /// Opaque backend configuration, passed through to the delivery job.
    /// Defaults to an empty object; a null body is never written out.
    #[serde(default = "empty_body", skip_serializing_if = "Value::is_null")]
    pub body: Value,
    /// Whether the delivery worker should log each delivery for this sink.
    #[serde(default)]
    pub logging: bool,
}

fn empty_body() -> Value {
    Value::Object(Map::new())
}

/// Per-job options forwarded to the delivery worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOptions {
    pub logging: bool,
}

/// One message bound for one sink. Built per message per sink and handed
/// to the delivery queue; never retained by the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub connection: ConnectionId,
    #[serde(rename = "id")]
    pub sink_id: i64,
    #[serde(rename = "type")]
    pub sink_type: String,
    pub body: Value,
    #[serde(rename = "feat")]
    pub feature: Feature,
    pub secrets: Value,
    pub options: DeliveryOptions,
}

impl DeliveryJob {
    pub fn new(sink: &Sink, feature: Feature, secrets: Value) -> Self {
        Self {
            connection: sink.connection.clone(),
            sink_id: sink.id,
            sink_type: sink.sink_type.clone(),
            body: sink.body.clone(),
            feature,
            secrets,
            options: DeliveryOptions {
                logging: sink.logging,
            },
        }
    }
}
