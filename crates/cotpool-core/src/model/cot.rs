// ── CoT messages and their GeoJSON projection ──
//
// The transport decodes each frame into a `CotEvent` header and keeps the
// original bytes alongside it. Projection to GeoJSON is a pure, cheap
// function of the header so it can run on the event path.

use std::borrow::Cow;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type prefix shared by every trackable entity report.
const ATOM_PREFIX: &str = "a-";

/// Detail element carrying chat metadata.
const CHAT_DETAIL: &str = "__chat";

/// WGS84 position of a CoT event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
    /// Height above ellipsoid, metres.
    #[serde(default)]
    pub hae: f64,
    /// Circular error, metres.
    #[serde(default)]
    pub ce: f64,
    /// Linear error, metres.
    #[serde(default)]
    pub le: f64,
}

/// Decoded header of a CoT event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CotEvent {
    pub uid: String,
    /// Hierarchical CoT type, e.g. `a-f-G-U-C` or `b-t-f`.
    #[serde(rename = "type")]
    pub cot_type: String,
    #[serde(default)]
    pub how: Option<String>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stale: Option<DateTime<Utc>>,
    #[serde(default)]
    pub point: Option<Point>,
    /// Detail elements keyed by element name.
    #[serde(default)]
    pub detail: Map<String, Value>,
}

/// A received (or locally published) CoT message.
#[derive(Debug, Clone, PartialEq)]
pub struct CotMessage {
    raw: Bytes,
    event: CotEvent,
}

impl CotMessage {
    pub fn new(raw: impl Into<Bytes>, event: CotEvent) -> Self {
        Self {
            raw: raw.into(),
            event,
        }
    }

    /// The unmodified protocol frame.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The frame as text, for consumers that asked for raw output.
    pub fn raw_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }

    pub fn event(&self) -> &CotEvent {
        &self.event
    }

    /// Trackable entity update (as opposed to an administrative/control message).
    pub fn is_atom(&self) -> bool {
        self.event.cot_type.starts_with(ATOM_PREFIX)
    }

    /// Project the message to a GeoJSON feature.
    pub fn to_geojson(&self) -> Feature {
        let ev = &self.event;
        let mut properties = Map::new();

        properties.insert("type".into(), Value::String(ev.cot_type.clone()));
        if let Some(how) = &ev.how {
            properties.insert("how".into(), Value::String(how.clone()));
        }
        for (key, ts) in [("time", ev.time), ("start", ev.start), ("stale", ev.stale)] {
            if let Some(ts) = ts {
                properties.insert(
                    key.into(),
                    Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
                );
            }
        }

        if let Some(callsign) = ev
            .detail
            .get("contact")
            .and_then(|c| c.get("callsign"))
            .and_then(Value::as_str)
        {
            properties.insert("callsign".into(), Value::String(callsign.to_owned()));
        }
        if let Some(remarks) = ev.detail.get("remarks") {
            properties.insert("remarks".into(), remarks.clone());
        }
        if let Some(chat) = ev.detail.get(CHAT_DETAIL) {
            properties.insert("chat".into(), chat.clone());
        }

        let geometry = ev.point.map(|p| Geometry::Point {
            coordinates: [p.lon, p.lat, p.hae],
        });
        if let Some(p) = ev.point {
            properties.insert("center".into(), serde_json::json!([p.lon, p.lat, p.hae]));
        }

        Feature {
            kind: FeatureKind::Feature,
            id: ev.uid.clone(),
            geometry,
            properties,
        }
    }
}

// ── GeoJSON ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    Feature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 3] },
}

/// A GeoJSON feature projected from a CoT event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: FeatureKind,
    pub id: String,
    pub geometry: Option<Geometry>,
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Chat metadata, present only on chat messages.
    pub fn chat(&self) -> Option<&Value> {
        self.properties.get("chat")
    }
}
