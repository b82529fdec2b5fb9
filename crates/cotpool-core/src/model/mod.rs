// ── Domain model ──
//
// Connection configuration, CoT messages with their GeoJSON projection,
// and the sink/delivery types routed out of the pool.

pub mod connection;
pub mod connection_id;
pub mod cot;
pub mod sink;

// ── Re-exports ──────────────────────────────────────────────────────

pub use connection::{ConnectionConfig, Credentials};
pub use connection_id::ConnectionId;
pub use cot::{CotEvent, CotMessage, Feature, FeatureKind, Geometry, Point};
pub use sink::{DeliveryJob, DeliveryOptions, Sink};
