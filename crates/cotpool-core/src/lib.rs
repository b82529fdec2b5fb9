// cotpool-core: Connection pool, retry control, and message fanout for CoT servers.

pub mod config;
pub mod error;
pub mod fanout;
pub mod metrics;
pub mod mission;
pub mod model;
pub mod queue;
pub mod registry;
pub mod session;
pub mod sinks;
pub mod store;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{PoolSettings, RetryPolicy, TEST_STACK};
pub use error::CoreError;
pub use fanout::{FanoutOutcome, InboundFanout};
pub use metrics::MetricsSink;
pub use mission::{MissionApi, MissionResubscriber, ResubscribeReport};
pub use queue::{ChannelDeliveryQueue, DeliveryQueue, QueuedJob};
pub use registry::{ConnectionClient, ConnectionRegistry, ConnectionStatus, InitReport, PoolServices};
pub use session::{
    ChannelSession, Envelope, EnvelopeKind, SessionFormat, SessionHub, SessionId, SessionRegistry,
    UiSession,
};
pub use sinks::{NoSecrets, SinkFanout, SinkHandler, SinkHandlers, SinkHandlersBuilder, SinkReport};
pub use store::{ConfigStore, SinkStore, StaticSinkStore};
pub use transport::{Connector, Transport, TransportEvent, TransportSession};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ConnectionConfig, ConnectionId, CotEvent, CotMessage, Credentials, DeliveryJob,
    DeliveryOptions, Feature, FeatureKind, Geometry, Point, Sink,
};
