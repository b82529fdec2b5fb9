// ── Delivery sinks ──
//
// Cached sink lookup, the backend handler table, and the fanout that
// turns inbound atoms into delivery jobs.

mod cache;
mod fanout;
mod handler;

pub use fanout::{SinkFanout, SinkReport};
pub use handler::{NoSecrets, SinkHandler, SinkHandlers, SinkHandlersBuilder};
