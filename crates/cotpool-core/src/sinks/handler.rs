// ── Sink handler table ──
//
// Maps a sink's backend type to the handler that checks its readiness
// and prepares credentials for it. Built once at startup and immutable
// afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreError;
use crate::model::Sink;

/// Backend-specific preparation for delivery jobs.
#[async_trait]
pub trait SinkHandler: Send + Sync {
    /// Whether the backend behind `sink` can accept data right now. Jobs
    /// are only built for prepared sinks.
    async fn is_prepared(&self, _sink: &Sink) -> Result<bool, CoreError> {
        Ok(true)
    }

    /// Resolve the credential/context payload the delivery worker needs
    /// for `sink` (tokens, signed URLs, ...).
    async fn secrets(&self, sink: &Sink) -> Result<Value, CoreError>;
}

/// Immutable `type -> handler` table.
#[derive(Clone, Default)]
pub struct SinkHandlers {
    handlers: HashMap<String, Arc<dyn SinkHandler>>,
}

impl SinkHandlers {
    pub fn builder() -> SinkHandlersBuilder {
        SinkHandlersBuilder::default()
    }

    pub fn get(&self, sink_type: &str) -> Option<&Arc<dyn SinkHandler>> {
        self.handlers.get(sink_type)
    }

    pub fn contains(&self, sink_type: &str) -> bool {
        self.handlers.contains_key(sink_type)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl fmt::Debug for SinkHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkHandlers")
            .field("types", &self.types())
            .finish()
    }
}

#[derive(Default)]
pub struct SinkHandlersBuilder {
    handlers: HashMap<String, Arc<dyn SinkHandler>>,
}

impl SinkHandlersBuilder {
    /// Register `handler` for `sink_type`. A later registration for the
    /// same type replaces the earlier one.
    pub fn register(mut self, sink_type: impl Into<String>, handler: Arc<dyn SinkHandler>) -> Self {
        self.handlers.insert(sink_type.into(), handler);
        self
    }

    pub fn build(self) -> SinkHandlers {
        SinkHandlers {
            handlers: self.handlers,
        }
    }
}

/// Handler for backends that need no secrets beyond their body config.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSecrets;

#[async_trait]
impl SinkHandler for NoSecrets {
    async fn secrets(&self, _sink: &Sink) -> Result<Value, CoreError> {
        Ok(Value::Object(serde_json::Map::new()))
    }
}
