// ── Connection registry ──
//
// Keyed pool of live connection clients. Owns bring-up from the config
// store, per-client event wiring, teardown, and status queries.
//
// Mutating calls (`add`, `delete`, `init`, `refresh`) are not serialized
// against each other; callers that run them concurrently must serialize
// them. `add` still never leaves two live clients under one id.

mod client;
mod events;
mod retry;

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::StreamExt;
use serde::Serialize;
use strum::Display;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub use self::client::ConnectionClient;
use self::events::EventContext;
use crate::config::PoolSettings;
use crate::error::CoreError;
use crate::fanout::InboundFanout;
use crate::metrics::MetricsSink;
use crate::mission::{MissionApi, MissionResubscriber};
use crate::model::{ConnectionConfig, ConnectionId, CotMessage};
use crate::store::ConfigStore;
use crate::transport::Connector;

// ── Status ───────────────────────────────────────────────────────

/// Externally visible state of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    /// No client is registered under the id.
    Unknown,
    /// The transport reports an open socket.
    Live,
    /// Registered, but the socket is closed or still retrying.
    Dead,
}

/// Outcome of one `init()` pass.
#[derive(Debug, Default)]
pub struct InitReport {
    /// Connections registered during the pass, sorted.
    pub started: Vec<ConnectionId>,
    /// Rows that could not be registered.
    pub failed: Vec<(ConnectionId, CoreError)>,
}

/// Collaborators the registry is wired to.
pub struct PoolServices {
    pub connector: Arc<dyn Connector>,
    pub config_store: Arc<dyn ConfigStore>,
    pub missions: Arc<dyn MissionApi>,
    pub metrics: Arc<dyn MetricsSink>,
    pub fanout: Arc<InboundFanout>,
}

// ── ConnectionRegistry ───────────────────────────────────────────

/// Cheaply cloneable handle to the connection pool.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    connector: Arc<dyn Connector>,
    config_store: Arc<dyn ConfigStore>,
    events: EventContext,
    clients: DashMap<ConnectionId, Arc<ConnectionClient>>,
}

impl ConnectionRegistry {
    pub fn new(settings: PoolSettings, services: PoolServices) -> Self {
        let events = EventContext {
            fanout: services.fanout,
            resubscriber: MissionResubscriber::new(services.missions),
            metrics: services.metrics,
            settings: Arc::new(settings),
        };
        Self {
            inner: Arc::new(RegistryInner {
                connector: services.connector,
                config_store: services.config_store,
                events,
                clients: DashMap::new(),
            }),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.inner.events.settings
    }

    pub fn fanout(&self) -> &Arc<InboundFanout> {
        &self.inner.events.fanout
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Register every enabled connection from the config store, opening
    /// their transports concurrently.
    ///
    /// A row that fails validation or registration is logged and recorded
    /// in the report. A stream read error aborts the pass: in-flight opens are cancelled,
    /// connections registered by this pass are torn down, and the error is
    /// returned. A row that reuses the id of a client registered before
    /// the pass replaces that client, and an aborted pass does not bring
    /// it back; `refresh` clears the registry first, so it never hits this.
    pub async fn init(&self) -> Result<InitReport, CoreError> {
        if self.settings().local {
            info!("local mode, skipping connection bring-up");
            return Ok(InitReport::default());
        }

        let mut tasks = JoinSet::new();
        let mut prior: HashMap<ConnectionId, Option<Arc<ConnectionClient>>> = HashMap::new();
        let mut report = InitReport::default();
        let mut rows = self.inner.config_store.connections();

        while let Some(row) = rows.next().await {
            let config = match row {
                Ok(config) => config,
                Err(CoreError::InvalidConnection {
                    connection,
                    message,
                }) => {
                    warn!(connection = %connection, reason = %message, "connection row rejected");
                    let id = connection.clone();
                    report
                        .failed
                        .push((id, CoreError::InvalidConnection { connection, message }));
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "config stream failed, aborting bring-up");
                    drop(rows);
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    self.roll_back(prior).await;
                    return Err(e);
                }
            };
            if !config.enabled {
                debug!(connection = %config.id, "skipping disabled connection");
                continue;
            }

            prior
                .entry(config.id.clone())
                .or_insert_with(|| self.get(&config.id));
            let registry = self.clone();
            tasks.spawn(async move {
                let id = config.id.clone();
                (id, registry.add(config, false).await)
            });
        }
        drop(rows);

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(_))) => report.started.push(id),
                Ok((id, Err(e))) => {
                    warn!(connection = %id, error = %e, "connection not started");
                    report.failed.push((id, e));
                }
                Err(e) => error!(error = %e, "connection bring-up task panicked"),
            }
        }
        report.started.sort();

        info!(
            started = report.started.len(),
            failed = report.failed.len(),
            "connection bring-up complete"
        );
        Ok(report)
    }

    /// Tear down every registered client, then run a fresh `init()`.
    pub async fn refresh(&self) -> Result<InitReport, CoreError> {
        let removed = self.delete_all().await;
        debug!(removed, "registry cleared for refresh");
        self.init().await
    }

    /// Open a transport for `config` and register its client.
    ///
    /// Resolves once the transport's initial handshake attempt has
    /// finished. The client is in the registry before any of its events
    /// are processed. A client already registered under the same id is
    /// shut down and replaced.
    pub async fn add(
        &self,
        config: ConnectionConfig,
        ephemeral: bool,
    ) -> Result<Arc<ConnectionClient>, CoreError> {
        let credentials = config.credentials()?;
        let session = self
            .inner
            .connector
            .connect(&config.id, &config.url, credentials)
            .await?;

        let id = config.id.clone();
        let name = config.name.clone();
        let client = Arc::new(ConnectionClient::new(config, session.transport, ephemeral));

        if let Some(displaced) = self.inner.clients.insert(id.clone(), Arc::clone(&client)) {
            warn!(connection = %id, "replacing already registered client");
            // Detached: the old client is fully shut down even if this
            // call is cancelled while waiting.
            let _ = tokio::spawn(async move { displaced.shutdown().await }).await;
        }

        let pump = tokio::spawn(events::run(
            self.inner.events.clone(),
            Arc::clone(&client),
            session.events,
        ));
        client.set_pump(pump);

        info!(connection = %id, name = %name, ephemeral, "connection registered");
        Ok(client)
    }

    /// Remove and shut down the client for `id`. When this returns the
    /// socket is closed and no retry for the client can fire. Returns
    /// `false` if nothing was registered.
    pub async fn delete(&self, id: &ConnectionId) -> bool {
        let Some((_, client)) = self.inner.clients.remove(id) else {
            return false;
        };
        client.shutdown().await;
        info!(connection = %id, "connection deleted");
        true
    }

    /// Delete every client. Returns how many were removed.
    pub async fn delete_all(&self) -> usize {
        let ids = self.keys();
        let mut removed = 0;
        for id in &ids {
            if self.delete(id).await {
                removed += 1;
            }
        }
        removed
    }

    async fn roll_back(&self, prior: HashMap<ConnectionId, Option<Arc<ConnectionClient>>>) {
        for (id, before) in prior {
            let Some(current) = self.get(&id) else {
                continue;
            };
            let unchanged = before.is_some_and(|b| Arc::ptr_eq(&b, &current));
            if !unchanged {
                self.delete(&id).await;
            }
        }
    }

    // ── Queries ──────────────────────────────────────────────────

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ConnectionClient>> {
        self.inner.clients.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn status(&self, id: &ConnectionId) -> ConnectionStatus {
        match self.get(id) {
            None => ConnectionStatus::Unknown,
            Some(client) if client.is_open() => ConnectionStatus::Live,
            Some(_) => ConnectionStatus::Dead,
        }
    }

    /// Registered ids, sorted.
    pub fn keys(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.inner.clients.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.clients.is_empty()
    }

    // ── Outbound ─────────────────────────────────────────────────

    /// Send `messages` through the connection, then run them through
    /// inbound fanout since the server does not echo them back.
    pub async fn publish(&self, id: &ConnectionId, messages: Vec<CotMessage>) -> Result<(), CoreError> {
        let client = self.get(id).ok_or_else(|| CoreError::ConnectionNotFound {
            connection: id.clone(),
        })?;
        if !client.config().enabled {
            return Err(CoreError::ConnectionDisabled {
                connection: id.clone(),
            });
        }

        client.transport().write(&messages).await?;
        debug!(connection = %id, count = messages.len(), "published messages");

        let fanout = self.fanout();
        for message in messages {
            let _ = fanout.deliver(id, Arc::new(message), client.is_ephemeral());
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.keys())
            .finish_non_exhaustive()
    }
}
