#![allow(clippy::unwrap_used, dead_code)]
// Hand-written collaborators shared by the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use url::Url;

use cotpool_core::{
    ConfigStore, ConnectionConfig, ConnectionId, ConnectionRegistry, Connector, CoreError,
    CotEvent, CotMessage, Credentials, DeliveryJob, DeliveryQueue, InboundFanout, MetricsSink,
    MissionApi, NoSecrets, PoolServices, PoolSettings, SessionHub, Sink, SinkFanout, SinkHandler,
    SinkHandlers, SinkStore, StaticSinkStore, Transport, TransportEvent, TransportSession,
};

// ── Transport ───────────────────────────────────────────────────────

pub struct FakeTransport {
    open: AtomicBool,
    destroyed: AtomicBool,
    /// Emit an `error` event from every reconnect, like a refused dial.
    refuse: AtomicBool,
    /// Return an error from `reconnect()` itself.
    reconnect_fails: AtomicBool,
    reconnects: Mutex<Vec<Instant>>,
    written: Mutex<Vec<CotMessage>>,
    events: mpsc::Sender<TransportEvent>,
}

impl FakeTransport {
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn refuse_reconnects(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn fail_reconnects(&self) {
        self.reconnect_fails.store(true, Ordering::SeqCst);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn reconnect_times(&self) -> Vec<Instant> {
        self.reconnects.lock().unwrap().clone()
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnects.lock().unwrap().len()
    }

    pub fn written(&self) -> Vec<CotMessage> {
        self.written.lock().unwrap().clone()
    }

    pub async fn emit(&self, event: TransportEvent) {
        self.events.send(event).await.unwrap();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn write(&self, messages: &[CotMessage]) -> Result<(), CoreError> {
        self.written.lock().unwrap().extend_from_slice(messages);
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), CoreError> {
        self.reconnects.lock().unwrap().push(Instant::now());
        if self.reconnect_fails.load(Ordering::SeqCst) {
            return Err(CoreError::Transport("connection refused".into()));
        }
        if self.refuse.load(Ordering::SeqCst) {
            let _ = self
                .events
                .try_send(TransportEvent::Error("connection refused".into()));
        }
        Ok(())
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeConnector {
    transports: Mutex<HashMap<ConnectionId, Vec<Arc<FakeTransport>>>>,
    connects: AtomicUsize,
    /// Connects for these ids wait on the gate before opening a transport.
    gates: Mutex<HashMap<ConnectionId, Arc<Notify>>>,
}

impl FakeConnector {
    /// Block every connect for numeric `id` until the returned gate is
    /// notified.
    pub fn hold(&self, id: i64) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(ConnectionId::Numeric(id), Arc::clone(&gate));
        gate
    }

    /// Most recent transport opened for numeric connection `id`.
    pub fn transport(&self, id: i64) -> Arc<FakeTransport> {
        self.transport_of(&ConnectionId::Numeric(id))
    }

    pub fn transport_of(&self, id: &ConnectionId) -> Arc<FakeTransport> {
        Arc::clone(self.transports.lock().unwrap()[id].last().unwrap())
    }

    pub fn transports(&self, id: i64) -> Vec<Arc<FakeTransport>> {
        self.transports
            .lock()
            .unwrap()
            .get(&ConnectionId::Numeric(id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        id: &ConnectionId,
        _url: &Url,
        _credentials: &Credentials,
    ) -> Result<TransportSession, CoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().get(id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(FakeTransport {
            open: AtomicBool::new(true),
            destroyed: AtomicBool::new(false),
            refuse: AtomicBool::new(false),
            reconnect_fails: AtomicBool::new(false),
            reconnects: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
            events: tx,
        });
        self.transports
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_default()
            .push(Arc::clone(&transport));
        Ok(TransportSession {
            transport,
            events: rx,
        })
    }
}

// ── Stores ──────────────────────────────────────────────────────────

pub enum Row {
    Config(ConnectionConfig),
    /// A row the store could not turn into a config.
    Invalid(i64, &'static str),
    /// Stream-level read failure.
    Broken(&'static str),
    /// Stall the stream so already spawned bring-up tasks get to run.
    Pause(Duration),
}

#[derive(Default)]
pub struct FakeConfigStore {
    rows: Mutex<Vec<Row>>,
}

impl FakeConfigStore {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub fn set_rows(&self, rows: Vec<Row>) {
        *self.rows.lock().unwrap() = rows;
    }
}

impl ConfigStore for FakeConfigStore {
    fn connections(&self) -> BoxStream<'_, Result<ConnectionConfig, CoreError>> {
        let steps: Vec<Result<Result<ConnectionConfig, CoreError>, Duration>> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|row| match row {
                Row::Config(config) => Ok(Ok(config.clone())),
                Row::Invalid(id, message) => Ok(Err(CoreError::InvalidConnection {
                    connection: ConnectionId::Numeric(*id),
                    message: (*message).to_owned(),
                })),
                Row::Broken(message) => Ok(Err(CoreError::ConfigStream {
                    message: (*message).to_owned(),
                })),
                Row::Pause(wait) => Err(*wait),
            })
            .collect();
        stream::iter(steps)
            .filter_map(|step| async move {
                match step {
                    Ok(item) => Some(item),
                    Err(wait) => {
                        tokio::time::sleep(wait).await;
                        None
                    }
                }
            })
            .boxed()
    }
}

/// Sink store that counts backing queries and answers slowly enough for
/// concurrent misses to overlap.
pub struct CountingSinkStore {
    inner: StaticSinkStore,
    pub queries: AtomicUsize,
}

impl CountingSinkStore {
    pub fn new(sinks: Vec<Sink>) -> Self {
        Self {
            inner: StaticSinkStore::new(sinks),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SinkStore for CountingSinkStore {
    async fn list_enabled_sinks(&self, connection: &ConnectionId) -> Result<Vec<Sink>, CoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.inner.list_enabled_sinks(connection).await
    }
}

// ── Collaborators ───────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeMissions {
    pub calls: Mutex<Vec<(String, String)>>,
    pub failing: Mutex<Vec<String>>,
}

impl FakeMissions {
    pub fn failing(missions: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(missions.iter().map(|m| (*m).to_owned()).collect()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MissionApi for FakeMissions {
    async fn subscribe(
        &self,
        _config: &ConnectionConfig,
        mission: &str,
        uid: &str,
    ) -> Result<(), CoreError> {
        self.calls
            .lock()
            .unwrap()
            .push((mission.to_owned(), uid.to_owned()));
        if self.failing.lock().unwrap().iter().any(|m| m == mission) {
            return Err(CoreError::Mission {
                mission: mission.to_owned(),
                message: "404 Not Found".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMetrics {
    pub heartbeats: Mutex<Vec<i64>>,
}

impl FakeMetrics {
    pub fn heartbeats(&self) -> Vec<i64> {
        self.heartbeats.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsSink for FakeMetrics {
    async fn post_heartbeat(&self, connection: i64) -> Result<(), CoreError> {
        self.heartbeats.lock().unwrap().push(connection);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    pub jobs: Mutex<Vec<(ConnectionId, DeliveryJob)>>,
}

impl RecordingQueue {
    pub fn sink_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.jobs.lock().unwrap().iter().map(|(_, j)| j.sink_id).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl DeliveryQueue for RecordingQueue {
    async fn submit(&self, partition: &ConnectionId, job: DeliveryJob) -> Result<(), CoreError> {
        self.jobs.lock().unwrap().push((partition.clone(), job));
        Ok(())
    }
}

/// Handler whose secret lookup always fails.
pub struct BrokenSecrets;

#[async_trait]
impl SinkHandler for BrokenSecrets {
    async fn secrets(&self, sink: &Sink) -> Result<Value, CoreError> {
        Err(CoreError::SinkSecrets {
            sink: sink.id,
            message: "token endpoint returned 500".into(),
        })
    }
}

/// Backend that is never ready; its `secrets` must not be reached.
pub struct Unprepared {
    pub secrets_calls: AtomicUsize,
}

#[async_trait]
impl SinkHandler for Unprepared {
    async fn is_prepared(&self, _sink: &Sink) -> Result<bool, CoreError> {
        Ok(false)
    }

    async fn secrets(&self, _sink: &Sink) -> Result<Value, CoreError> {
        self.secrets_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({}))
    }
}

pub fn handlers() -> SinkHandlers {
    SinkHandlers::builder()
        .register("ArcGIS", Arc::new(NoSecrets))
        .register("Broken", Arc::new(BrokenSecrets))
        .register(
            "Offline",
            Arc::new(Unprepared {
                secrets_calls: AtomicUsize::new(0),
            }),
        )
        .build()
}

// ── Fixtures ────────────────────────────────────────────────────────

pub fn config(id: i64) -> ConnectionConfig {
    ConnectionConfig {
        id: ConnectionId::Numeric(id),
        name: format!("server-{id}"),
        enabled: true,
        url: Url::parse(&format!("ssl://tak{id}.example.com:8089")).unwrap(),
        auth: Some(Credentials::new("CERT", "KEY")),
        subscriptions: Vec::new(),
    }
}

pub fn sink(id: i64, connection: i64, sink_type: &str) -> Sink {
    Sink {
        id,
        connection: ConnectionId::Numeric(connection),
        sink_type: sink_type.to_owned(),
        name: format!("sink-{id}"),
        enabled: true,
        body: json!({ "url": format!("https://sink{id}.example.com") }),
        logging: false,
    }
}

pub fn atom(uid: &str) -> CotMessage {
    message(uid, "a-f-G-U-C")
}

pub fn message(uid: &str, cot_type: &str) -> CotMessage {
    let event = CotEvent {
        uid: uid.to_owned(),
        cot_type: cot_type.to_owned(),
        ..CotEvent::default()
    };
    CotMessage::new(format!("<event uid=\"{uid}\" type=\"{cot_type}\"/>"), event)
}

/// Poll `cond` until it holds, failing the test after ~2s of (virtual or
/// real) time.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

// ── Pool harness ────────────────────────────────────────────────────

pub struct Pool {
    pub registry: ConnectionRegistry,
    pub connector: Arc<FakeConnector>,
    pub store: Arc<FakeConfigStore>,
    pub missions: Arc<FakeMissions>,
    pub metrics: Arc<FakeMetrics>,
    pub sessions: Arc<SessionHub>,
    pub sink_store: Arc<CountingSinkStore>,
    pub queue: Arc<RecordingQueue>,
}

#[derive(Default)]
pub struct PoolBuilder {
    settings: PoolSettings,
    rows: Vec<Row>,
    sinks: Vec<Sink>,
    missions: FakeMissions,
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(mut self, f: impl FnOnce(&mut PoolSettings)) -> Self {
        f(&mut self.settings);
        self
    }

    pub fn rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn sinks(mut self, sinks: Vec<Sink>) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn missions(mut self, missions: FakeMissions) -> Self {
        self.missions = missions;
        self
    }

    pub fn build(self) -> Pool {
        let connector = Arc::new(FakeConnector::default());
        let store = Arc::new(FakeConfigStore::new(self.rows));
        let missions = Arc::new(self.missions);
        let metrics = Arc::new(FakeMetrics::default());
        let sessions = Arc::new(SessionHub::new());
        let sink_store = Arc::new(CountingSinkStore::new(self.sinks));
        let queue = Arc::new(RecordingQueue::default());

        let sinks = Arc::new(SinkFanout::new(
            sink_store.clone(),
            handlers(),
            queue.clone(),
        ));
        let fanout = Arc::new(InboundFanout::new(
            sessions.clone(),
            sinks,
            self.settings.sinks_enabled,
        ));
        let registry = ConnectionRegistry::new(
            self.settings,
            PoolServices {
                connector: connector.clone(),
                config_store: store.clone(),
                missions: missions.clone(),
                metrics: metrics.clone(),
                fanout,
            },
        );

        Pool {
            registry,
            connector,
            store,
            missions,
            metrics,
            sessions,
            sink_store,
            queue,
        }
    }
}
