//! Configuration for the cotpool connection pool.
//!
//! TOML file + `COTPOOL_` environment overrides, certificate/key
//! resolution (inline, file, or env var), translation to
//! `cotpool_core::PoolSettings` and `ConnectionConfig`, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use futures_util::stream::{self, BoxStream, StreamExt};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cotpool_core::{
    ConfigStore, ConnectionConfig, ConnectionId, CoreError, Credentials, PoolSettings,
    RetryPolicy, Sink, StaticSinkStore,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("cannot read {what} for connection {connection}: {source}")]
    Credential {
        connection: ConnectionId,
        what: &'static str,
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub log: LogSettings,

    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,

    #[serde(default)]
    pub sinks: Vec<Sink>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PoolSection {
    /// Deployment stack name; `"test"` suppresses heartbeats.
    #[serde(default = "default_stack_name")]
    pub stack_name: String,

    /// Local development mode: bring-up registers nothing.
    #[serde(default)]
    pub local: bool,

    #[serde(default = "default_true")]
    pub sinks_enabled: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            stack_name: default_stack_name(),
            local: false,
            sinks_enabled: true,
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetrySection {
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_initial_attempts")]
    pub initial_attempts: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            step_ms: default_step_ms(),
            max_delay_ms: default_max_delay_ms(),
            initial_attempts: default_initial_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// One `[[connections]]` row.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionEntry {
    pub id: ConnectionId,

    #[serde(default)]
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Streaming endpoint, e.g. `ssl://tak.example.com:8089`.
    pub url: String,

    /// Inline PEM certificate.
    pub cert: Option<String>,

    /// Path to a PEM certificate.
    pub cert_path: Option<PathBuf>,

    /// Inline PEM key (plaintext; prefer `key_path` or `key_env`).
    pub key: Option<String>,

    /// Path to a PEM key.
    pub key_path: Option<PathBuf>,

    /// Environment variable holding the PEM key.
    pub key_env: Option<String>,

    #[serde(default)]
    pub subscriptions: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_stack_name() -> String {
    "default".into()
}
fn default_step_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    15_000
}
fn default_initial_attempts() -> u32 {
    5
}
fn default_log_level() -> String {
    "info".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "cotpool", "cotpool").map_or_else(
        || PathBuf::from("cotpool.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment. `path` overrides the
/// platform config location. A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("COTPOOL_").split("__"));

    let config: Config = figment.extract()?;
    debug!(
        path = %path.display(),
        connections = config.connections.len(),
        sinks = config.sinks.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation to core types ───────────────────────────────────────

impl Config {
    /// Validated runtime settings for the pool.
    pub fn pool_settings(&self) -> Result<PoolSettings, ConfigError> {
        let retry = &self.retry;
        if retry.step_ms == 0 {
            return Err(ConfigError::Validation {
                field: "retry.step_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if retry.max_delay_ms < retry.step_ms {
            return Err(ConfigError::Validation {
                field: "retry.max_delay_ms".into(),
                reason: format!("must be at least step_ms ({})", retry.step_ms),
            });
        }

        Ok(PoolSettings {
            stack_name: self.pool.stack_name.clone(),
            local: self.pool.local,
            sinks_enabled: self.pool.sinks_enabled,
            metrics_enabled: self.pool.metrics_enabled,
            retry: RetryPolicy {
                step: Duration::from_millis(retry.step_ms),
                max_delay: Duration::from_millis(retry.max_delay_ms),
                initial_attempts: retry.initial_attempts,
            },
        })
    }

    /// In-memory sink store over the `[[sinks]]` table.
    pub fn sink_store(&self) -> StaticSinkStore {
        StaticSinkStore::new(self.sinks.iter().cloned())
    }
}

impl ConnectionEntry {
    /// Build the core connection config, resolving certificate and key.
    ///
    /// Absent material leaves `auth` empty so the registry reports the
    /// connection as misconfigured; unreadable material is an error.
    pub fn to_connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        let url: url::Url = self.url.parse().map_err(|_| ConfigError::Validation {
            field: format!("connections.{}.url", self.id),
            reason: format!("invalid URL: {}", self.url),
        })?;

        let name = if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        };

        Ok(ConnectionConfig {
            id: self.id.clone(),
            name,
            enabled: self.enabled,
            url,
            auth: self.resolve_credentials()?,
            subscriptions: self.subscriptions.clone(),
        })
    }

    /// Certificate and key, when both are configured.
    pub fn resolve_credentials(&self) -> Result<Option<Credentials>, ConfigError> {
        let cert = match (&self.cert, &self.cert_path) {
            (Some(cert), _) => Some(cert.clone()),
            (None, Some(path)) => Some(self.read_pem(path, "certificate")?),
            (None, None) => None,
        };
        let key = self.resolve_key()?;

        Ok(match (cert, key) {
            (Some(cert), Some(key)) => Some(Credentials { cert, key }),
            _ => None,
        })
    }

    // Key chain: env var, then inline, then file.
    fn resolve_key(&self) -> Result<Option<SecretString>, ConfigError> {
        if let Some(ref env_name) = self.key_env {
            if let Ok(val) = std::env::var(env_name) {
                return Ok(Some(SecretString::from(val)));
            }
        }
        if let Some(ref key) = self.key {
            return Ok(Some(SecretString::from(key.clone())));
        }
        if let Some(ref path) = self.key_path {
            return Ok(Some(SecretString::from(self.read_pem(path, "key")?)));
        }
        Ok(None)
    }

    fn read_pem(&self, path: &Path, what: &'static str) -> Result<String, ConfigError> {
        std::fs::read_to_string(path).map_err(|source| ConfigError::Credential {
            connection: self.id.clone(),
            what,
            source,
        })
    }
}

// ── File-backed config store ────────────────────────────────────────

/// Connection table read from the config file. Every `connections()`
/// call re-reads the file, so a registry refresh picks up edits.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    /// One item per `[[connections]]` row. A file that cannot be loaded is
    /// a single stream-level error; a row that cannot be translated fails
    /// on its own as [`CoreError::InvalidConnection`].
    fn connections(&self) -> BoxStream<'_, Result<ConnectionConfig, CoreError>> {
        let entries = match load_config(Some(&self.path)) {
            Ok(config) => config.connections,
            Err(e) => {
                return stream::once(async move {
                    Err(CoreError::ConfigStream {
                        message: e.to_string(),
                    })
                })
                .boxed();
            }
        };

        stream::iter(entries)
            .map(|entry| {
                entry
                    .to_connection_config()
                    .map_err(|e| CoreError::InvalidConnection {
                        connection: entry.id.clone(),
                        message: e.to_string(),
                    })
            })
            .boxed()
    }
}

// ── Tracing ─────────────────────────────────────────────────────────

/// Install the global tracing subscriber. `RUST_LOG` wins over
/// `settings.level`.
pub fn init_tracing(settings: &LogSettings) -> Result<(), ConfigError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let result = if settings.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };
    result.map_err(|e| ConfigError::Logging(e.to_string()))
}
