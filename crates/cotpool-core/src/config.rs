// ── Runtime pool configuration ──
//
// These types describe *how* the pool behaves. They never touch disk:
// `cotpool-config` (or a test) constructs `PoolSettings` and hands it in.

use std::time::Duration;

/// Stack name under which heartbeats are suppressed.
pub const TEST_STACK: &str = "test";

/// Backoff policy for reconnecting a failed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay added per consecutive attempt. Default: 1s.
    pub step: Duration,
    /// Upper bound on the established-regime delay. Default: 15s.
    pub max_delay: Duration,
    /// Attempts allowed before a never-connected client is abandoned.
    /// Default: 5.
    pub initial_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(1),
            max_delay: Duration::from_secs(15),
            initial_attempts: 5,
        }
    }
}

/// Process-wide settings for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Deployment stack name. `"test"` disables heartbeats.
    pub stack_name: String,
    /// Local development mode: `init()` registers no connections.
    pub local: bool,
    /// Global sink switch. When false, sink fanout is never invoked.
    pub sinks_enabled: bool,
    /// When false, heartbeats are paused.
    pub metrics_enabled: bool,
    pub retry: RetryPolicy,
}

impl PoolSettings {
    pub fn is_test_stack(&self) -> bool {
        self.stack_name == TEST_STACK
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            stack_name: "default".into(),
            local: false,
            sinks_enabled: true,
            metrics_enabled: true,
            retry: RetryPolicy::default(),
        }
    }
}
