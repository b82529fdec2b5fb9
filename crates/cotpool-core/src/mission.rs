// ── Mission resubscription ──
//
// A server forgets mission subscriptions when the socket drops, so every
// secure connect replays the configured subscription list.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::CoreError;
use crate::model::ConnectionConfig;

/// Mission endpoints of the collaboration server's HTTP API.
#[async_trait]
pub trait MissionApi: Send + Sync {
    /// Subscribe `uid` to `mission`, authenticating as `config`'s
    /// certificate.
    async fn subscribe(
        &self,
        config: &ConnectionConfig,
        mission: &str,
        uid: &str,
    ) -> Result<(), CoreError>;
}

/// Result of one resubscription pass.
#[derive(Debug, Default)]
pub struct ResubscribeReport {
    pub subscribed: Vec<String>,
    pub failed: Vec<(String, CoreError)>,
}

/// Replays a connection's mission subscriptions.
#[derive(Clone)]
pub struct MissionResubscriber {
    api: Arc<dyn MissionApi>,
}

impl MissionResubscriber {
    pub fn new(api: Arc<dyn MissionApi>) -> Self {
        Self { api }
    }

    /// Subscribe to every configured mission, in order. A failure is
    /// logged and recorded; the remaining missions are still attempted.
    pub async fn resubscribe(&self, config: &ConnectionConfig) -> ResubscribeReport {
        let uid = config.id.to_string();
        let mut report = ResubscribeReport::default();

        for mission in &config.subscriptions {
            match self.api.subscribe(config, mission, &uid).await {
                Ok(()) => {
                    info!(connection = %config.id, mission = %mission, "mission subscribed");
                    report.subscribed.push(mission.clone());
                }
                Err(e) => {
                    warn!(connection = %config.id, mission = %mission, error = %e, "mission subscribe failed");
                    report.failed.push((mission.clone(), e));
                }
            }
        }

        report
    }
}
