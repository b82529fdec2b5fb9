// ── Retry controller ──
//
// Two regimes per client. Until the first message arrives a client gets
// `initial_attempts` linearly backed-off reconnects and is then abandoned.
// Once established it retries forever with a clamped linear backoff.
//
// The wait runs in a task owned by the client, so it suspends only that
// client and dies with it on `delete()`.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::client::ConnectionClient;
use crate::config::RetryPolicy;

/// Next counter value and the delay before that attempt, or `None` when
/// a never-connected client has used up its attempts.
pub(crate) fn next_attempt(policy: &RetryPolicy, initial: bool, retry: u32) -> Option<(u32, Duration)> {
    if initial {
        if retry >= policy.initial_attempts {
            return None;
        }
        let n = retry + 1;
        Some((n, policy.step.saturating_mul(n)))
    } else {
        let n = retry.saturating_add(1);
        Some((n, policy.step.saturating_mul(n).min(policy.max_delay)))
    }
}

/// React to a failure event on `client`. If a retry is already waiting,
/// the event is folded into it.
pub(crate) fn schedule(client: &Arc<ConnectionClient>, policy: &RetryPolicy) {
    if client.retry_pending.swap(true, Ordering::AcqRel) {
        debug!(connection = %client.id(), "retry already pending");
        return;
    }

    let task_client = Arc::clone(client);
    let policy = policy.clone();
    if !client.spawn(run(task_client, policy)) {
        client.retry_pending.store(false, Ordering::Release);
    }
}

async fn run(client: Arc<ConnectionClient>, policy: RetryPolicy) {
    loop {
        let Some(delay) = client.next_retry_delay(&policy) else {
            warn!(
                connection = %client.id(),
                name = %client.config().name,
                attempts = client.retry_count(),
                "connection never came up, giving up until refresh"
            );
            client.retry_pending.store(false, Ordering::Release);
            return;
        };

        info!(
            connection = %client.id(),
            attempt = client.retry_count(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );

        tokio::select! {
            biased;
            () = client.cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        // Failures reported while reconnecting schedule a fresh task.
        client.retry_pending.store(false, Ordering::Release);
        if client.cancel.is_cancelled() {
            return;
        }

        match client.transport().reconnect().await {
            Ok(()) => return,
            Err(e) => {
                warn!(connection = %client.id(), error = %e, "reconnect failed");
                if client.retry_pending.swap(true, Ordering::AcqRel) {
                    return;
                }
            }
        }
    }
}
