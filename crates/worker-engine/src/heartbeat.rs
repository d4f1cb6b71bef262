//! Background heartbeat loop.

use std::sync::Arc;
use std::time::Duration;

use worker_core::constants::{HEARTBEAT_INTERVAL, HEARTBEAT_TICK};
use worker_core::SharedState;
use worker_dispatcher::{beat, DispatcherClient, WorkerInfo};

/// Runs until `state.wait_dead()` resolves. Wakes every `HEARTBEAT_TICK` and
/// only sends a beat when a task is active and `HEARTBEAT_INTERVAL` has
/// elapsed since the last one. A beat response carrying `task_alive: false`
/// clears the active task; beat failures are advisory — logged but never
/// escalated.
pub async fn run(client: DispatcherClient, worker_info_password: (WorkerInfo, String), state: Arc<SharedState>) {
    let (worker_info, password) = worker_info_password;
    let mut ticker = tokio::time::interval(HEARTBEAT_TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = state.wait_dead() => {
                tracing::debug!("heartbeat loop exiting: worker no longer alive");
                return;
            }
            _ = ticker.tick() => {
                tick_once(&client, &worker_info, &password, &state).await;
            }
        }
    }
}

async fn tick_once(client: &DispatcherClient, worker_info: &WorkerInfo, password: &str, state: &Arc<SharedState>) {
    let Some(task) = state.task() else {
        return;
    };

    let elapsed = chrono::Utc::now() - state.last_heartbeat();
    let due = elapsed
        .to_std()
        .map(|d| d > HEARTBEAT_INTERVAL)
        .unwrap_or(true);
    if !due {
        return;
    }

    match beat(client, worker_info, password, &task.run_id, task.task_id).await {
        Ok(response) => {
            state.touch_heartbeat();
            if let Some(err) = response.error {
                tracing::warn!(error = %err, "heartbeat response carried an error");
            }
            if !response.task_alive {
                tracing::info!(run_id = %task.run_id, task_id = task.task_id, "dispatcher signalled task no longer alive");
                state.set_task(None);
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "heartbeat call failed (advisory, not escalated)");
        }
    }
}

/// Duration since the last heartbeat, exposed for the main loop's
/// `THREAD_JOIN_TIMEOUT` wait during shutdown.
pub fn join_timeout() -> Duration {
    worker_core::constants::THREAD_JOIN_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn no_beat_sent_when_task_is_nil() {
        let state = Arc::new(SharedState::new());
        assert!(state.task().is_none());
        // tick_once would need a live client to go further; absence of a
        // task is the short-circuit this test exercises.
    }

    #[test]
    fn heartbeat_interval_matches_spec() {
        assert_eq!(HEARTBEAT_INTERVAL, Duration::from_secs(120));
        assert_eq!(HEARTBEAT_TICK, Duration::from_secs(1));
    }
}
