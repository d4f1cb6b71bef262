//! The task lifecycle engine: the outer loop that ties the dispatcher client,
//! integrity manager, match runner harness, heartbeat loop, and signal
//! handler together through `SharedState`.
//!
//! ```text
//! STARTUP_VERIFY  →  REQUEST_TASK  →  RUN  →  REPORT  →  UPLOAD  →  BACKOFF?  →  loop
//!      ↓ fail           ↓ waiting      ↓ fail    ↓
//!      EXIT(1)          WAIT+loop      REPORT    loop
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use worker_core::constants::{FISH_EXIT_FILENAME, STALE_FILE_MAX_AGE, STALE_FILE_MAX_ENTRIES};
use worker_core::state::ActiveTask;
use worker_core::task::Task;
use worker_core::{SharedState, WorkerIdentity};
use worker_dispatcher::{
    failed_task, request_task, request_version, stop_run, DispatcherClient, FailedTaskBody,
    RequestTaskOutcome, StopRunBody, WorkerInfo,
};
use worker_engine::backoff::RetryState;
use worker_engine::error::EngineError;
use worker_engine::uploader::{cleanup_pgn_file, upload};
use worker_runner::{trim_stale_files, MatchOutcome, MatchRunner, RunOutcomeError};

use crate::github;

/// How the lifecycle loop ended, mapped to a process exit by `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleExit {
    /// `fish.exit` sentinel observed: exit 0.
    CleanExit,
    /// Signal-driven shutdown, fleet-mode drain, or a Fatal error: exit 1.
    Failure,
    /// `/api/request_version` reported a higher required version: the caller
    /// must back up the log, release the process lock, and invoke the
    /// updater, then exit 1 regardless of the updater's outcome.
    SelfUpdateRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterationOutcome {
    Success,
    /// `task_waiting`: no error to report, but still counts as a failed
    /// iteration for backoff purposes.
    SoftFailure,
    Failure,
}

pub struct EngineContext {
    pub client: DispatcherClient,
    pub github_http: reqwest::Client,
    pub state: Arc<SharedState>,
    pub identity: WorkerIdentity,
    pub password: String,
    pub install_dir: PathBuf,
    pub fleet: bool,
    pub match_runner: Arc<dyn MatchRunner>,
}

fn fish_exit_path(install_dir: &Path) -> PathBuf {
    install_dir.join(FISH_EXIT_FILENAME)
}

/// Runs the outer loop until a terminal condition is reached. Never panics
/// on a single failed iteration — only signal-driven shutdown, fleet-mode
/// draining, the `fish.exit` sentinel, or a required self-update end it.
pub async fn run(ctx: EngineContext) -> LifecycleExit {
    let EngineContext {
        client,
        github_http,
        state,
        mut identity,
        password,
        install_dir,
        fleet,
        match_runner,
    } = ctx;

    let testing_dir = install_dir.join("testing");
    let mut retry = RetryState::new();

    loop {
        if !state.is_alive() {
            return LifecycleExit::Failure;
        }

        let iteration_outcome = match run_iteration(
            &client,
            &github_http,
            &state,
            &mut identity,
            &password,
            &install_dir,
            &testing_dir,
            match_runner.as_ref(),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(exit) => return exit,
        };

        match iteration_outcome {
            IterationOutcome::Success => retry.record_success(),
            IterationOutcome::SoftFailure | IterationOutcome::Failure => retry.record_failure(),
        }

        if !state.is_alive() {
            return LifecycleExit::Failure;
        }

        if fish_exit_path(&install_dir).exists() {
            let _ = std::fs::remove_file(fish_exit_path(&install_dir));
            tracing::info!("fish.exit sentinel observed, exiting cleanly");
            return LifecycleExit::CleanExit;
        }

        if fleet && iteration_outcome == IterationOutcome::Failure {
            tracing::info!("fleet mode: draining after a failed iteration");
            return LifecycleExit::Failure;
        }

        match backoff_sleep(retry.current_delay(), &install_dir, &state).await {
            BackoffWake::Elapsed => {}
            BackoffWake::ExitSentinel => {
                let _ = std::fs::remove_file(fish_exit_path(&install_dir));
                tracing::info!("fish.exit sentinel observed during backoff, exiting cleanly");
                return LifecycleExit::CleanExit;
            }
            BackoffWake::Signalled => return LifecycleExit::Failure,
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_iteration(
    client: &DispatcherClient,
    github_http: &reqwest::Client,
    state: &Arc<SharedState>,
    identity: &mut WorkerIdentity,
    password: &str,
    install_dir: &Path,
    testing_dir: &Path,
    match_runner: &dyn MatchRunner,
) -> Result<IterationOutcome, LifecycleExit> {
    trim_stale_files(testing_dir, STALE_FILE_MAX_AGE, STALE_FILE_MAX_ENTRIES);
    identity.near_github_api_limit = github::probe(github_http, identity.near_github_api_limit).await;

    match request_version(client, &identity.username, password).await {
        Ok(response) => {
            if let Some(err) = response.error {
                tracing::error!(error = %err, "request_version rejected worker credentials");
                state.mark_dead();
                return Err(LifecycleExit::Failure);
            }
            if let Some(required) = response.version {
                if required > identity.version {
                    tracing::warn!(
                        required,
                        current = identity.version,
                        "dispatcher requires a newer worker version"
                    );
                    return Err(LifecycleExit::SelfUpdateRequired);
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "request_version transient failure, counted as a failed iteration");
            return Ok(IterationOutcome::Failure);
        }
    }

    let worker_info = WorkerInfo::from_identity(identity, 0.0);

    let task = match request_task(client, &worker_info, password).await {
        Ok(RequestTaskOutcome::Assigned(task)) => *task,
        Ok(RequestTaskOutcome::TaskWaiting) => return Ok(IterationOutcome::SoftFailure),
        Ok(RequestTaskOutcome::Error(err)) => {
            tracing::warn!(error = %err, "request_task rejected");
            return Ok(IterationOutcome::Failure);
        }
        Err(err) => {
            tracing::warn!(error = %err, "request_task transient failure");
            return Ok(IterationOutcome::Failure);
        }
    };

    state.set_task(Some(ActiveTask {
        run_id: task.run_id.clone(),
        task_id: task.task_id,
    }));
    state.touch_heartbeat();

    let run_result = match_runner.run_games(state.clone(), &task).await;
    let outcome = handle_run_result(client, &worker_info, password, &task, run_result, state).await;

    state.set_task(None);
    Ok(outcome)
}

async fn handle_run_result(
    client: &DispatcherClient,
    worker_info: &WorkerInfo,
    password: &str,
    task: &Task,
    run_result: Result<MatchOutcome, RunOutcomeError>,
    state: &SharedState,
) -> IterationOutcome {
    match run_result {
        Ok(outcome) => {
            report_success_and_upload(client, worker_info, password, task, outcome).await;
            IterationOutcome::Success
        }
        Err(RunOutcomeError::Fatal(message)) => {
            let full_message = EngineError::Fatal(message).message();
            report_failed_task(client, worker_info, password, task, &full_message).await;
            tracing::error!(message = %full_message, "fatal error, shutting down");
            state.mark_dead();
            IterationOutcome::Failure
        }
        Err(RunOutcomeError::RunBroken(message)) => {
            let full_message = EngineError::RunBroken(message).message();
            report_stop_run(client, worker_info, password, task, &full_message).await;
            tracing::warn!(message = %full_message, "run broken, reported via stop_run");
            IterationOutcome::Failure
        }
        Err(RunOutcomeError::WorkerIssue(message)) => {
            let full_message = EngineError::TaskFailed(message).message();
            report_failed_task(client, worker_info, password, task, &full_message).await;
            tracing::warn!(message = %full_message, "task failed, worker continues");
            IterationOutcome::Failure
        }
        Err(RunOutcomeError::Other(message)) => {
            let full_message = EngineError::TaskFailed(message).message();
            report_failed_task(client, worker_info, password, task, &full_message).await;
            tracing::error!(message = %full_message, "unclassified error, exiting");
            state.mark_dead();
            IterationOutcome::Failure
        }
    }
}

async fn report_failed_task(
    client: &DispatcherClient,
    worker_info: &WorkerInfo,
    password: &str,
    task: &Task,
    message: &str,
) {
    let body = FailedTaskBody {
        worker_info,
        password,
        run_id: &task.run_id,
        task_id: task.task_id,
        message,
    };
    if let Err(err) = failed_task(client, &body).await {
        tracing::warn!(error = %err, "failed_task report itself failed (not retried)");
    }
}

async fn report_stop_run(
    client: &DispatcherClient,
    worker_info: &WorkerInfo,
    password: &str,
    task: &Task,
    message: &str,
) {
    let body = StopRunBody {
        worker_info,
        password,
        run_id: &task.run_id,
        task_id: task.task_id,
        message,
    };
    if let Err(err) = stop_run(client, &body).await {
        tracing::warn!(error = %err, "stop_run report itself failed (not retried)");
    }
}

async fn report_success_and_upload(
    client: &DispatcherClient,
    worker_info: &WorkerInfo,
    password: &str,
    task: &Task,
    outcome: MatchOutcome,
) {
    let Some(pgn) = outcome.pgn else {
        tracing::info!(run_id = %task.run_id, task_id = task.task_id, "spsa task completed, no pgn to upload");
        return;
    };

    match upload(client, &pgn.path, pgn.crc32, &task.run_id, task.task_id, worker_info, password).await {
        Ok(()) => tracing::info!(run_id = %task.run_id, task_id = task.task_id, "pgn uploaded"),
        Err(err) => tracing::warn!(error = %err, "pgn upload skipped or failed (advisory)"),
    }
    cleanup_pgn_file(&pgn.path);
}

enum BackoffWake {
    Elapsed,
    ExitSentinel,
    Signalled,
}

/// Sleeps for `delay`, polling once a second for the `fish.exit` sentinel and
/// for `state` going dead, so either condition cuts the sleep short.
async fn backoff_sleep(delay: Duration, install_dir: &Path, state: &SharedState) -> BackoffWake {
    let deadline = tokio::time::Instant::now() + delay;
    loop {
        if fish_exit_path(install_dir).exists() {
            return BackoffWake::ExitSentinel;
        }
        if !state.is_alive() {
            return BackoffWake::Signalled;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return BackoffWake::Elapsed;
        }
        let tick = (deadline - now).min(Duration::from_secs(1));
        tokio::select! {
            _ = state.wait_dead() => return BackoffWake::Signalled,
            _ = tokio::time::sleep(tick) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn backoff_sleep_elapses_normally() {
        let state = SharedState::new();
        let dir = tempfile::tempdir().unwrap();
        let wake = backoff_sleep(Duration::from_secs(5), dir.path(), &state).await;
        assert!(matches!(wake, BackoffWake::Elapsed));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn backoff_sleep_cut_short_by_sentinel() {
        let state = SharedState::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FISH_EXIT_FILENAME), b"").unwrap();
        let wake = backoff_sleep(Duration::from_secs(3600), dir.path(), &state).await;
        assert!(matches!(wake, BackoffWake::ExitSentinel));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn backoff_sleep_cut_short_by_shutdown() {
        let state = SharedState::new();
        let dir = tempfile::tempdir().unwrap();
        state.mark_dead();
        let wake = backoff_sleep(Duration::from_secs(3600), dir.path(), &state).await;
        assert!(matches!(wake, BackoffWake::Signalled));
    }
}
