//! The match runner contract: `run_games` itself is an opaque, long-running
//! external collaborator. The lifecycle engine only needs a trait object it
//! can invoke under cooperative cancellation and that hands back a PGN path
//! plus its reported CRC.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use worker_core::task::Task;
use worker_core::SharedState;

/// The PGN a completed match wrote, and the CRC32 the runner itself computed
/// over it. Absent for SPSA runs, which produce no PGN at all.
#[derive(Debug, Clone)]
pub struct PgnResult {
    pub path: PathBuf,
    pub crc32: u32,
}

/// What a completed (or aborted) match produced.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub pgn: Option<PgnResult>,
}

/// The four error kinds the engine reacts to differently.
#[derive(Debug, thiserror::Error)]
pub enum RunOutcomeError {
    /// Unrecoverable; the engine must mark `alive=false` and report via
    /// `failed_task`.
    #[error("{0}")]
    Fatal(String),
    /// The run itself is broken (both engines crash, bad params); reported
    /// via `stop_run`.
    #[error("{0}")]
    RunBroken(String),
    /// Transient worker-side issue; reported via `failed_task`.
    #[error("{0}")]
    WorkerIssue(String),
    /// Anything else; reported via `failed_task` and the process exits.
    #[error("{0}")]
    Other(String),
}

/// Supervises one match. Implementations build/verify the match-runner
/// binary, invoke it with the task's arguments, stream its output, and
/// observe `state`/cancellation cooperatively — none of which the lifecycle
/// engine itself needs to know about.
#[async_trait]
pub trait MatchRunner: Send + Sync {
    async fn run_games(&self, state: Arc<SharedState>, task: &Task) -> Result<MatchOutcome, RunOutcomeError>;
}
