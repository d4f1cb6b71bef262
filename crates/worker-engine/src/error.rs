//! Error taxonomy the task lifecycle engine reacts to.

/// Disposition the task lifecycle engine must react to for a given failure.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Unrecoverable worker-wide failure. Sets `alive=false`, process exits 1.
    #[error("{0}")]
    Fatal(String),
    /// The run itself is broken (both engines crash, invalid parameters).
    /// Reported via `/api/stop_run`; the worker continues to the next
    /// iteration.
    #[error("{0}")]
    RunBroken(String),
    /// This task failed but others may succeed. Reported via
    /// `/api/failed_task`; the worker continues.
    #[error("{0}")]
    TaskFailed(String),
}

impl EngineError {
    /// Synthesizes a message carrying the error's kind, source location, and
    /// running worker version.
    #[track_caller]
    pub fn message(&self) -> String {
        let location = std::panic::Location::caller();
        format!(
            "{self} at {}:{} WorkerVersion: {}",
            location.file(),
            location.line(),
            worker_core::constants::WORKER_VERSION
        )
    }
}
