//! Self-update trigger.
//!
//! The updater binary's own behavior is out of scope for this crate; it only
//! owns the sequencing the running worker is responsible for: back up the
//! log, release the process lock, and hand off to the updater.

use std::path::Path;

/// Copies the current log file to a timestamped backup next to it.
///
/// Failure here is advisory: a missing or unwritable log is not a reason to
/// abort a self-update that is otherwise necessary.
pub fn backup_log(log_path: &Path) {
    if !log_path.exists() {
        return;
    }
    let backup = log_path.with_extension(format!(
        "log.{}.bak",
        chrono::Utc::now().format("%Y%m%dT%H%M%S")
    ));
    if let Err(err) = std::fs::copy(log_path, &backup) {
        tracing::warn!(error = %err, "failed to back up log before self-update");
    }
}

/// Invokes the updater binary with `args` and returns once it has been
/// spawned. The updater is expected to `exec` a fresh worker process on
/// success, so this worker's own exit code after calling this function is
/// always non-zero: the only way forward is the updater's replacement
/// process.
pub fn run_self_update(updater_path: &Path, args: &[String]) -> anyhow::Result<()> {
    let status = std::process::Command::new(updater_path)
        .args(args)
        .status()?;
    if !status.success() {
        anyhow::bail!("updater exited with {status}");
    }
    Ok(())
}
