//! Concrete [`MatchRunner`]: ensures the match-runner binary via the harness,
//! invokes it with the task's arguments under a process group, and parses its
//! one line of structured output into a [`MatchOutcome`].
//!
//! What the match runner does internally — how it actually plays games — is
//! out of scope here. What this module owns is the invocation contract
//! around it: the argument shape, the process-group lifetime under
//! cancellation, and the final line it is expected to print:
//! `RESULT pgn=<path> crc32=<8 hex digits>` (SPSA runs omit `pgn=`, since an
//! SPSA run produces no PGN).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use worker_core::task::Task;
use worker_core::SharedState;

use crate::compiler::Compiler;
use crate::harness::ensure_runner;
use crate::process::spawn_group;
use crate::runner::{MatchOutcome, MatchRunner, PgnResult, RunOutcomeError};

/// A [`MatchRunner`] backed by the on-disk harness binary.
pub struct HarnessRunner {
    pub install_dir: PathBuf,
    pub pinned_sha: String,
    pub source_url: String,
    pub cache_dir: Option<PathBuf>,
    pub compiler: Compiler,
    pub concurrency: u32,
}

fn build_args(task: &Task) -> Vec<String> {
    let mut args = vec![
        "-tc".to_string(),
        task.args.tc.clone(),
        "-threads".to_string(),
        task.args.threads.to_string(),
        "-games".to_string(),
        task.num_games.to_string(),
        "-new".to_string(),
        task.args.new_tag.clone(),
        "-base".to_string(),
        task.args.base_tag.clone(),
    ];
    if !task.args.test_kind.is_spsa() {
        args.push("-pgnout".to_string());
        args.push(format!("{}-{}.pgn", task.run_id, task.task_id));
    }
    args
}

fn parse_result_line(line: &str, install_dir: &Path) -> Result<MatchOutcome, RunOutcomeError> {
    let mut pgn_path: Option<PathBuf> = None;
    let mut crc: Option<u32> = None;
    for field in line.split_whitespace() {
        if let Some(v) = field.strip_prefix("pgn=") {
            pgn_path = Some(PathBuf::from(v));
        } else if let Some(v) = field.strip_prefix("crc32=") {
            crc = u32::from_str_radix(v, 16).ok();
        }
    }

    let pgn = match (pgn_path, crc) {
        (Some(path), Some(crc32)) => {
            let path = if path.is_absolute() {
                path
            } else {
                install_dir.join("testing").join(path)
            };
            Some(PgnResult { path, crc32 })
        }
        (None, None) => None,
        _ => {
            return Err(RunOutcomeError::WorkerIssue(format!(
                "RESULT line carries only one of pgn=/crc32=: {line:?}"
            )))
        }
    };

    Ok(MatchOutcome { pgn })
}

#[async_trait]
impl MatchRunner for HarnessRunner {
    async fn run_games(&self, state: Arc<SharedState>, task: &Task) -> Result<MatchOutcome, RunOutcomeError> {
        let runner = ensure_runner(
            &self.install_dir,
            &self.pinned_sha,
            &self.source_url,
            self.cache_dir.as_deref(),
            &self.compiler,
            self.concurrency,
        )
        .await
        .map_err(|err| RunOutcomeError::Fatal(format!("match-runner unavailable: {err}")))?;

        let program = runner.path.to_string_lossy().into_owned();
        let args = build_args(task);
        let testing_dir = self.install_dir.join("testing");
        let mut child = spawn_group(&program, &args, &testing_dir)
            .map_err(|err| RunOutcomeError::WorkerIssue(format!("failed to spawn match runner: {err}")))?;

        let stdout = child
            .stdout()
            .ok_or_else(|| RunOutcomeError::WorkerIssue("match runner produced no stdout".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let result_line = loop {
            tokio::select! {
                _ = state.wait_dead() => {
                    child.kill_group();
                    let _ = child.wait().await;
                    return Err(RunOutcomeError::Fatal("terminated by signal".to_string()));
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(text)) => {
                            tracing::debug!(output = %text, "match runner output");
                            if let Some(result) = text.strip_prefix("RESULT ") {
                                break Some(result.to_string());
                            }
                        }
                        Ok(None) => break None,
                        Err(err) => {
                            return Err(RunOutcomeError::WorkerIssue(format!(
                                "reading match runner output: {err}"
                            )))
                        }
                    }
                }
            }
        };

        let status = child
            .wait()
            .await
            .map_err(|err| RunOutcomeError::WorkerIssue(format!("waiting for match runner: {err}")))?;

        let Some(result_line) = result_line else {
            return Err(RunOutcomeError::RunBroken(
                "match runner exited without a RESULT line".to_string(),
            ));
        };
        if !status.success() {
            return Err(RunOutcomeError::RunBroken(format!(
                "match runner exited with {status}"
            )));
        }

        parse_result_line(&result_line, &self.install_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sprt_result_line() {
        let outcome = parse_result_line("pgn=R1-3.pgn crc32=1234abcd", Path::new("/opt/worker")).unwrap();
        let pgn = outcome.pgn.expect("sprt run carries a pgn");
        assert_eq!(pgn.path, Path::new("/opt/worker/testing/R1-3.pgn"));
        assert_eq!(pgn.crc32, 0x1234abcd);
    }

    #[test]
    fn spsa_result_line_carries_no_pgn() {
        let outcome = parse_result_line("games=1000", Path::new("/opt/worker")).unwrap();
        assert!(outcome.pgn.is_none());
    }

    #[test]
    fn rejects_partial_result_line() {
        let err = parse_result_line("pgn=R1-3.pgn", Path::new("/opt/worker"));
        assert!(err.is_err());
    }

    #[test]
    fn spsa_task_args_omit_pgnout_flag() {
        let raw = serde_json::json!({
            "run": {
                "_id": "R2",
                "args": {
                    "tc": "10+0.1", "threads": 1, "num_games": 1000,
                    "new_tag": "nt", "base_tag": "bt", "spsa": {"iter": 1}
                },
                "my_task": {"num_games": 1000}
            },
            "task_id": 7
        });
        let task = worker_core::task::parse_task(&raw).unwrap();
        let args = build_args(&task);
        assert!(!args.iter().any(|a| a == "-pgnout"));
    }
}
