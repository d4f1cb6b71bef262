//! The `Task` handle: a dispatcher-assigned unit of work.

use serde::Deserialize;
use serde_json::Value;

/// The test shape a run is running under. `Sprt`/`Spsa` carry their
/// dispatcher-defined parameter blobs opaquely — only the match runner harness
/// interprets them; the lifecycle engine only needs to know which shape it is
/// (an SPSA run produces no PGN on upload).
#[derive(Debug, Clone, PartialEq)]
pub enum TestKind {
    Sprt(Value),
    Spsa(Value),
    Neither,
}

impl TestKind {
    pub fn is_spsa(&self) -> bool {
        matches!(self, TestKind::Spsa(_))
    }
}

/// The dispatcher-defined arguments of a task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskArgs {
    pub tc: String,
    pub threads: u32,
    pub num_games: u32,
    pub new_tag: String,
    pub base_tag: String,
    pub test_kind: TestKind,
}

/// A handle to an assignment from `/api/request_task`. Created by the
/// request-task response; terminated on success, failure, or a
/// server-signalled `task_alive: false` observed by the heartbeat loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub run_id: String,
    pub task_id: u32,
    pub args: TaskArgs,
    pub num_games: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskParseError {
    #[error("missing or malformed field {0:?} in request_task response")]
    MissingField(&'static str),
}

#[derive(Deserialize)]
struct RawTask {
    run: RawRun,
    task_id: u32,
}

#[derive(Deserialize)]
struct RawRun {
    #[serde(rename = "_id")]
    id: String,
    args: RawArgs,
    my_task: RawMyTask,
}

#[derive(Deserialize)]
struct RawMyTask {
    num_games: u32,
}

#[derive(Deserialize)]
struct RawArgs {
    tc: String,
    threads: u32,
    num_games: u32,
    new_tag: String,
    base_tag: String,
    #[serde(default)]
    sprt: Option<Value>,
    #[serde(default)]
    spsa: Option<Value>,
}

/// Parses the raw JSON body of a `{run, task_id}` response into a `Task`.
pub fn parse_task(raw: &Value) -> Result<Task, TaskParseError> {
    let parsed: RawTask =
        serde_json::from_value(raw.clone()).map_err(|_| TaskParseError::MissingField("run/task_id"))?;

    let test_kind = match (parsed.run.args.sprt, parsed.run.args.spsa) {
        (Some(sprt), _) => TestKind::Sprt(sprt),
        (None, Some(spsa)) => TestKind::Spsa(spsa),
        (None, None) => TestKind::Neither,
    };

    Ok(Task {
        run_id: parsed.run.id,
        task_id: parsed.task_id,
        args: TaskArgs {
            tc: parsed.run.args.tc,
            threads: parsed.run.args.threads,
            num_games: parsed.run.args.num_games,
            new_tag: parsed.run.args.new_tag,
            base_tag: parsed.run.args.base_tag,
            test_kind,
        },
        num_games: parsed.run.my_task.num_games,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sprt_task() {
        let raw = serde_json::json!({
            "run": {
                "_id": "R1",
                "args": {
                    "tc": "10+0.1",
                    "threads": 1,
                    "num_games": 20,
                    "new_tag": "nt",
                    "base_tag": "bt",
                    "sprt": {"alpha": 0.05}
                },
                "my_task": {"num_games": 20}
            },
            "task_id": 3
        });
        let task = parse_task(&raw).unwrap();
        assert_eq!(task.run_id, "R1");
        assert_eq!(task.task_id, 3);
        assert_eq!(task.num_games, 20);
        assert!(matches!(task.args.test_kind, TestKind::Sprt(_)));
    }

    #[test]
    fn parses_spsa_task_as_producing_no_pgn() {
        let raw = serde_json::json!({
            "run": {
                "_id": "R2",
                "args": {
                    "tc": "10+0.1",
                    "threads": 1,
                    "num_games": 1000,
                    "new_tag": "nt",
                    "base_tag": "bt",
                    "spsa": {"iter": 1}
                },
                "my_task": {"num_games": 1000}
            },
            "task_id": 7
        });
        let task = parse_task(&raw).unwrap();
        assert!(task.args.test_kind.is_spsa());
    }

    #[test]
    fn rejects_malformed_response() {
        let raw = serde_json::json!({"run": {}, "task_id": 1});
        assert!(parse_task(&raw).is_err());
    }
}
