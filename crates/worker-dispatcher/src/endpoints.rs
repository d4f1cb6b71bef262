//! Typed request/response shapes for each dispatcher endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use worker_core::task::{parse_task, Task};
use worker_core::WorkerIdentity;

use crate::{semantic_error, DispatcherClient, DispatcherError};

/// `worker_info` wire shape sent on every authenticated call.
///
/// `python_version` keeps its original wire field name for backward
/// compatibility with the dispatcher; this worker fills it with its own
/// runtime-identifying triple rather than an actual Python version.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub unique_key: String,
    pub username: String,
    pub version: u32,
    pub uname: String,
    pub architecture: String,
    pub concurrency: u32,
    pub max_memory: u64,
    pub min_threads: u32,
    pub compiler: String,
    pub compiler_version: (u32, u32, u32),
    pub modified: bool,
    #[serde(rename = "ARCH")]
    pub arch: String,
    pub nps: f64,
    pub near_github_api_limit: bool,
    pub python_version: (u32, u32, u32),
}

impl WorkerInfo {
    /// Builds the wire `worker_info` from the process's stable identity, a
    /// freshly-measured `nps` (nodes per second, benchmarked by the match
    /// runner harness — out of scope here), and this crate's own version as
    /// the `python_version` replacement triple.
    pub fn from_identity(identity: &WorkerIdentity, nps: f64) -> Self {
        WorkerInfo {
            unique_key: identity.unique_key.clone(),
            username: identity.username.clone(),
            version: identity.version,
            uname: identity.uname.clone(),
            architecture: identity.architecture.clone(),
            concurrency: identity.concurrency,
            max_memory: identity.max_memory_mib,
            min_threads: identity.min_threads,
            compiler: identity.compiler_name.clone(),
            compiler_version: identity.compiler_version,
            modified: identity.modified,
            arch: identity.architecture.clone(),
            nps,
            near_github_api_limit: identity.near_github_api_limit,
            python_version: runtime_version_triple(),
        }
    }
}

fn runtime_version_triple() -> (u32, u32, u32) {
    let mut parts = env!("CARGO_PKG_VERSION").split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

#[derive(Debug, Serialize)]
struct RequestVersionBody<'a> {
    worker_info: WorkerInfoUsernameOnly<'a>,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct WorkerInfoUsernameOnly<'a> {
    username: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RequestVersionResponse {
    pub version: Option<u32>,
    pub error: Option<String>,
}

pub async fn request_version(
    client: &DispatcherClient,
    username: &str,
    password: &str,
) -> Result<RequestVersionResponse, DispatcherError> {
    let body = RequestVersionBody {
        worker_info: WorkerInfoUsernameOnly { username },
        password,
    };
    let value = client.post_json("api/request_version", &body).await?;
    serde_json::from_value(value).map_err(|err| DispatcherError::MalformedBody(err.to_string()))
}

#[derive(Debug, Serialize)]
struct RequestTaskBody<'a> {
    worker_info: &'a WorkerInfo,
    password: &'a str,
}

/// Outcome of `/api/request_task`.
#[derive(Debug, Clone)]
pub enum RequestTaskOutcome {
    Assigned(Box<Task>),
    TaskWaiting,
    Error(String),
}

pub async fn request_task(
    client: &DispatcherClient,
    worker_info: &WorkerInfo,
    password: &str,
) -> Result<RequestTaskOutcome, DispatcherError> {
    let body = RequestTaskBody {
        worker_info,
        password,
    };
    let value = client.post_json("api/request_task", &body).await?;
    if let Some(err) = semantic_error(&value) {
        return Ok(RequestTaskOutcome::Error(err));
    }
    if value
        .get("task_waiting")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return Ok(RequestTaskOutcome::TaskWaiting);
    }
    let task = parse_task(&value).map_err(|err| DispatcherError::MalformedBody(err.to_string()))?;
    Ok(RequestTaskOutcome::Assigned(Box::new(task)))
}

#[derive(Debug, Serialize)]
struct BeatBody<'a> {
    worker_info: &'a WorkerInfo,
    password: &'a str,
    run_id: &'a str,
    task_id: u32,
}

#[derive(Debug, Deserialize, Default)]
pub struct BeatResponse {
    #[serde(default = "default_task_alive")]
    pub task_alive: bool,
    pub error: Option<String>,
}

fn default_task_alive() -> bool {
    true
}

pub async fn beat(
    client: &DispatcherClient,
    worker_info: &WorkerInfo,
    password: &str,
    run_id: &str,
    task_id: u32,
) -> Result<BeatResponse, DispatcherError> {
    let body = BeatBody {
        worker_info,
        password,
        run_id,
        task_id,
    };
    let value = client.post_json("api/beat", &body).await?;
    serde_json::from_value(value).map_err(|err| DispatcherError::MalformedBody(err.to_string()))
}

#[derive(Debug, Serialize)]
pub struct FailedTaskBody<'a> {
    pub worker_info: &'a WorkerInfo,
    pub password: &'a str,
    pub run_id: &'a str,
    pub task_id: u32,
    pub message: &'a str,
}

pub async fn failed_task(
    client: &DispatcherClient,
    body: &FailedTaskBody<'_>,
) -> Result<Value, DispatcherError> {
    client.post_json("api/failed_task", body).await
}

#[derive(Debug, Serialize)]
pub struct StopRunBody<'a> {
    pub worker_info: &'a WorkerInfo,
    pub password: &'a str,
    pub run_id: &'a str,
    pub task_id: u32,
    pub message: &'a str,
}

pub async fn stop_run(
    client: &DispatcherClient,
    body: &StopRunBody<'_>,
) -> Result<Value, DispatcherError> {
    client.post_json("api/stop_run", body).await
}

#[derive(Debug, Serialize)]
pub struct UpdateTaskBody<'a> {
    pub worker_info: &'a WorkerInfo,
    pub password: &'a str,
    pub run_id: &'a str,
    pub task_id: u32,
    pub stats: Value,
}

pub async fn update_task(
    client: &DispatcherClient,
    body: &UpdateTaskBody<'_>,
) -> Result<Value, DispatcherError> {
    client.post_json("api/update_task", body).await
}

#[derive(Debug, Serialize)]
pub struct UploadPgnBody<'a> {
    pub run_id: &'a str,
    pub task_id: u32,
    pub pgn: &'a str,
    pub password: &'a str,
    pub worker_info: &'a WorkerInfo,
}

pub async fn upload_pgn(
    client: &DispatcherClient,
    body: &UploadPgnBody<'_>,
) -> Result<Value, DispatcherError> {
    client.post_json("api/upload_pgn", body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_task_outcome_detects_task_waiting() {
        let value = serde_json::json!({"task_waiting": true});
        assert!(semantic_error(&value).is_none());
        assert!(value
            .get("task_waiting")
            .and_then(Value::as_bool)
            .unwrap_or(false));
    }

    #[test]
    fn semantic_error_extracts_message() {
        let value = serde_json::json!({"error": "bad credentials"});
        assert_eq!(semantic_error(&value).as_deref(), Some("bad credentials"));
    }

    #[test]
    fn worker_info_carries_identity_fields() {
        let identity = WorkerIdentity {
            unique_key: "abcdefgh-0000-0000-0000-000000000000".to_string(),
            username: "alice".to_string(),
            version: 5,
            uname: "Linux 6.1".to_string(),
            architecture: "x86_64".to_string(),
            concurrency: 3,
            max_memory_mib: 2048,
            min_threads: 1,
            compiler_name: "g++".to_string(),
            compiler_version: (12, 2, 0),
            modified: false,
            near_github_api_limit: true,
        };
        let info = WorkerInfo::from_identity(&identity, 123_456.0);
        assert_eq!(info.unique_key, identity.unique_key);
        assert_eq!(info.max_memory, 2048);
        assert_eq!(info.arch, "x86_64");
        assert!(info.near_github_api_limit);
    }
}
