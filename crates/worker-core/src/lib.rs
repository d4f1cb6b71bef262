//! Identity, configuration, and shared lifecycle state for the worker.

pub mod config;
pub mod constants;
pub mod expr;
pub mod identity;
pub mod limits;
pub mod state;
pub mod task;

pub use config::WorkerConfig;
pub use identity::WorkerIdentity;
pub use limits::{resolve_limits, ResolvedLimits};
pub use state::SharedState;
pub use task::{Task, TaskArgs, TestKind};
