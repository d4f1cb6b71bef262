//! The concurrency and error-taxonomy scaffolding the task lifecycle engine
//! runs on: backoff, heartbeat, process lock, signal handling, and the
//! result uploader.

pub mod backoff;
pub mod error;
pub mod heartbeat;
pub mod lock;
pub mod signal;
pub mod uploader;

pub use backoff::RetryState;
pub use error::EngineError;
pub use lock::{acquire, LockError, ProcessLock};
pub use signal::{spawn_signal_waiter, TerminationSignal};
