//! Shared mutable state read and written by the main loop, the heartbeat
//! loop, and the signal handler.
//!
//! An explicit value passed by reference to every component that needs it —
//! no process-wide mutable singleton. `alive` is a cancellation channel
//! closed exactly once: `CancellationToken::cancel()` is idempotent and
//! `cancelled()` is race-free regardless of whether the token was already
//! cancelled before the wait began, unlike a bare `Notify`, where a waiter
//! that starts observing after `notify_waiters()` has already fired would
//! hang.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// A handle to the currently-running task, as far as the heartbeat loop needs
/// to know: identifiers only, never the task's full argument payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTask {
    pub run_id: String,
    pub task_id: u32,
}

struct Inner {
    task: Option<ActiveTask>,
    last_heartbeat: DateTime<Utc>,
}

/// Shared state across the three concurrent control planes.
///
/// `alive` transitions `true` to `false` at most once per process; `task` is
/// non-nil only while a match is running; `last_heartbeat` advances
/// monotonically. All mutations of `task`/`last_heartbeat` are serialized
/// through a single mutex; `alive` is a `CancellationToken`.
pub struct SharedState {
    cancel: CancellationToken,
    inner: Mutex<Inner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            inner: Mutex::new(Inner {
                task: None,
                last_heartbeat: Utc::now(),
            }),
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Transitions `alive` to `false`. Idempotent: only the first call has
    /// any effect, matching the "at most once" invariant.
    pub fn mark_dead(&self) {
        self.cancel.cancel();
    }

    /// Waits until `mark_dead` has been called, or returns immediately if it
    /// already has. Used by suspension points that must honour cancellation
    /// cooperatively.
    pub async fn wait_dead(&self) {
        self.cancel.cancelled().await;
    }

    pub fn task(&self) -> Option<ActiveTask> {
        self.inner.lock().expect("shared state mutex poisoned").task.clone()
    }

    pub fn set_task(&self, task: Option<ActiveTask>) {
        self.inner.lock().expect("shared state mutex poisoned").task = task;
    }

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        self.inner.lock().expect("shared state mutex poisoned").last_heartbeat
    }

    pub fn touch_heartbeat(&self) {
        self.inner.lock().expect("shared state mutex poisoned").last_heartbeat = Utc::now();
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_dead_is_idempotent() {
        let state = SharedState::new();
        assert!(state.is_alive());
        state.mark_dead();
        assert!(!state.is_alive());
        state.mark_dead();
        assert!(!state.is_alive());
    }

    #[test]
    fn task_starts_nil() {
        let state = SharedState::new();
        assert_eq!(state.task(), None);
        state.set_task(Some(ActiveTask {
            run_id: "R1".to_string(),
            task_id: 3,
        }));
        assert!(state.task().is_some());
        state.set_task(None);
        assert_eq!(state.task(), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn wait_dead_returns_immediately_once_dead() {
        let state = SharedState::new();
        state.mark_dead();
        // Should not hang.
        state.wait_dead().await;
    }
}
