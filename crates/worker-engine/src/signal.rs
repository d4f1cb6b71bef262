//! Converts OS termination signals into cooperative shutdown.
//!
//! Listens for SIGINT/SIGTERM/SIGQUIT on POSIX and Ctrl-C/Ctrl-Break on
//! Windows via `tokio::signal` rather than pulling in a separate signal
//! crate.

use std::sync::Arc;

use worker_core::SharedState;

/// The signal that triggered shutdown, for the message propagated into the
/// currently-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Sigint,
    Sigterm,
    Sigquit,
    CtrlBreak,
}

impl TerminationSignal {
    pub fn name(self) -> &'static str {
        match self {
            TerminationSignal::Sigint => "SIGINT",
            TerminationSignal::Sigterm => "SIGTERM",
            TerminationSignal::Sigquit => "SIGQUIT",
            TerminationSignal::CtrlBreak => "SIGBREAK",
        }
    }
}

/// Spawns a task that waits for the first termination signal, marks
/// `state` dead, and resolves with which signal it was. The task exits
/// without sending anything if `state` was already marked dead by some
/// other path first (signal raced with a normal shutdown).
pub fn spawn_signal_waiter(state: Arc<SharedState>) -> tokio::sync::oneshot::Receiver<TerminationSignal> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let signal = wait_for_any_signal().await;
        state.mark_dead();
        let _ = tx.send(signal);
    });
    rx
}

#[cfg(unix)]
async fn wait_for_any_signal() -> TerminationSignal {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigquit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");

    tokio::select! {
        _ = sigint.recv() => TerminationSignal::Sigint,
        _ = sigterm.recv() => TerminationSignal::Sigterm,
        _ = sigquit.recv() => TerminationSignal::Sigquit,
    }
}

#[cfg(windows)]
async fn wait_for_any_signal() -> TerminationSignal {
    use tokio::signal::windows::{ctrl_break, ctrl_c};

    let mut ctrl_c_stream = ctrl_c().expect("failed to install Ctrl-C handler");
    let mut ctrl_break_stream = ctrl_break().expect("failed to install Ctrl-Break handler");

    tokio::select! {
        _ = ctrl_c_stream.recv() => TerminationSignal::Sigint,
        _ = ctrl_break_stream.recv() => TerminationSignal::CtrlBreak,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_signal_text() {
        assert_eq!(TerminationSignal::Sigint.name(), "SIGINT");
        assert_eq!(TerminationSignal::Sigterm.name(), "SIGTERM");
        assert_eq!(TerminationSignal::Sigquit.name(), "SIGQUIT");
        assert_eq!(TerminationSignal::CtrlBreak.name(), "SIGBREAK");
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "current_thread")]
    async fn sigint_marks_state_dead() {
        let state = Arc::new(SharedState::new());
        let rx = spawn_signal_waiter(state.clone());
        // Give the spawned task a chance to install its handlers before we
        // signal our own process.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        unsafe {
            libc::raise(libc::SIGINT);
        }
        let signal = rx.await.unwrap();
        assert_eq!(signal, TerminationSignal::Sigint);
        assert!(!state.is_alive());
    }
}
