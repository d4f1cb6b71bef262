//! Exponential backoff between task-lifecycle iterations.

use std::time::Duration;

use worker_core::constants::{INITIAL_RETRY_TIME, MAX_RETRY_TIME};

/// Current backoff delay, doubling on failure up to a ceiling and resetting
/// to the initial delay on success.
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    delay: Duration,
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            delay: INITIAL_RETRY_TIME,
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Doubles the delay, capped at `MAX_RETRY_TIME` (property 1).
    pub fn record_failure(&mut self) {
        self.delay = (self.delay * 2).min(MAX_RETRY_TIME);
    }

    /// Resets the delay to `INITIAL_RETRY_TIME` (property 2).
    pub fn record_success(&mut self) {
        self.delay = INITIAL_RETRY_TIME;
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_on_consecutive_failures_then_caps() {
        let mut retry = RetryState::new();
        let mut expected = INITIAL_RETRY_TIME;
        for _ in 0..8 {
            assert_eq!(retry.current_delay(), expected);
            retry.record_failure();
            expected = (expected * 2).min(MAX_RETRY_TIME);
        }
        // Further failures stay at the ceiling.
        retry.record_failure();
        assert_eq!(retry.current_delay(), MAX_RETRY_TIME);
    }

    #[test]
    fn success_resets_to_initial() {
        let mut retry = RetryState::new();
        retry.record_failure();
        retry.record_failure();
        assert_ne!(retry.current_delay(), INITIAL_RETRY_TIME);
        retry.record_success();
        assert_eq!(retry.current_delay(), INITIAL_RETRY_TIME);
    }
}
