//! Named constants shared across the worker, pinned to the original source's values.

use std::time::Duration;

/// Bumped whenever the wire contract with the dispatcher changes.
pub const WORKER_VERSION: u32 = 1;

/// Timeout for every dispatcher HTTP call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Initial backoff delay after a failed iteration.
pub const INITIAL_RETRY_TIME: Duration = Duration::from_secs(15);

/// Backoff ceiling; doubling stops once this is reached.
pub const MAX_RETRY_TIME: Duration = Duration::from_secs(900);

/// How long the main loop waits for the heartbeat loop to notice shutdown.
pub const THREAD_JOIN_TIMEOUT: Duration = Duration::from_secs(15);

/// How often the heartbeat loop wakes to check whether a beat is due.
pub const HEARTBEAT_TICK: Duration = Duration::from_secs(1);

/// A beat is sent once this much time has passed since the last one.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(120);

/// Files whose content hashes make up the integrity manifest.
pub const FILE_LIST: [&str; 3] = ["updater", "worker", "engine"];

/// GitHub API remaining-calls floor below which `near_github_api_limit` is set.
pub const GITHUB_RATE_LIMIT_FLOOR: u32 = 10;

/// GitHub's own (unauthenticated-safe, dispatcher-independent) rate-limit
/// probe endpoint, used by the pre-iteration near-limit check.
pub const GITHUB_RATE_LIMIT_URL: &str = "https://api.github.com/rate_limit";

/// Scratch files under `testing/` older than this are trimmed once per
/// iteration, ahead of requesting a task.
pub const STALE_FILE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);

/// Hard cap on the number of scratch files kept under `testing/` even if
/// they are not yet stale by age.
pub const STALE_FILE_MAX_ENTRIES: usize = 200;

/// Sentinel file name that, when found in the install directory, causes a
/// clean exit(0) at the next backoff boundary.
pub const FISH_EXIT_FILENAME: &str = "fish.exit";

/// Minimum supported GCC version (major, minor).
pub const MIN_GCC_VERSION: (u32, u32) = (9, 3);

/// Minimum supported Clang version (major, minor).
pub const MIN_CLANG_VERSION: (u32, u32) = (10, 0);

/// Memory-feasibility formula constants (MiB). These must stay in sync with
/// the dispatcher's own assumptions, but there is no protocol for negotiating
/// them, so they are pinned here by name.
pub const TT_MEMORY_MIB: u64 = 16;
pub const PROCESS_MEMORY_MIB: u64 = 10;
pub const NET_MEMORY_MIB: u64 = 138;
pub const PER_THREAD_MEMORY_MIB: u64 = 16;
pub const RUNNER_MEMORY_MIB: u64 = 60;

/// Per-thread footprint of the smallest test shape (STC), used as the
/// memory-feasibility floor.
pub fn stc_memory_mib() -> u64 {
    2 * (TT_MEMORY_MIB + PROCESS_MEMORY_MIB + NET_MEMORY_MIB + PER_THREAD_MEMORY_MIB)
}

/// Largest concurrency that still lets one STC instance fit in `max_memory_mib`.
///
/// Returns `None` if even a single instance does not fit.
pub fn max_feasible_concurrency(max_memory_mib: u64) -> Option<u64> {
    if max_memory_mib <= RUNNER_MEMORY_MIB {
        return None;
    }
    let usable = max_memory_mib - RUNNER_MEMORY_MIB;
    let max_conc = usable / stc_memory_mib();
    if max_conc < 1 { None } else { Some(max_conc) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stc_memory_matches_source_formula() {
        assert_eq!(stc_memory_mib(), 2 * (16 + 10 + 138 + 16));
    }

    #[test]
    fn max_feasible_concurrency_refuses_when_too_small() {
        assert_eq!(max_feasible_concurrency(60), None);
        assert_eq!(max_feasible_concurrency(0), None);
    }

    #[test]
    fn max_feasible_concurrency_matches_source_example() {
        // 4096 MiB budget leaves plenty of room for more than one instance.
        let got = max_feasible_concurrency(4096).unwrap();
        assert_eq!(got, (4096 - RUNNER_MEMORY_MIB) / stc_memory_mib());
    }
}
