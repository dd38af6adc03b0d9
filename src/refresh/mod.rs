//! Refresh state machine vocabulary, backoff arithmetic and counters.
//!
//! The operation itself lives on the manager (`manager::refresh`); this
//! module holds the parts that need no collaborators.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::error::RefreshError;

// MARK: - State

/// Where the refresh machinery currently stands.
///
/// `Idle -> Refreshing -> {Idle, Backoff, Failed}`; `Backoff` returns to
/// `Refreshing` when the retry timer fires. `Failed` is terminal until
/// teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Idle,
    Refreshing,
    Backoff,
    Failed,
}

impl RefreshState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshState::Idle => "idle",
            RefreshState::Refreshing => "refreshing",
            RefreshState::Backoff => "backoff",
            RefreshState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RefreshState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    /// The periodic cycle tick.
    Cycle,
    /// The one-off refresh issued during initialization.
    Startup,
    /// User activity found the credential close to expiry.
    Activity,
    /// The application became visible again.
    Visibility,
    /// Network connectivity came back.
    Connectivity,
    /// A backoff retry timer fired.
    Retry,
}

impl RefreshTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshTrigger::Cycle => "cycle",
            RefreshTrigger::Startup => "startup",
            RefreshTrigger::Activity => "activity",
            RefreshTrigger::Visibility => "visibility",
            RefreshTrigger::Connectivity => "connectivity",
            RefreshTrigger::Retry => "retry",
        }
    }

    /// Anything outside the periodic cycle counts as forced.
    pub fn is_forced(&self) -> bool {
        matches!(
            self,
            RefreshTrigger::Activity | RefreshTrigger::Visibility | RefreshTrigger::Connectivity
        )
    }
}

impl std::fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// MARK: - Outcome

/// Why an invocation did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The failure handler has taken over.
    FailureInProgress,
    /// Another refresh is running.
    AlreadyInFlight,
    /// The manager is not running (inert or torn down).
    Inactive,
}

/// Result of one refresh invocation.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// A fresh credential was written to the token store.
    Refreshed,
    /// The attempt failed and a retry is pending.
    RetryScheduled { attempt: u32, delay: Duration },
    /// Retries are exhausted and the failure handler was invoked.
    Failed(RefreshError),
    /// Nothing ran.
    Skipped(SkipReason),
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed)
    }
}

// MARK: - Backoff

/// Delay before retry number `retry_count` (1-based):
/// `base * 2^(retry_count - 1)`. A count of zero is treated as one.
pub fn backoff_delay(base: Duration, retry_count: u32) -> Duration {
    let exponent = retry_count.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}

// MARK: - Stats

/// Monotonic counters for the refresh path.
#[derive(Debug, Default)]
pub struct RefreshStats {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    forced: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of [`RefreshStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStatsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub forced: u64,
    pub skipped: u64,
}

impl RefreshStats {
    pub(crate) fn record_attempt(&self, trigger: RefreshTrigger) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if trigger.is_forced() {
            self.forced.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RefreshStatsSnapshot {
        RefreshStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            forced: self.forced.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_backoff_doubles_from_base() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_zero_count_is_base() {
        let base = Duration::from_millis(250);
        assert_eq!(backoff_delay(base, 0), base);
    }

    #[test]
    fn test_backoff_saturates() {
        let delay = backoff_delay(Duration::from_secs(u64::MAX / 2), 40);
        assert_eq!(delay, Duration::MAX);
    }

    #[test]
    fn test_forced_triggers() {
        assert!(RefreshTrigger::Activity.is_forced());
        assert!(RefreshTrigger::Connectivity.is_forced());
        assert!(!RefreshTrigger::Cycle.is_forced());
        assert!(!RefreshTrigger::Retry.is_forced());
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = RefreshStats::default();
        stats.record_attempt(RefreshTrigger::Cycle);
        stats.record_attempt(RefreshTrigger::Activity);
        stats.record_success();
        stats.record_skip();
        assert_eq!(
            stats.snapshot(),
            RefreshStatsSnapshot {
                attempts: 2,
                successes: 1,
                failures: 0,
                forced: 1,
                skipped: 1,
            }
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RefreshState::Backoff.to_string(), "backoff");
        assert_eq!(RefreshTrigger::Startup.to_string(), "startup");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Each retry waits at least as long as the one before it.
        #[test]
        fn prop_backoff_is_monotonic(base_ms in 1u64..10_000, n in 1u32..40) {
            let base = Duration::from_millis(base_ms);
            prop_assert!(backoff_delay(base, n + 1) >= backoff_delay(base, n));
            prop_assert!(backoff_delay(base, n) >= base);
        }
    }
}
