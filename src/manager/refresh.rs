//! The refresh operation, its retry path and the periodic cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::SessionManager;
use crate::error::{RefreshError, SchedulerError, TokenError};
use crate::refresh::{
    RefreshOutcome, RefreshState, RefreshTrigger, SkipReason, backoff_delay,
};
use crate::scheduler::{RepeatingTask, Task, TimerKind};
use crate::token::{SessionToken, validate_structure};

/// Clears the in-flight flag when the attempt ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SessionManager {
    /// Fetch, validate and store the current credential.
    ///
    /// Skips without side effects while the failure handler is active, while
    /// the manager is inert or torn down, and while another refresh is
    /// running. Errors enter the backoff path; once retries are exhausted
    /// the failure handler is invoked.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> RefreshOutcome {
        if let Some(reason) = self.skip_reason() {
            debug!(trigger = %trigger, ?reason, "Refresh skipped");
            self.stats.record_skip();
            return RefreshOutcome::Skipped(reason);
        }
        if self
            .refresh_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(trigger = %trigger, "Refresh already in flight");
            self.stats.record_skip();
            return RefreshOutcome::Skipped(SkipReason::AlreadyInFlight);
        }

        let result = {
            let _in_flight = InFlight(&self.refresh_in_flight);
            self.stats.record_attempt(trigger);
            self.set_refresh_state(RefreshState::Refreshing);
            self.fetch_credential().await
        };

        match result {
            Ok(token) => {
                let remaining_secs = token.remaining_secs(self.clock.now());
                self.store.record_refresh(token, self.clock.now());
                self.retry_count.store(0, Ordering::SeqCst);
                self.set_refresh_state(RefreshState::Idle);
                self.stats.record_success();
                debug!(trigger = %trigger, remaining_secs, "Credential refreshed");
                RefreshOutcome::Refreshed
            }
            Err(e) => self.on_refresh_error(trigger, e).await,
        }
    }

    /// Install the periodic refresh timer, replacing any existing one.
    pub fn start_refresh_cycle(&self) -> Result<(), SchedulerError> {
        let weak = self.weak_self.clone();
        let tick: RepeatingTask = Arc::new(move || -> Task {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(manager) = weak.upgrade() {
                    manager.refresh(RefreshTrigger::Cycle).await;
                }
            })
        });
        let period = self.config.refresh.interval();
        self.timers
            .install_repeating(TimerKind::RefreshCycle, period, tick)?;
        info!(period_secs = period.as_secs(), "Refresh cycle started");
        Ok(())
    }

    fn skip_reason(&self) -> Option<SkipReason> {
        if self.failure_in_progress.load(Ordering::SeqCst) {
            Some(SkipReason::FailureInProgress)
        } else if !self.is_active() {
            Some(SkipReason::Inactive)
        } else {
            None
        }
    }

    async fn fetch_credential(&self) -> Result<SessionToken, RefreshError> {
        let session = self
            .provider
            .current_session()
            .await?
            .ok_or(RefreshError::NoSession)?;
        validate_structure(session.credential.as_deref())?;
        let credential = session.credential.ok_or(TokenError::Absent)?;
        let token = SessionToken::parse(credential)?;

        let remaining_secs = token.remaining_secs(self.clock.now());
        if remaining_secs >= self.config.refresh.buffer_secs {
            return Ok(token);
        }

        debug!(remaining_secs, "Credential near expiry, fetching again");
        match self.provider.current_session().await {
            Ok(Some(fresh)) => match fresh.credential {
                Some(raw) if raw != token.as_str() => match SessionToken::parse(raw) {
                    Ok(fresh) => Ok(fresh),
                    Err(e) => {
                        warn!(error = %e, "Re-fetched credential is malformed, keeping the current one");
                        Ok(token)
                    }
                },
                _ => Ok(token),
            },
            Ok(None) => Ok(token),
            Err(e) => {
                warn!(error = %e, "Re-fetch failed, keeping the current credential");
                Ok(token)
            }
        }
    }

    async fn on_refresh_error(&self, trigger: RefreshTrigger, err: RefreshError) -> RefreshOutcome {
        self.stats.record_failure();
        if self.failure_in_progress.load(Ordering::SeqCst) {
            debug!(trigger = %trigger, error = %err, "Refresh failed during failure handling");
            return RefreshOutcome::Skipped(SkipReason::FailureInProgress);
        }

        let attempt = self.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
        let max_retries = self.config.refresh.max_retries;

        if attempt < max_retries && self.is_active() {
            let delay = backoff_delay(self.config.refresh.backoff_base(), attempt);
            match self.schedule_retry(delay) {
                Ok(()) => {
                    self.set_refresh_state(RefreshState::Backoff);
                    warn!(
                        trigger = %trigger,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Refresh failed, retry scheduled"
                    );
                    return RefreshOutcome::RetryScheduled { attempt, delay };
                }
                Err(e) => {
                    error!(error = %e, "Could not schedule refresh retry");
                }
            }
        }

        self.set_refresh_state(RefreshState::Failed);
        let err = RefreshError::MaxRetriesExceeded {
            attempts: attempt,
            last: Box::new(err),
        };
        error!(trigger = %trigger, error = %err, "Refresh retries exhausted");
        self.handle_failure(&err).await;
        RefreshOutcome::Failed(err)
    }

    fn schedule_retry(&self, delay: Duration) -> Result<(), SchedulerError> {
        let weak = self.weak_self.clone();
        let task: Task = Box::pin(async move {
            if let Some(manager) = weak.upgrade() {
                manager.refresh(RefreshTrigger::Retry).await;
            }
        });
        self.timers
            .install_once(TimerKind::BackoffRetry, delay, task)
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{Harness, token_expiring_in};
    use super::*;
    use crate::clock::Clock;
    use crate::error::SessionError;
    use crate::scheduler::Scheduler;
    use crate::session::Session;

    #[tokio::test(start_paused = true)]
    async fn test_success_writes_store_and_resets_counter() {
        let h = Harness::new();
        h.provider.push(Ok(Some(Session::with_credential(token_expiring_in(&h, 3600)))));
        h.manager.retry_count.store(2, Ordering::SeqCst);

        let outcome = h.manager.refresh(RefreshTrigger::Cycle).await;
        assert!(outcome.is_refreshed());
        assert_eq!(h.manager.retry_count(), 0);
        assert_eq!(h.manager.refresh_state(), RefreshState::Idle);
        assert_eq!(h.manager.store().last_refresh(), Some(h.clock.now()));
        assert!(h.manager.store().current_token().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_session_schedules_backoff() {
        let h = Harness::new();
        h.provider.push(Ok(None));

        let outcome = h.manager.refresh(RefreshTrigger::Cycle).await;
        match outcome {
            RefreshOutcome::RetryScheduled { attempt, delay } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_millis(1000));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(h.manager.refresh_state(), RefreshState::Backoff);
        assert!(h.manager.has_timer(TimerKind::BackoffRetry));
        assert!(h.manager.store().current_token().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_credential_enters_retry_path() {
        let h = Harness::new();
        h.provider.push(Ok(Some(Session::with_credential("not-a-token"))));

        let outcome = h.manager.refresh(RefreshTrigger::Cycle).await;
        assert!(matches!(outcome, RefreshOutcome::RetryScheduled { attempt: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_enters_retry_path() {
        let h = Harness::new();
        h.provider
            .push(Err(SessionError::Unavailable("offline".into())));

        let outcome = h.manager.refresh(RefreshTrigger::Connectivity).await;
        assert!(matches!(outcome, RefreshOutcome::RetryScheduled { attempt: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_near_expiry_prefers_refetched_credential() {
        let h = Harness::new();
        let stale = token_expiring_in(&h, 120);
        let fresh = token_expiring_in(&h, 3600);
        h.provider.push(Ok(Some(Session::with_credential(stale))));
        h.provider.push(Ok(Some(Session::with_credential(fresh.clone()))));

        assert!(h.manager.refresh(RefreshTrigger::Cycle).await.is_refreshed());
        assert_eq!(h.provider.calls(), 2);
        assert_eq!(h.manager.store().current_token().unwrap().as_str(), fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_near_expiry_ignores_malformed_refetch() {
        let h = Harness::new();
        let stale = token_expiring_in(&h, 120);
        h.provider.push(Ok(Some(Session::with_credential(stale.clone()))));
        h.provider.push(Ok(Some(Session::with_credential("x.y"))));

        assert!(h.manager.refresh(RefreshTrigger::Cycle).await.is_refreshed());
        assert_eq!(h.manager.store().current_token().unwrap().as_str(), stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_far_from_expiry_fetches_once() {
        let h = Harness::new();
        h.provider.push(Ok(Some(Session::with_credential(token_expiring_in(&h, 900)))));

        assert!(h.manager.refresh(RefreshTrigger::Cycle).await.is_refreshed());
        assert_eq!(h.provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_while_failure_in_progress() {
        let h = Harness::new();
        h.manager.failure_in_progress.store(true, Ordering::SeqCst);

        let outcome = h.manager.refresh(RefreshTrigger::Activity).await;
        assert!(matches!(
            outcome,
            RefreshOutcome::Skipped(SkipReason::FailureInProgress)
        ));
        assert_eq!(h.provider.calls(), 0);
        assert_eq!(h.manager.refresh_state(), RefreshState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refresh_is_rejected() {
        let h = Harness::new();
        h.provider.set_latency(Duration::from_millis(500));
        h.provider.push(Ok(Some(Session::with_credential(token_expiring_in(&h, 3600)))));

        let (first, second) = tokio::join!(
            h.manager.refresh(RefreshTrigger::Cycle),
            h.manager.refresh(RefreshTrigger::Activity),
        );
        assert!(first.is_refreshed());
        assert!(matches!(
            second,
            RefreshOutcome::Skipped(SkipReason::AlreadyInFlight)
        ));
        assert_eq!(h.provider.calls(), 1);
        assert_eq!(h.manager.stats().skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_invokes_failure_handler() {
        let h = Harness::new();
        h.manager.retry_count.store(2, Ordering::SeqCst);
        h.provider.push(Ok(None));

        let outcome = h.manager.refresh(RefreshTrigger::Retry).await;
        match outcome {
            RefreshOutcome::Failed(RefreshError::MaxRetriesExceeded { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, RefreshError::NoSession));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(h.manager.refresh_state(), RefreshState::Failed);
        assert!(h.manager.is_failure_in_progress());
        assert_eq!(h.cleanup.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_cycle_twice_keeps_one_timer() {
        let h = Harness::new();
        h.manager.start_refresh_cycle().unwrap();
        assert_eq!(h.scheduler.cancels(), 0);

        h.manager.start_refresh_cycle().unwrap();
        assert_eq!(h.scheduler.cancels(), 1);
        assert_eq!(h.scheduler.active_count(), 1);
    }
}
