//! The single recovery path for an unrecoverable session.

use std::sync::atomic::Ordering;

use tracing::{error, info, warn};

use super::SessionManager;
use crate::collaborators::{NotificationAction, NotificationKind, NotifyOptions};
use crate::error::{RefreshError, SchedulerError};
use crate::scheduler::{Task, TimerKind};
use crate::session::SignOutOptions;

/// Shown when refresh retries are exhausted.
pub const SESSION_EXPIRED_MESSAGE: &str =
    "Your session has expired. Please sign in again to continue.";

impl SessionManager {
    /// Tear the session down after an unrecoverable refresh failure.
    ///
    /// Single-flight: returns `false` without doing anything if a failure
    /// sequence already ran. The flag stays set until teardown.
    pub async fn handle_failure(&self, reason: &RefreshError) -> bool {
        if self
            .failure_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(error = %reason, "Failure handling already in progress");
            return false;
        }

        error!(error = %reason, "Session failure, starting recovery");
        let cancelled = self.cancel_all_timers();
        info!(cancelled, "Timers cancelled");

        if let Err(e) = self.cleanup.emergency_cleanup().await {
            error!(error = %e, "Emergency cleanup failed, continuing recovery");
        }
        if self.is_torn_down() {
            info!("Torn down during emergency cleanup, skipping sign-out");
            return true;
        }

        self.notifier.notify(
            NotificationKind::Error,
            SESSION_EXPIRED_MESSAGE,
            NotifyOptions {
                action: Some(NotificationAction::Reauthenticate),
            },
        );

        if let Err(e) = self.schedule_sign_out() {
            warn!(error = %e, "Could not schedule sign-out, signing out now");
            self.sign_out().await;
        }
        true
    }

    fn schedule_sign_out(&self) -> Result<(), SchedulerError> {
        let weak = self.weak_self.clone();
        let task: Task = Box::pin(async move {
            if let Some(manager) = weak.upgrade() {
                manager.sign_out().await;
            }
        });
        let grace = self.config.failure.sign_out_grace();
        self.timers
            .install_once(TimerKind::ForcedSignOut, grace, task)?;
        info!(grace_ms = grace.as_millis() as u64, "Forced sign-out scheduled");
        Ok(())
    }

    /// End the session, falling back to a hard navigation if that fails.
    async fn sign_out(&self) {
        let target = &self.config.failure.safe_entry_point;
        let options = SignOutOptions {
            callback_url: target.clone(),
            redirect: true,
        };
        match self.provider.end_session(options).await {
            Ok(()) => info!("Signed out"),
            Err(e) => {
                error!(error = %e, target = %target, "Sign-out failed, navigating away");
                self.navigator.navigate(target);
            }
        }
    }
}
