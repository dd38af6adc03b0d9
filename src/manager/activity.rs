//! Reacting to user activity and environment changes.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::SessionManager;
use crate::activity::{ActivitySignal, ThrottleDecision};
use crate::refresh::{RefreshOutcome, RefreshTrigger};
use crate::scheduler::{Task, TimerKind};
use crate::token::SessionToken;

impl SessionManager {
    /// Route one signal from the activity source.
    ///
    /// Interaction signals pass through the throttle. Visibility and
    /// connectivity signals mark activity and force a refresh directly.
    pub async fn handle_signal(&self, signal: ActivitySignal) {
        trace!(signal = %signal, "Activity signal");

        if signal.is_interaction() {
            match self.throttle.on_call(Instant::now()) {
                ThrottleDecision::Fire => {
                    self.handle_activity().await;
                }
                ThrottleDecision::Suppress {
                    arm_trailing: Some(delay),
                } => self.arm_trailing(delay),
                ThrottleDecision::Suppress { arm_trailing: None } => {}
            }
            return;
        }

        let trigger = match signal {
            ActivitySignal::VisibilityRestored => RefreshTrigger::Visibility,
            _ => RefreshTrigger::Connectivity,
        };
        self.store.record_activity(self.clock.now());
        self.refresh(trigger).await;
    }

    /// One handled occurrence of user activity.
    ///
    /// Without a session this does nothing. Otherwise it records the
    /// activity and forces a refresh when the credential is close to expiry;
    /// the refresh outcome is returned in that case.
    pub async fn handle_activity(&self) -> Option<RefreshOutcome> {
        let session = match self.provider.current_session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                trace!("Activity without a session");
                return None;
            }
            Err(e) => {
                debug!(error = %e, "Session lookup failed during activity");
                return None;
            }
        };

        let now = self.clock.now();
        self.store.record_activity(now);

        let token = match session.credential.map(SessionToken::parse) {
            Some(Ok(token)) => token,
            Some(Err(e)) => {
                debug!(error = %e, "Ignoring activity expiry check for malformed credential");
                return None;
            }
            None => return None,
        };

        let remaining_secs = token.remaining_secs(now);
        if remaining_secs < self.config.activity.expiry_threshold_secs {
            debug!(remaining_secs, "Credential close to expiry, forcing refresh");
            Some(self.refresh(RefreshTrigger::Activity).await)
        } else {
            None
        }
    }

    fn arm_trailing(&self, delay: Duration) {
        let weak = self.weak_self.clone();
        let task: Task = Box::pin(async move {
            let Some(manager) = weak.upgrade() else {
                return;
            };
            if manager.throttle.on_trailing(Instant::now()) {
                manager.handle_activity().await;
            }
        });
        if let Err(e) = self
            .timers
            .install_once(TimerKind::ThrottleTrailing, delay, task)
        {
            warn!(error = %e, "Could not arm trailing activity check");
            self.throttle.reset();
        }
    }
}
