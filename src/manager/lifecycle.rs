//! Initialization with retry, and teardown.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{LifecycleState, SessionManager};
use crate::activity::ActivitySignal;
use crate::collaborators::{NotificationAction, NotificationKind, NotifyOptions};
use crate::error::{InitError, SchedulerError};
use crate::refresh::{RefreshState, RefreshTrigger};
use crate::scheduler::{RepeatingTask, Task, TimerKind};

/// Shown when initialization gives up.
pub const SYSTEM_ERROR_MESSAGE: &str =
    "Session services could not be started. Refresh the page to try again.";

impl SessionManager {
    /// Initialize the manager and issue the startup refresh.
    ///
    /// Initialization is retried with a linear delay (`attempt * base`) up
    /// to the configured number of attempts. When every attempt fails the
    /// manager cancels its timers, tells the user, and stays inert.
    pub async fn launch(&self) -> Result<(), InitError> {
        if self.lifecycle_state() == LifecycleState::Running {
            debug!("Session manager already running");
            return Ok(());
        }
        self.set_lifecycle(LifecycleState::Initializing);

        let attempts = self.config.lifecycle.init_attempts.max(1);
        let base = self.config.lifecycle.init_retry_base();
        let mut attempt = 1;

        let last = loop {
            if self.is_torn_down() {
                info!(attempt, "Torn down during initialization, giving up");
                return Err(InitError::TornDown);
            }
            match self.initialize().await {
                Ok(()) if self.is_torn_down() => {
                    self.cancel_all_timers();
                    self.detach_listener();
                    info!(attempt, "Torn down during initialization, giving up");
                    return Err(InitError::TornDown);
                }
                Ok(()) => {
                    self.set_lifecycle(LifecycleState::Running);
                    info!(attempt, "Session manager running");
                    self.refresh(RefreshTrigger::Startup).await;
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Initialization failed");
                    self.cancel_all_timers();
                    self.detach_listener();
                    if attempt >= attempts {
                        break e;
                    }
                    tokio::time::sleep(base.saturating_mul(attempt)).await;
                    attempt += 1;
                }
            }
        };

        if self.is_torn_down() {
            return Err(InitError::TornDown);
        }
        self.set_lifecycle(LifecycleState::Inert);
        self.notifier.notify(
            NotificationKind::Error,
            SYSTEM_ERROR_MESSAGE,
            NotifyOptions {
                action: Some(NotificationAction::Refresh),
            },
        );
        let err = InitError::InitializationFailure {
            attempts,
            last: Box::new(last),
        };
        error!(error = %err, "Session manager is inert");
        Err(err)
    }

    /// Stop everything and forget the session. Safe to call repeatedly.
    pub fn teardown(&self) {
        let cancelled = self.cancel_all_timers();
        self.detach_listener();
        self.failure_in_progress.store(false, Ordering::SeqCst);
        self.retry_count.store(0, Ordering::SeqCst);
        self.set_refresh_state(RefreshState::Idle);
        self.store.clear();

        if self.set_lifecycle(LifecycleState::TornDown) != LifecycleState::TornDown {
            info!(cancelled, "Session manager torn down");
        }
    }

    async fn initialize(&self) -> Result<(), InitError> {
        if self.cleanup.check_for_stale_session() {
            info!("Stale session found, cleaning up before start");
            if let Err(e) = self.cleanup.emergency_cleanup().await {
                warn!(error = %e, "Stale session cleanup failed");
            }
        }

        let rx = self.activity_source.subscribe()?;
        let listener = self.spawn_listener(rx);
        if let Some(previous) = self
            .listener
            .lock()
            .expect("lock poisoned")
            .replace(listener)
        {
            previous.abort();
        }

        if self.config.autosave.enabled {
            self.start_autosave()?;
        }
        self.start_refresh_cycle()?;
        Ok(())
    }

    fn start_autosave(&self) -> Result<(), SchedulerError> {
        let engine = Arc::clone(&self.autosave);
        let tick: RepeatingTask = Arc::new(move || -> Task {
            let engine = Arc::clone(&engine);
            Box::pin(async move { engine.run_tick() })
        });
        let period = self.config.autosave.interval();
        self.timers
            .install_repeating(TimerKind::AutoSave, period, tick)?;
        debug!(period_secs = period.as_secs(), "Auto-save started");
        Ok(())
    }

    fn spawn_listener(&self, mut rx: broadcast::Receiver<ActivitySignal>) -> JoinHandle<()> {
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(signal) => {
                        let Some(manager) = weak.upgrade() else {
                            break;
                        };
                        manager.handle_signal(signal).await;
                    }
                    Err(RecvError::Lagged(dropped)) => {
                        warn!(dropped, "Activity listener lagged, signals dropped");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Activity source closed");
                        break;
                    }
                }
            }
        })
    }
}
