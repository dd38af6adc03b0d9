//! The session manager: one per application session.
//!
//! Owns the token store, every timer, the activity listener and the
//! single-flight flags. Timers and the listener hold a `Weak` back-reference
//! so dropping the last `Arc<SessionManager>` stops everything.

mod activity;
mod failure;
mod lifecycle;
mod refresh;

pub use failure::SESSION_EXPIRED_MESSAGE;
pub use lifecycle::SYSTEM_ERROR_MESSAGE;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::activity::{ActivitySource, Throttle};
use crate::autosave::{AutoSaveEngine, BackupStorage};
use crate::clock::Clock;
use crate::collaborators::{EditorStateAccessor, Navigator, Notifier, SessionCleanup};
use crate::config::Config;
use crate::refresh::{RefreshState, RefreshStats, RefreshStatsSnapshot};
use crate::scheduler::{Scheduler, TimerKind, TimerSlots};
use crate::session::{SessionProvider, TokenStore};

/// Everything the manager needs from its host.
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn SessionProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub editor: Arc<dyn EditorStateAccessor>,
    pub cleanup: Arc<dyn SessionCleanup>,
    pub navigator: Arc<dyn Navigator>,
    pub activity: Arc<dyn ActivitySource>,
    pub storage: Arc<dyn BackupStorage>,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn Clock>,
}

/// Where the manager is in its own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Initializing,
    Running,
    /// Initialization gave up; nothing runs until the next launch.
    Inert,
    TornDown,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Running => "running",
            LifecycleState::Inert => "inert",
            LifecycleState::TornDown => "torn_down",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct SessionManager {
    config: Config,
    provider: Arc<dyn SessionProvider>,
    notifier: Arc<dyn Notifier>,
    cleanup: Arc<dyn SessionCleanup>,
    navigator: Arc<dyn Navigator>,
    activity_source: Arc<dyn ActivitySource>,
    clock: Arc<dyn Clock>,

    store: Arc<TokenStore>,
    autosave: Arc<AutoSaveEngine>,
    timers: TimerSlots,
    throttle: Throttle,

    failure_in_progress: AtomicBool,
    refresh_in_flight: AtomicBool,
    retry_count: AtomicU32,
    refresh_state: Mutex<RefreshState>,
    lifecycle: Mutex<LifecycleState>,
    listener: Mutex<Option<JoinHandle<()>>>,
    stats: RefreshStats,

    weak_self: Weak<SessionManager>,
}

impl SessionManager {
    /// Wire collaborators. Nothing runs until [`launch`](Self::launch).
    pub fn new(config: Config, collaborators: Collaborators) -> Arc<Self> {
        let Collaborators {
            provider,
            notifier,
            editor,
            cleanup,
            navigator,
            activity,
            storage,
            scheduler,
            clock,
        } = collaborators;

        let autosave = Arc::new(AutoSaveEngine::new(storage, editor, Arc::clone(&clock)));
        let throttle = Throttle::new(config.activity.throttle());

        Arc::new_cyclic(|weak_self| Self {
            config,
            provider,
            notifier,
            cleanup,
            navigator,
            activity_source: activity,
            clock,
            store: Arc::new(TokenStore::new()),
            autosave,
            timers: TimerSlots::new(scheduler),
            throttle,
            failure_in_progress: AtomicBool::new(false),
            refresh_in_flight: AtomicBool::new(false),
            retry_count: AtomicU32::new(0),
            refresh_state: Mutex::new(RefreshState::Idle),
            lifecycle: Mutex::new(LifecycleState::Created),
            listener: Mutex::new(None),
            stats: RefreshStats::default(),
            weak_self: weak_self.clone(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared, read-only view of the current credential.
    pub fn store(&self) -> Arc<TokenStore> {
        Arc::clone(&self.store)
    }

    /// The backup engine, e.g. to read a snapshot back after a crash.
    pub fn autosave(&self) -> &AutoSaveEngine {
        &self.autosave
    }

    pub fn refresh_state(&self) -> RefreshState {
        *self.refresh_state.lock().expect("lock poisoned")
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        *self.lifecycle.lock().expect("lock poisoned")
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    pub fn is_failure_in_progress(&self) -> bool {
        self.failure_in_progress.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> RefreshStatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether a timer currently occupies `kind`.
    pub fn has_timer(&self, kind: TimerKind) -> bool {
        self.timers.is_installed(kind)
    }

    // -- internal state helpers --

    fn set_refresh_state(&self, state: RefreshState) {
        *self.refresh_state.lock().expect("lock poisoned") = state;
    }

    fn set_lifecycle(&self, state: LifecycleState) -> LifecycleState {
        std::mem::replace(&mut *self.lifecycle.lock().expect("lock poisoned"), state)
    }

    fn is_active(&self) -> bool {
        !matches!(
            self.lifecycle_state(),
            LifecycleState::Inert | LifecycleState::TornDown
        )
    }

    fn is_torn_down(&self) -> bool {
        self.lifecycle_state() == LifecycleState::TornDown
    }

    fn cancel_all_timers(&self) -> usize {
        let cancelled = self.timers.cancel_all();
        self.throttle.reset();
        cancelled
    }

    fn detach_listener(&self) {
        if let Some(listener) = self.listener.lock().expect("lock poisoned").take() {
            listener.abort();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(listener) = listener.take() {
                listener.abort();
            }
        }
        self.timers.cancel_all();
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("lifecycle", &self.lifecycle_state())
            .field("refresh_state", &self.refresh_state())
            .field("retry_count", &self.retry_count())
            .field("failure_in_progress", &self.is_failure_in_progress())
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}
