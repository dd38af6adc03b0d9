//! Timer abstraction and the manager's named timer slots.
//!
//! Every timer the manager owns lives in exactly one [`TimerKind`] slot.
//! Installing into an occupied slot cancels the previous handle first, so a
//! slot never holds two live timers.

pub mod runtime;

pub use runtime::TokioScheduler;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::SchedulerError;

/// A one-shot unit of work.
pub type Task = BoxFuture<'static, ()>;

/// Produces a fresh future for every firing of a repeating timer.
pub type RepeatingTask = Arc<dyn Fn() -> Task + Send + Sync>;

/// Opaque handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub(crate) u64);

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Runs work after a delay or on a fixed period.
///
/// Cancelling stops future firings. A firing whose body has already started
/// is detached from its handle and runs to completion.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule_once(&self, delay: Duration, task: Task) -> Result<TaskHandle, SchedulerError>;

    /// Run a fresh future from `task` every `period`, first firing one
    /// period from now.
    fn schedule_repeating(
        &self,
        period: Duration,
        task: RepeatingTask,
    ) -> Result<TaskHandle, SchedulerError>;

    /// Cancel a timer. Returns `false` if it had already fired or was
    /// cancelled before.
    fn cancel(&self, handle: TaskHandle) -> bool;

    /// Timers still waiting to fire (repeating timers count until cancelled).
    fn active_count(&self) -> usize;
}

impl<T: Scheduler + ?Sized> Scheduler for Arc<T> {
    fn schedule_once(&self, delay: Duration, task: Task) -> Result<TaskHandle, SchedulerError> {
        (**self).schedule_once(delay, task)
    }
    fn schedule_repeating(
        &self,
        period: Duration,
        task: RepeatingTask,
    ) -> Result<TaskHandle, SchedulerError> {
        (**self).schedule_repeating(period, task)
    }
    fn cancel(&self, handle: TaskHandle) -> bool {
        (**self).cancel(handle)
    }
    fn active_count(&self) -> usize {
        (**self).active_count()
    }
}

// ---------------------------------------------------------------------------
// Timer slots
// ---------------------------------------------------------------------------

/// The named timers a manager may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    RefreshCycle,
    AutoSave,
    BackoffRetry,
    ForcedSignOut,
    ThrottleTrailing,
}

impl TimerKind {
    pub const ALL: [TimerKind; 5] = [
        TimerKind::RefreshCycle,
        TimerKind::AutoSave,
        TimerKind::BackoffRetry,
        TimerKind::ForcedSignOut,
        TimerKind::ThrottleTrailing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::RefreshCycle => "refresh_cycle",
            TimerKind::AutoSave => "auto_save",
            TimerKind::BackoffRetry => "backoff_retry",
            TimerKind::ForcedSignOut => "forced_sign_out",
            TimerKind::ThrottleTrailing => "throttle_trailing",
        }
    }
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// At most one handle per [`TimerKind`].
pub struct TimerSlots {
    scheduler: Arc<dyn Scheduler>,
    slots: Mutex<HashMap<TimerKind, TaskHandle>>,
}

impl TimerSlots {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Cancel whatever occupies `kind`, then schedule `task` once into it.
    pub fn install_once(
        &self,
        kind: TimerKind,
        delay: Duration,
        task: Task,
    ) -> Result<TaskHandle, SchedulerError> {
        let mut slots = self.slots.lock().expect("lock poisoned");
        self.evict(&mut slots, kind);
        let handle = self.scheduler.schedule_once(delay, task)?;
        slots.insert(kind, handle);
        tracing::trace!(timer = %kind, delay_ms = delay.as_millis() as u64, "Timer installed");
        Ok(handle)
    }

    /// Cancel whatever occupies `kind`, then schedule `task` repeatedly into it.
    pub fn install_repeating(
        &self,
        kind: TimerKind,
        period: Duration,
        task: RepeatingTask,
    ) -> Result<TaskHandle, SchedulerError> {
        let mut slots = self.slots.lock().expect("lock poisoned");
        self.evict(&mut slots, kind);
        let handle = self.scheduler.schedule_repeating(period, task)?;
        slots.insert(kind, handle);
        tracing::trace!(timer = %kind, period_ms = period.as_millis() as u64, "Repeating timer installed");
        Ok(handle)
    }

    /// Cancel the timer in `kind`, if any.
    pub fn cancel(&self, kind: TimerKind) -> bool {
        let mut slots = self.slots.lock().expect("lock poisoned");
        self.evict(&mut slots, kind)
    }

    /// Cancel every slot. Returns how many slots were occupied.
    pub fn cancel_all(&self) -> usize {
        let mut slots = self.slots.lock().expect("lock poisoned");
        let occupied = slots.len();
        for (kind, handle) in slots.drain() {
            self.scheduler.cancel(handle);
            tracing::trace!(timer = %kind, "Timer cancelled");
        }
        occupied
    }

    /// The handle most recently installed in `kind`. A one-shot timer keeps
    /// its handle here after firing until the slot is reused or cancelled.
    pub fn handle(&self, kind: TimerKind) -> Option<TaskHandle> {
        self.slots.lock().expect("lock poisoned").get(&kind).copied()
    }

    pub fn is_installed(&self, kind: TimerKind) -> bool {
        self.handle(kind).is_some()
    }

    fn evict(&self, slots: &mut HashMap<TimerKind, TaskHandle>, kind: TimerKind) -> bool {
        match slots.remove(&kind) {
            Some(prior) => {
                self.scheduler.cancel(prior);
                tracing::trace!(timer = %kind, "Timer replaced");
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for TimerSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.lock().expect("lock poisoned");
        f.debug_struct("TimerSlots").field("slots", &*slots).finish()
    }
}
