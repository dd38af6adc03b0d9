//! [`Scheduler`] backed by tokio tasks and timers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{RepeatingTask, Scheduler, Task, TaskHandle};
use crate::error::SchedulerError;

type TaskMap = Arc<Mutex<HashMap<u64, JoinHandle<()>>>>;

/// Spawns every timer as a tokio task on the current (or a pinned) runtime.
///
/// One-shot timers drop out of the task map just before their body runs, so
/// cancelling after that point is a no-op and the body completes. Repeating
/// timers spawn each firing as its own task for the same reason.
#[derive(Debug)]
pub struct TokioScheduler {
    runtime: Option<Handle>,
    tasks: TaskMap,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl TokioScheduler {
    /// Use whichever runtime is current when a timer is scheduled.
    pub fn new() -> Self {
        Self {
            runtime: None,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Always spawn onto `handle`.
    pub fn with_handle(handle: Handle) -> Self {
        let mut scheduler = Self::new();
        scheduler.runtime = Some(handle);
        scheduler
    }

    /// Abort every pending timer and refuse further work.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().expect("lock poisoned");
        let count = tasks.len();
        for (_, join) in tasks.drain() {
            join.abort();
        }
        tracing::debug!(count, "Scheduler shut down");
    }

    fn runtime(&self) -> Result<Handle, SchedulerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SchedulerError::ShutDown);
        }
        match &self.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string())),
        }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: Task) -> Result<TaskHandle, SchedulerError> {
        let runtime = self.runtime()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);

        // Hold the map lock across spawn + insert so the task cannot remove
        // its entry before it exists.
        let mut map = self.tasks.lock().expect("lock poisoned");
        let join = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            tasks.lock().expect("lock poisoned").remove(&id);
            task.await;
        });
        map.insert(id, join);

        Ok(TaskHandle(id))
    }

    fn schedule_repeating(
        &self,
        period: Duration,
        task: RepeatingTask,
    ) -> Result<TaskHandle, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }
        let runtime = self.runtime()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let spawner = runtime.clone();
        let join = runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            // Don't burst missed ticks after a stall.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                spawner.spawn(task());
            }
        });
        self.tasks.lock().expect("lock poisoned").insert(id, join);

        Ok(TaskHandle(id))
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        match self.tasks.lock().expect("lock poisoned").remove(&handle.0) {
            Some(join) => {
                join.abort();
                true
            }
            None => false,
        }
    }

    fn active_count(&self) -> usize {
        let mut tasks = self.tasks.lock().expect("lock poisoned");
        tasks.retain(|_, join| !join.is_finished());
        tasks.len()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for (_, join) in tasks.drain() {
                join.abort();
            }
        }
    }
}
