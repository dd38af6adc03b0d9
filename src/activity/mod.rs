//! User activity and environment signals.
//!
//! The host publishes [`ActivitySignal`]s into an [`ActivityBus`]; the
//! manager subscribes once at initialization and drops its receiver at
//! teardown.

pub mod throttle;

pub use throttle::{Throttle, ThrottleDecision};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::ActivityConfig;
use crate::error::SubscribeError;

/// Default number of signals buffered per subscriber before it lags.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySignal {
    Pointer,
    Keyboard,
    Scroll,
    Touch,
    /// The application came back to the foreground.
    VisibilityRestored,
    /// The network came back online.
    ConnectivityRestored,
}

impl ActivitySignal {
    /// Direct user interaction. These are throttled; environment signals
    /// are not.
    pub fn is_interaction(&self) -> bool {
        matches!(
            self,
            ActivitySignal::Pointer
                | ActivitySignal::Keyboard
                | ActivitySignal::Scroll
                | ActivitySignal::Touch
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivitySignal::Pointer => "pointer",
            ActivitySignal::Keyboard => "keyboard",
            ActivitySignal::Scroll => "scroll",
            ActivitySignal::Touch => "touch",
            ActivitySignal::VisibilityRestored => "visibility_restored",
            ActivitySignal::ConnectivityRestored => "connectivity_restored",
        }
    }
}

impl std::fmt::Display for ActivitySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the manager can listen to for activity.
pub trait ActivitySource: Send + Sync {
    fn subscribe(&self) -> Result<broadcast::Receiver<ActivitySignal>, SubscribeError>;
}

impl<T: ActivitySource + ?Sized> ActivitySource for Arc<T> {
    fn subscribe(&self) -> Result<broadcast::Receiver<ActivitySignal>, SubscribeError> {
        (**self).subscribe()
    }
}

/// Broadcast fan-out of activity signals.
#[derive(Debug, Clone)]
pub struct ActivityBus {
    tx: broadcast::Sender<ActivitySignal>,
}

impl ActivityBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// A bus sized by `[activity] bus_capacity`.
    pub fn from_config(config: &ActivityConfig) -> Self {
        Self::new(config.bus_capacity)
    }

    /// Publish a signal. Returns how many listeners received it; zero when
    /// nobody is attached.
    pub fn publish(&self, signal: ActivitySignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ActivityBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl ActivitySource for ActivityBus {
    fn subscribe(&self) -> Result<broadcast::Receiver<ActivitySignal>, SubscribeError> {
        Ok(self.tx.subscribe())
    }
}
