//! Leading-plus-trailing throttle.
//!
//! The first call in a window fires immediately. Calls suppressed inside
//! the window collapse into a single trailing call at the window's end. The
//! throttle only decides; the caller owns the trailing timer and reports
//! back through [`Throttle::on_trailing`].

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Handle this call now.
    Fire,
    /// Drop this call. When `arm_trailing` is set the caller must schedule a
    /// trailing check after that delay.
    Suppress { arm_trailing: Option<Duration> },
}

#[derive(Debug, Default)]
struct ThrottleState {
    last_fired: Option<Instant>,
    pending: bool,
    trailing_armed: bool,
}

#[derive(Debug)]
pub struct Throttle {
    window: Duration,
    state: Mutex<ThrottleState>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn on_call(&self, now: Instant) -> ThrottleDecision {
        let mut state = self.state.lock().expect("lock poisoned");
        let elapsed = state.last_fired.map(|last| now.saturating_duration_since(last));

        match elapsed {
            Some(elapsed) if elapsed < self.window => {
                state.pending = true;
                if state.trailing_armed {
                    ThrottleDecision::Suppress { arm_trailing: None }
                } else {
                    state.trailing_armed = true;
                    ThrottleDecision::Suppress {
                        arm_trailing: Some(self.window - elapsed),
                    }
                }
            }
            _ => {
                state.last_fired = Some(now);
                state.pending = false;
                ThrottleDecision::Fire
            }
        }
    }

    /// The trailing timer fired. Returns `true` when a suppressed call is
    /// owed and should be handled now.
    pub fn on_trailing(&self, now: Instant) -> bool {
        let mut state = self.state.lock().expect("lock poisoned");
        state.trailing_armed = false;
        if state.pending {
            state.pending = false;
            state.last_fired = Some(now);
            true
        } else {
            false
        }
    }

    /// Forget all history, e.g. after the trailing timer was cancelled.
    pub fn reset(&self) {
        *self.state.lock().expect("lock poisoned") = ThrottleState::default();
    }
}
