//! Host-side services the manager depends on but does not implement.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CleanupError, SurfaceError};

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
}

/// Action the user is offered alongside a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    /// Sign in again.
    Reauthenticate,
    /// Reload the application.
    Refresh,
}

impl NotificationAction {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationAction::Reauthenticate => "Sign in again",
            NotificationAction::Refresh => "Refresh",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyOptions {
    pub action: Option<NotificationAction>,
}

/// Fire-and-forget user notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotificationKind, message: &str, options: NotifyOptions);
}

// ---------------------------------------------------------------------------
// Editor state
// ---------------------------------------------------------------------------

/// An editing surface whose state can be captured as a string.
pub trait EditableSurface: Send + Sync {
    fn serialize(&self) -> Result<String, SurfaceError>;
}

/// Read access to the editor's current context, queried on every auto-save
/// tick.
pub trait EditorStateAccessor: Send + Sync {
    fn active_design_id(&self) -> Option<String>;
    fn active_canvas(&self) -> Option<Arc<dyn EditableSurface>>;
}

// ---------------------------------------------------------------------------
// Cleanup and navigation
// ---------------------------------------------------------------------------

/// Session cleanup hooks owned by the host.
#[async_trait]
pub trait SessionCleanup: Send + Sync {
    /// Whether leftovers from a previous, improperly ended session exist.
    fn check_for_stale_session(&self) -> bool;

    /// Purge local session artifacts.
    async fn emergency_cleanup(&self) -> Result<(), CleanupError>;
}

/// Hard navigation, used when a regular sign-out fails.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}

/// Cleanup that never finds anything to clean.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCleanup;

#[async_trait]
impl SessionCleanup for NoopCleanup {
    fn check_for_stale_session(&self) -> bool {
        false
    }

    async fn emergency_cleanup(&self) -> Result<(), CleanupError> {
        Ok(())
    }
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NotificationKind, message: &str, options: NotifyOptions) {
        let action = options.action.map(|a| a.label());
        match kind {
            NotificationKind::Error => tracing::error!(?action, "{message}"),
            NotificationKind::Warning => tracing::warn!(?action, "{message}"),
            NotificationKind::Info => tracing::info!(?action, "{message}"),
        }
    }
}
