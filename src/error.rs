//! Error types for the session lifecycle.
//!
//! Each concern owns its own enum. Only [`RefreshError::MaxRetriesExceeded`]
//! and [`InitError::InitializationFailure`] ever reach the user, and only
//! through the notifier; everything else is logged where it happens.

/// Structural defects in a session credential.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The credential was not supplied at all.
    #[error("Token is absent")]
    Absent,

    /// Not exactly three non-empty dot-separated segments.
    #[error("Expected 3 non-empty segments, found {0}")]
    Segments(usize),

    /// The payload segment is not valid base64url.
    #[error("Payload is not valid base64url: {0}")]
    Encoding(String),

    /// The decoded payload is not a JSON object.
    #[error("Payload is not a JSON object: {0}")]
    Payload(String),

    /// A required claim is missing from the payload.
    #[error("Payload is missing claim '{0}'")]
    MissingClaim(&'static str),

    /// A timestamp claim is present but not an integer.
    #[error("Claim '{0}' is not an integer timestamp")]
    InvalidClaim(&'static str),
}

/// Failures reported by the session provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The provider could not be reached or answered with an error.
    #[error("Session provider unavailable: {0}")]
    Unavailable(String),

    /// Ending the session failed.
    #[error("Sign-out failed: {0}")]
    SignOut(String),
}

/// Errors on the credential refresh path.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    /// The provider returned no session.
    #[error("No active session")]
    NoSession,

    /// The session credential failed structural validation.
    #[error("Invalid token structure: {0}")]
    InvalidTokenStructure(#[from] TokenError),

    /// The provider call itself failed.
    #[error(transparent)]
    Provider(#[from] SessionError),

    /// Retries are exhausted; the failure handler takes over.
    #[error("Refresh failed after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        attempts: u32,
        last: Box<RefreshError>,
    },
}

/// Errors from the backup key-value storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The key cannot be stored safely by this backend.
    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),

    /// Filesystem failure.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic backend failure.
    #[error("Storage error: {0}")]
    Backend(String),
}

/// Errors on the auto-save path. Never escalated.
#[derive(Debug, thiserror::Error)]
pub enum AutoSaveError {
    /// The editable surface could not be serialized.
    #[error(transparent)]
    Serialize(#[from] SurfaceError),

    /// Reading or writing the snapshot failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The snapshot could not be encoded.
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Raised by an editable surface that cannot produce its serialized state.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Failed to serialize editor state: {0}")]
pub struct SurfaceError(pub String);

/// Errors from the task scheduler.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    /// No async runtime is available to host the task.
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    /// The scheduler refuses new work.
    #[error("Scheduler is shut down")]
    ShutDown,

    /// A repeating task needs a non-zero period.
    #[error("Repeating task period must be non-zero")]
    ZeroPeriod,
}

/// Errors from attaching to an activity source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscribeError {
    /// The source has no publisher left.
    #[error("Activity source is closed")]
    Closed,

    /// Generic failure.
    #[error("{0}")]
    Other(String),
}

/// Errors from the emergency cleanup collaborator.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Emergency cleanup failed: {0}")]
pub struct CleanupError(pub String);

/// Errors during manager initialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InitError {
    /// A timer could not be installed.
    #[error("Failed to schedule timer: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Activity listeners could not be attached.
    #[error("Failed to attach activity listener: {0}")]
    Subscribe(#[from] SubscribeError),

    /// Teardown ran while initialization was still in progress.
    #[error("Torn down during initialization")]
    TornDown,

    /// Every initialization attempt failed; the manager is inert.
    #[error("Initialization failed after {attempts} attempts: {last}")]
    InitializationFailure {
        attempts: u32,
        last: Box<InitError>,
    },
}
