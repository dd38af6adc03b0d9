//! Client-side session credential lifecycle management.
//!
//! A [`SessionManager`] keeps a session credential fresh: it refreshes on a
//! fixed cycle and on user activity, backs off and retries on failure,
//! signs the user out through a single recovery path when retries run out,
//! and periodically backs up the active design to local storage.

pub mod activity;
pub mod autosave;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod manager;
pub mod refresh;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod token;

pub use activity::{ActivityBus, ActivitySignal, ActivitySource};
pub use autosave::{
    AutoSaveEngine, BackupSnapshot, BackupStorage, FileBackupStorage, MemoryBackupStorage,
};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use error::{InitError, RefreshError};
pub use manager::{Collaborators, LifecycleState, SessionManager};
pub use refresh::{RefreshOutcome, RefreshState, RefreshTrigger};
pub use scheduler::{Scheduler, TokioScheduler};
pub use session::{Session, SessionProvider, SignOutOptions, TokenStore};
pub use token::{SessionToken, is_valid_token};
