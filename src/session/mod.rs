//! Session provider contract and the shared token store.
//!
//! The provider is the sole source of truth for credential issuance and
//! refresh; the manager only reads sessions from it and asks it to end them.

pub mod store;

pub use store::{TokenSnapshot, TokenStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// A session as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// The session credential. Providers may hand back a session whose
    /// credential has not been populated yet.
    #[serde(default)]
    pub credential: Option<String>,

    /// Any further claims the provider attaches (user, expiry hints, ...).
    #[serde(default, flatten)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

impl Session {
    pub fn with_credential(credential: impl Into<String>) -> Self {
        Self {
            credential: Some(credential.into()),
            claims: serde_json::Map::new(),
        }
    }
}

/// Options passed to [`SessionProvider::end_session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignOutOptions {
    /// Where the host should land once the session has ended.
    pub callback_url: String,
    /// Whether the provider should perform the redirect itself.
    pub redirect: bool,
}

/// Issues, refreshes and ends sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The current session, or `None` when signed out.
    async fn current_session(&self) -> Result<Option<Session>, SessionError>;

    /// End the current session.
    async fn end_session(&self, options: SignOutOptions) -> Result<(), SessionError>;
}

#[async_trait]
impl<T: SessionProvider + ?Sized> SessionProvider for std::sync::Arc<T> {
    async fn current_session(&self) -> Result<Option<Session>, SessionError> {
        (**self).current_session().await
    }
    async fn end_session(&self, options: SignOutOptions) -> Result<(), SessionError> {
        (**self).end_session(options).await
    }
}
