//! Process-wide credential state for one application session.

use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::token::SessionToken;

/// Point-in-time copy of the store contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub current_token: Option<SessionToken>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Holds the current credential plus refresh and activity timestamps.
///
/// Readable by anyone holding a reference. Writes are crate-private: only
/// the refresh operation and the activity handler mutate it.
#[derive(Debug, Default)]
pub struct TokenStore {
    inner: RwLock<TokenSnapshot>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current credential, if a refresh has succeeded.
    pub fn current_token(&self) -> Option<SessionToken> {
        self.inner.read().expect("lock poisoned").current_token.clone()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.inner.read().expect("lock poisoned").last_refresh
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.inner.read().expect("lock poisoned").last_activity
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        self.inner.read().expect("lock poisoned").clone()
    }

    pub(crate) fn record_refresh(&self, token: SessionToken, at: DateTime<Utc>) {
        let mut guard = self.inner.write().expect("lock poisoned");
        guard.current_token = Some(token);
        guard.last_refresh = Some(at);
    }

    pub(crate) fn record_activity(&self, at: DateTime<Utc>) {
        self.inner.write().expect("lock poisoned").last_activity = Some(at);
    }

    pub(crate) fn clear(&self) {
        *self.inner.write().expect("lock poisoned") = TokenSnapshot::default();
    }
}
