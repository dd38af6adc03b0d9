//! In-memory backup storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::instrument;

use super::BackupStorage;
use crate::error::StorageError;

/// Backups held in process memory.
///
/// Clones share the same map. Useful for tests and for sessions that do not
/// need backups to outlive the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackupStorage {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryBackupStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("lock poisoned").is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl BackupStorage for MemoryBackupStorage {
    #[instrument(skip(self))]
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.inner.read().expect("lock poisoned").get(key).cloned())
    }

    #[instrument(skip(self, value))]
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
