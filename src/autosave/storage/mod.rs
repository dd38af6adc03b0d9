//! Durable key-value storage for backup snapshots.

pub mod file;
pub mod memory;

pub use file::FileBackupStorage;
pub use memory::MemoryBackupStorage;

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StorageError;

/// Synchronous string key-value store.
///
/// Implementations must be thread-safe (`Send + Sync`). Values are opaque
/// strings; the auto-save engine stores JSON snapshots in them.
pub trait BackupStorage: Send + Sync {
    /// Read the value under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Name of this backend, for logs.
    fn name(&self) -> &str;
}

impl<T: BackupStorage + ?Sized> BackupStorage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Build the backend selected in configuration.
pub fn from_config(config: &StorageConfig) -> Arc<dyn BackupStorage> {
    match config.backend {
        StorageBackend::File => Arc::new(FileBackupStorage::new(&config.dir)),
        StorageBackend::Memory => Arc::new(MemoryBackupStorage::new()),
    }
}
