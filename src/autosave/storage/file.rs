//! File-based backup storage.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::instrument;

use super::BackupStorage;
use crate::error::StorageError;

/// Owner read/write (Unix only).
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Owner read/write/execute (Unix only).
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Longest file stem written, leaving room for the `.json`/`.tmp` suffix.
const MAX_STEM_LEN: usize = 250;

/// Prefix of encoded stems. Never produced by a plain key.
const ENCODED_PREFIX: char = '~';

/// Map a key onto a file stem that stays inside the storage directory.
///
/// Keys made only of ASCII alphanumerics, `-` and `_` are used as-is.
/// Anything else is base64url encoded behind [`ENCODED_PREFIX`]. `None`
/// for empty keys and keys too long to fit a file name.
fn file_stem(key: &str) -> Option<String> {
    if key.is_empty() {
        return None;
    }
    let plain = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    let stem = if plain {
        key.to_string()
    } else {
        format!("{ENCODED_PREFIX}{}", URL_SAFE_NO_PAD.encode(key))
    };
    (stem.len() <= MAX_STEM_LEN).then_some(stem)
}

/// One file per key: `{dir}/{key}.json`, with unusual keys encoded.
///
/// Writes go to a temp file that is renamed over the target, so a crash
/// mid-write leaves the previous backup intact. Backups may contain user
/// content, so files are created 0600 and the directory 0700 on Unix.
#[derive(Debug, Clone)]
pub struct FileBackupStorage {
    dir: PathBuf,
}

impl FileBackupStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let stem = file_stem(key).ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        Ok(self.dir.join(format!("{stem}.json")))
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        if self.dir.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(DIR_MODE))?;
        }
        Ok(())
    }
}

impl BackupStorage for FileBackupStorage {
    #[instrument(skip(self))]
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.key_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, value))]
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.key_path(key)?;
        self.ensure_dir()?;
        let temp_path = path.with_extension("tmp");

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(FILE_MODE)
                .open(&temp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }

        #[cfg(not(unix))]
        std::fs::write(&temp_path, value)?;

        if let Err(e) = std::fs::rename(&temp_path, &path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(StorageError::Backend(format!(
                "Failed to rename '{}' to '{}': {}",
                temp_path.display(),
                path.display(),
                e
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}
