//! Periodic crash-safety backups of the active design.
//!
//! Backups are advisory: they never touch the backend save path, never
//! escalate, and are never deleted here. The host can read one back with
//! [`AutoSaveEngine::load_snapshot`] after a crash.

pub mod storage;

pub use storage::{BackupStorage, FileBackupStorage, MemoryBackupStorage};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::collaborators::EditorStateAccessor;
use crate::error::AutoSaveError;

/// Storage key for a design's backup.
pub fn backup_key(design_id: &str) -> String {
    format!("design_{design_id}_backup")
}

/// One design's persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub design_id: String,
    pub serialized_state: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveOutcome {
    /// No active design or no bound surface.
    NoContext,
    /// The stored snapshot already matches.
    Unchanged,
    /// A new snapshot was written.
    Saved { design_id: String },
}

pub struct AutoSaveEngine {
    storage: Arc<dyn BackupStorage>,
    editor: Arc<dyn EditorStateAccessor>,
    clock: Arc<dyn Clock>,
}

impl AutoSaveEngine {
    pub fn new(
        storage: Arc<dyn BackupStorage>,
        editor: Arc<dyn EditorStateAccessor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            editor,
            clock,
        }
    }

    /// Capture the active design if it changed since the last snapshot.
    pub fn tick(&self) -> Result<AutoSaveOutcome, AutoSaveError> {
        let Some(design_id) = self.editor.active_design_id() else {
            return Ok(AutoSaveOutcome::NoContext);
        };
        let Some(surface) = self.editor.active_canvas() else {
            return Ok(AutoSaveOutcome::NoContext);
        };

        let serialized_state = surface.serialize()?;
        let key = backup_key(&design_id);

        if let Some(stored) = self.read_snapshot(&key)? {
            if stored.serialized_state == serialized_state {
                return Ok(AutoSaveOutcome::Unchanged);
            }
        }

        let snapshot = BackupSnapshot {
            design_id: design_id.clone(),
            serialized_state,
            timestamp: self.clock.now().timestamp_millis(),
        };
        self.storage.set(&key, &serde_json::to_string(&snapshot)?)?;
        debug!(design_id = %design_id, backend = self.storage.name(), "Backup snapshot written");

        Ok(AutoSaveOutcome::Saved { design_id })
    }

    /// [`tick`](Self::tick), with every error logged and swallowed.
    pub fn run_tick(&self) {
        if let Err(e) = self.tick() {
            warn!(error = %e, "Auto-save failed");
        }
    }

    /// The stored snapshot for `design_id`, if a readable one exists.
    pub fn load_snapshot(&self, design_id: &str) -> Result<Option<BackupSnapshot>, AutoSaveError> {
        self.read_snapshot(&backup_key(design_id))
    }

    fn read_snapshot(&self, key: &str) -> Result<Option<BackupSnapshot>, AutoSaveError> {
        let Some(raw) = self.storage.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(key, error = %e, "Unreadable backup snapshot, treating as absent");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for AutoSaveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSaveEngine")
            .field("storage", &self.storage.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::EditableSurface;
    use crate::error::SurfaceError;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Mutex;

    struct Canvas(Mutex<Result<String, String>>);

    impl EditableSurface for Canvas {
        fn serialize(&self) -> Result<String, SurfaceError> {
            self.0.lock().unwrap().clone().map_err(SurfaceError)
        }
    }

    struct Editor {
        design: Option<String>,
        canvas: Option<Arc<Canvas>>,
    }

    impl EditorStateAccessor for Editor {
        fn active_design_id(&self) -> Option<String> {
            self.design.clone()
        }
        fn active_canvas(&self) -> Option<Arc<dyn EditableSurface>> {
            self.canvas.clone().map(|c| c as Arc<dyn EditableSurface>)
        }
    }

    struct Fixture {
        engine: AutoSaveEngine,
        storage: MemoryBackupStorage,
        canvas: Arc<Canvas>,
        clock: Arc<ManualClock>,
    }

    fn fixture(design: Option<&str>) -> Fixture {
        let storage = MemoryBackupStorage::new();
        let canvas = Arc::new(Canvas(Mutex::new(Ok("state-1".into()))));
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let editor = Arc::new(Editor {
            design: design.map(str::to_string),
            canvas: Some(canvas.clone()),
        });
        Fixture {
            engine: AutoSaveEngine::new(Arc::new(storage.clone()), editor, clock.clone()),
            storage,
            canvas,
            clock,
        }
    }

    #[test]
    fn test_backup_key_format() {
        assert_eq!(backup_key("42"), "design_42_backup");
    }

    #[test]
    fn test_snapshot_uses_camel_case() {
        let json = serde_json::to_value(BackupSnapshot {
            design_id: "d".into(),
            serialized_state: "s".into(),
            timestamp: 5,
        })
        .unwrap();
        assert_eq!(json["designId"], "d");
        assert_eq!(json["serializedState"], "s");
        assert_eq!(json["timestamp"], 5);
    }

    #[test]
    fn test_no_design_is_noop() {
        let f = fixture(None);
        assert_eq!(f.engine.tick().unwrap(), AutoSaveOutcome::NoContext);
        assert!(f.storage.is_empty());
    }

    #[test]
    fn test_no_canvas_is_noop() {
        let storage = MemoryBackupStorage::new();
        let editor = Arc::new(Editor {
            design: Some("d".into()),
            canvas: None,
        });
        let engine = AutoSaveEngine::new(
            Arc::new(storage.clone()),
            editor,
            Arc::new(crate::clock::SystemClock),
        );
        assert_eq!(engine.tick().unwrap(), AutoSaveOutcome::NoContext);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_identical_state_written_once() {
        let f = fixture(Some("d1"));
        assert_eq!(
            f.engine.tick().unwrap(),
            AutoSaveOutcome::Saved {
                design_id: "d1".into()
            }
        );
        let first = f.storage.get("design_d1_backup").unwrap();

        f.clock.advance(Duration::seconds(30));
        assert_eq!(f.engine.tick().unwrap(), AutoSaveOutcome::Unchanged);
        assert_eq!(f.storage.get("design_d1_backup").unwrap(), first);
    }

    #[test]
    fn test_changed_state_writes_new_snapshot() {
        let f = fixture(Some("d1"));
        f.engine.tick().unwrap();

        *f.canvas.0.lock().unwrap() = Ok("state-2".into());
        f.clock.advance(Duration::seconds(30));
        assert!(matches!(f.engine.tick().unwrap(), AutoSaveOutcome::Saved { .. }));

        let snapshot = f.engine.load_snapshot("d1").unwrap().unwrap();
        assert_eq!(snapshot.serialized_state, "state-2");
        assert_eq!(snapshot.timestamp, 1_700_000_030_000);
    }

    #[test]
    fn test_corrupt_snapshot_is_overwritten() {
        let f = fixture(Some("d1"));
        f.storage.set("design_d1_backup", "not json").unwrap();
        assert!(f.engine.load_snapshot("d1").unwrap().is_none());
        assert!(matches!(f.engine.tick().unwrap(), AutoSaveOutcome::Saved { .. }));
        assert!(f.engine.load_snapshot("d1").unwrap().is_some());
    }

    #[test]
    fn test_serialize_failure_is_reported_and_nothing_written() {
        let f = fixture(Some("d1"));
        *f.canvas.0.lock().unwrap() = Err("canvas detached".into());
        assert!(matches!(f.engine.tick(), Err(AutoSaveError::Serialize(_))));
        assert!(f.storage.is_empty());

        f.engine.run_tick();
        assert!(f.storage.is_empty());
    }
}
