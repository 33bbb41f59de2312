//! Storage backends for the session registry
//!
//! The registry talks to storage only through [`SessionStore`], so callers can
//! pick a purely in-memory table or a directory of JSON files that survives
//! restarts of the host process.

use fs2::FileExt;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{Result, SessionError};
use crate::types::identifiers::SessionId;
use crate::types::session::SessionRecord;

/// Extension of live session files
const RECORD_EXT: &str = "json";

/// Extension of tombstone marker files
const TOMBSTONE_EXT: &str = "exited";

/// Name of the directory-wide lock file
const LOCK_FILE: &str = ".registry.lock";

/// Extension of per-session lock files
const SESSION_LOCK_EXT: &str = "lock";

/// Key-value storage for session records and tombstones
pub trait SessionStore: Send + Sync {
    /// Load a live record
    fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>>;

    /// Insert or replace a live record
    fn save(&self, record: &SessionRecord) -> Result<()>;

    /// Replace a record that is still live
    ///
    /// # Errors
    /// Returns `SessionNotFound` if the record was deleted or its id retired,
    /// possibly by another process sharing the store
    fn update(&self, record: &SessionRecord) -> Result<()>;

    /// Delete a live record; returns whether it existed
    fn delete(&self, id: &SessionId) -> Result<bool>;

    /// Remember that `id` has exited so it is never handed out again
    fn retire(&self, id: &SessionId) -> Result<()>;

    /// Whether `id` has exited
    fn is_retired(&self, id: &SessionId) -> Result<bool>;

    /// All live records
    fn list(&self) -> Result<Vec<SessionRecord>>;

    /// Whether other processes may change the store behind this one's back
    fn is_shared(&self) -> bool {
        false
    }

    /// File to lock while a session's process is in use, for stores shared
    /// between processes
    fn session_lock_path(&self, _id: &SessionId) -> Option<PathBuf> {
        None
    }
}

/// Exclusive lock on one session across processes, released on drop
#[derive(Debug)]
pub struct SessionFileLock {
    _file: File,
}

impl SessionFileLock {
    /// Block until the lock at `path` is held
    ///
    /// # Errors
    /// Returns error if the lock file cannot be opened or locked
    pub async fn acquire(path: PathBuf) -> Result<Self> {
        tokio::task::spawn_blocking(move || {
            let file = File::options()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(Self { _file: file })
        })
        .await
        .map_err(|e| SessionError::Io(std::io::Error::other(e)))?
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Volatile store, lost with the host process
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<SessionId, SessionRecord>>,
    tombstones: Mutex<HashSet<SessionId>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        Ok(self.records.lock().get(id).cloned())
    }

    fn save(&self, record: &SessionRecord) -> Result<()> {
        self.records
            .lock()
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    fn update(&self, record: &SessionRecord) -> Result<()> {
        match self.records.lock().get_mut(&record.session_id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(SessionError::session_not_found(record.session_id.as_str())),
        }
    }

    fn delete(&self, id: &SessionId) -> Result<bool> {
        Ok(self.records.lock().remove(id).is_some())
    }

    fn retire(&self, id: &SessionId) -> Result<()> {
        self.tombstones.lock().insert(id.clone());
        Ok(())
    }

    fn is_retired(&self, id: &SessionId) -> Result<bool> {
        Ok(self.tombstones.lock().contains(id))
    }

    fn list(&self) -> Result<Vec<SessionRecord>> {
        Ok(self.records.lock().values().cloned().collect())
    }
}

// ============================================================================
// File store
// ============================================================================

/// One JSON file per session under a directory
///
/// Every operation holds an exclusive lock on `.registry.lock` so that
/// separate CLI invocations sharing the directory see atomic updates.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`
    ///
    /// # Errors
    /// Returns error if the directory cannot be created
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Default location, `~/.nanobot/claude-sessions`
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".nanobot").join("claude-sessions"))
    }

    /// Root directory of this store
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.{RECORD_EXT}", id.as_str()))
    }

    fn tombstone_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.{TOMBSTONE_EXT}", id.as_str()))
    }

    fn write_record(path: &Path, json: &str) -> Result<()> {
        let tmp = path.with_extension(format!("{RECORD_EXT}.tmp"));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Run `f` while holding the directory lock
    ///
    /// The lock is released when the lock file handle is dropped.
    fn locked<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock_file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.dir.join(LOCK_FILE))?;
        lock_file.lock_exclusive()?;
        f()
    }

    fn read_record(path: &Path) -> Result<Option<SessionRecord>> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl SessionStore for FileStore {
    fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        if !id.is_well_formed() {
            return Ok(None);
        }
        self.locked(|| Self::read_record(&self.record_path(id)))
    }

    fn save(&self, record: &SessionRecord) -> Result<()> {
        let path = self.record_path(&record.session_id);
        let json = serde_json::to_string_pretty(record)?;
        self.locked(|| Self::write_record(&path, &json))
    }

    fn update(&self, record: &SessionRecord) -> Result<()> {
        let id = &record.session_id;
        if !id.is_well_formed() {
            return Err(SessionError::session_not_found(id.as_str()));
        }
        let path = self.record_path(id);
        let json = serde_json::to_string_pretty(record)?;
        self.locked(|| {
            if !path.exists() || self.tombstone_path(id).exists() {
                return Err(SessionError::session_not_found(id.as_str()));
            }
            Self::write_record(&path, &json)
        })
    }

    fn delete(&self, id: &SessionId) -> Result<bool> {
        if !id.is_well_formed() {
            return Ok(false);
        }
        self.locked(|| match std::fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        })
    }

    fn retire(&self, id: &SessionId) -> Result<()> {
        if !id.is_well_formed() {
            return Ok(());
        }
        self.locked(|| {
            std::fs::write(self.tombstone_path(id), chrono::Utc::now().to_rfc3339())?;
            // Waiters on a removed lock file see the tombstone once they get in
            match std::fs::remove_file(self.dir.join(format!("{}.{SESSION_LOCK_EXT}", id.as_str()))) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn is_retired(&self, id: &SessionId) -> Result<bool> {
        if !id.is_well_formed() {
            return Ok(false);
        }
        self.locked(|| Ok(self.tombstone_path(id).exists()))
    }

    fn list(&self) -> Result<Vec<SessionRecord>> {
        self.locked(|| {
            let mut records = Vec::new();
            for entry in std::fs::read_dir(&self.dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                    continue;
                }
                match Self::read_record(&path) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(e) => log::warn!("Skipping unreadable session file {}: {}", path.display(), e),
                }
            }
            Ok(records)
        })
    }

    fn is_shared(&self) -> bool {
        true
    }

    fn session_lock_path(&self, id: &SessionId) -> Option<PathBuf> {
        id.is_well_formed()
            .then(|| self.dir.join(format!("{}.{SESSION_LOCK_EXT}", id.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> SessionRecord {
        SessionRecord::new(SessionId::new(id), PathBuf::from("/tmp"))
    }

    #[test]
    fn file_store_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let mut rec = record("abc-123");
        rec.conversation_id = Some("conv-9".into());
        store.save(&rec).unwrap();

        let loaded = store.load(&SessionId::new("abc-123")).unwrap().unwrap();
        assert_eq!(loaded.conversation_id.as_deref(), Some("conv-9"));
        assert!(loaded.process.is_none());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn file_store_tombstones_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = SessionId::new("gone");
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.save(&record("gone")).unwrap();
            assert!(store.delete(&id).unwrap());
            assert!(!store.delete(&id).unwrap());
            store.retire(&id).unwrap();
        }
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.is_retired(&id).unwrap());
        assert!(store.load(&id).unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn file_store_ignores_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.load(&SessionId::new("../escape")).unwrap().is_none());
        assert!(!store.is_retired(&SessionId::new("a/b")).unwrap());
    }

    #[test]
    fn file_store_update_refuses_retired_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let id = SessionId::new("stale");
        let rec = record("stale");
        store.save(&rec).unwrap();
        store.update(&rec).unwrap();

        // Another process exits the session while this one holds a copy
        let other = FileStore::open(dir.path()).unwrap();
        other.delete(&id).unwrap();
        other.retire(&id).unwrap();

        assert!(matches!(
            store.update(&rec),
            Err(SessionError::SessionNotFound(_))
        ));
        assert!(store.load(&id).unwrap().is_none());
        assert!(store.is_retired(&id).unwrap());
    }

    #[tokio::test]
    async fn session_lock_excludes_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let path = store.session_lock_path(&SessionId::new("abc")).unwrap();
        assert!(store.session_lock_path(&SessionId::new("../x")).is_none());

        let held = SessionFileLock::acquire(path.clone()).await.unwrap();
        let second = tokio::spawn(SessionFileLock::acquire(path));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!second.is_finished());

        drop(held);
        tokio::time::timeout(std::time::Duration::from_secs(5), second)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[test]
    fn memory_store_update_requires_live_record() {
        let store = MemoryStore::new();
        let rec = record("m2");
        assert!(store.update(&rec).is_err());
        store.save(&rec).unwrap();
        store.update(&rec).unwrap();
        assert!(!store.is_shared());
        assert!(store.session_lock_path(&rec.session_id).is_none());
    }

    #[test]
    fn memory_store_tracks_tombstones() {
        let store = MemoryStore::new();
        let id = SessionId::new("m1");
        store.save(&record("m1")).unwrap();
        assert!(store.delete(&id).unwrap());
        store.retire(&id).unwrap();
        assert!(store.is_retired(&id).unwrap());
        assert!(store.list().unwrap().is_empty());
    }
}
