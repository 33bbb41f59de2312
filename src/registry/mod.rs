//! Session registry
//!
//! Maps session ids to [`SessionRecord`]s. The registry keeps a cache of the
//! records it has seen (which is also the only place process handles live)
//! and writes every change through to the injected [`SessionStore`].

mod store;

pub use store::{FileStore, MemoryStore, SessionFileLock, SessionStore};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Result, SessionError};
use crate::types::identifiers::{ProcessHandle, SessionId};
use crate::types::session::{SessionRecord, SessionState};

/// Registry of sessions backed by a pluggable store
///
/// Every operation runs under one mutex, so creates, updates and removes for
/// different ids never interleave. The lock is never held across an await.
pub struct SessionRegistry {
    store: Box<dyn SessionStore>,
    cache: Mutex<HashMap<SessionId, SessionRecord>>,
}

impl SessionRegistry {
    /// Create a registry over `store`
    pub fn new(store: impl SessionStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Registry over a fresh [`MemoryStore`]
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Allocate a fresh id and store a new active record
    ///
    /// # Errors
    /// Returns error if the store cannot be written
    pub fn create(&self, working_directory: PathBuf) -> Result<SessionRecord> {
        let mut cache = self.cache.lock();
        let session_id = loop {
            let candidate = SessionId::generate();
            if !cache.contains_key(&candidate)
                && self.store.load(&candidate)?.is_none()
                && !self.store.is_retired(&candidate)?
            {
                break candidate;
            }
        };
        let record = SessionRecord::new(session_id.clone(), working_directory);
        self.store.save(&record)?;
        cache.insert(session_id, record.clone());
        Ok(record)
    }

    /// Look up a live session
    ///
    /// # Errors
    /// Returns `SessionNotFound` if the id is unknown or has exited
    pub fn get(&self, session_id: &SessionId) -> Result<SessionRecord> {
        let mut cache = self.cache.lock();
        Self::cached(&mut cache, self.store.as_ref(), session_id).map(|record| record.clone())
    }

    /// Hold the session against other processes sharing the store
    ///
    /// Once the lock is held the cached record is reloaded, so a conversation
    /// id written by the previous holder is picked up. Returns `None` for
    /// stores private to this process, where the manager's in-process lock
    /// is enough.
    ///
    /// # Errors
    /// Returns `SessionNotFound` if the session exited while waiting, or an
    /// error if the lock file cannot be locked
    pub async fn lock_session(&self, session_id: &SessionId) -> Result<Option<SessionFileLock>> {
        let Some(path) = self.store.session_lock_path(session_id) else {
            return Ok(None);
        };
        let guard = SessionFileLock::acquire(path).await?;

        let mut cache = self.cache.lock();
        let mut record = match self.store.load(session_id)? {
            Some(record) if record.state == SessionState::Active => record,
            _ => {
                cache.remove(session_id);
                return Err(SessionError::session_not_found(session_id.as_str()));
            }
        };
        record.process = cache.get(session_id).and_then(|cached| cached.process);
        cache.insert(session_id.clone(), record);
        Ok(Some(guard))
    }

    /// Whether the id belongs to a session that has exited
    ///
    /// # Errors
    /// Returns error if the store cannot be read
    pub fn is_retired(&self, session_id: &SessionId) -> Result<bool> {
        self.store.is_retired(session_id)
    }

    /// Refresh `last_activity_at`
    ///
    /// # Errors
    /// Returns `SessionNotFound` if the id is unknown
    pub fn update_activity(&self, session_id: &SessionId) -> Result<()> {
        self.modify(session_id, |record| record.last_activity_at = Utc::now())
    }

    /// Record the conversation id to resume from
    ///
    /// # Errors
    /// Returns `SessionNotFound` if the id is unknown
    pub fn set_conversation(&self, session_id: &SessionId, conversation_id: String) -> Result<()> {
        self.modify(session_id, |record| {
            record.conversation_id = Some(conversation_id);
        })
    }

    /// Bind a live process to the session
    ///
    /// # Errors
    /// Returns `SessionNotFound` if the id is unknown
    pub fn attach(&self, session_id: &SessionId, handle: ProcessHandle) -> Result<()> {
        let mut cache = self.cache.lock();
        let record = Self::cached(&mut cache, self.store.as_ref(), session_id)?;
        record.process = Some(handle);
        Ok(())
    }

    /// Unbind the process, keeping the session resumable
    ///
    /// Returns the handle that was attached, if any.
    pub fn detach(&self, session_id: &SessionId) -> Option<ProcessHandle> {
        self.cache
            .lock()
            .get_mut(session_id)
            .and_then(|record| record.process.take())
    }

    /// Delete the record and tombstone its id
    ///
    /// # Errors
    /// Returns `AlreadyExited` for a tombstoned id and `SessionNotFound` for
    /// an unknown one
    pub fn remove(&self, session_id: &SessionId) -> Result<SessionRecord> {
        let mut cache = self.cache.lock();
        let found = Self::cached(&mut cache, self.store.as_ref(), session_id).map(|r| r.clone());
        let mut record = match found {
            Ok(record) => record,
            Err(SessionError::SessionNotFound(_)) if self.store.is_retired(session_id)? => {
                return Err(SessionError::already_exited(session_id.as_str()));
            }
            Err(e) => return Err(e),
        };
        cache.remove(session_id);
        self.store.delete(session_id)?;
        self.store.retire(session_id)?;
        record.state = SessionState::Exited;
        Ok(record)
    }

    /// Every live record, oldest first
    ///
    /// # Errors
    /// Returns error if the store cannot be read
    pub fn list(&self) -> Result<Vec<SessionRecord>> {
        let mut cache = self.cache.lock();
        for record in self.store.list()? {
            cache.entry(record.session_id.clone()).or_insert(record);
        }
        let mut records: Vec<SessionRecord> = cache.values().cloned().collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }

    /// Ids of sessions whose last activity is older than `cutoff`
    ///
    /// # Errors
    /// Returns error if the store cannot be read
    pub fn idle_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionId>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|record| record.last_activity_at < cutoff)
            .map(|record| record.session_id)
            .collect())
    }

    /// Ids of sessions with an attached process
    #[must_use]
    pub fn attached(&self) -> Vec<SessionId> {
        self.cache
            .lock()
            .values()
            .filter(|record| record.is_attached())
            .map(|record| record.session_id.clone())
            .collect()
    }

    fn modify(&self, session_id: &SessionId, f: impl FnOnce(&mut SessionRecord)) -> Result<()> {
        let mut cache = self.cache.lock();
        let record = Self::cached(&mut cache, self.store.as_ref(), session_id)?;
        f(record);
        let result = self.store.update(record);
        if let Err(SessionError::SessionNotFound(_)) = result {
            cache.remove(session_id);
        }
        result
    }

    /// Cache entry for `session_id`, loading it from the store on a miss
    ///
    /// With a shared store, a hit is dropped once another process has
    /// retired the id.
    fn cached<'a>(
        cache: &'a mut HashMap<SessionId, SessionRecord>,
        store: &dyn SessionStore,
        session_id: &SessionId,
    ) -> Result<&'a mut SessionRecord> {
        if cache.contains_key(session_id) && store.is_shared() && store.is_retired(session_id)? {
            cache.remove(session_id);
            return Err(SessionError::session_not_found(session_id.as_str()));
        }
        if !cache.contains_key(session_id) {
            match store.load(session_id)? {
                Some(record) if record.state == SessionState::Active => {
                    cache.insert(session_id.clone(), record);
                }
                _ => return Err(SessionError::session_not_found(session_id.as_str())),
            }
        }
        cache
            .get_mut(session_id)
            .ok_or_else(|| SessionError::session_not_found(session_id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_allocates_distinct_ids() {
        let registry = SessionRegistry::in_memory();
        let a = registry.create(PathBuf::from("/tmp")).unwrap();
        let b = registry.create(PathBuf::from("/tmp")).unwrap();
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(a.state, SessionState::Active);
        assert!(!a.is_attached());
    }

    #[test]
    fn remove_twice_reports_already_exited() {
        let registry = SessionRegistry::in_memory();
        let rec = registry.create(PathBuf::from("/tmp")).unwrap();

        let removed = registry.remove(&rec.session_id).unwrap();
        assert_eq!(removed.state, SessionState::Exited);
        assert!(matches!(
            registry.remove(&rec.session_id),
            Err(SessionError::AlreadyExited(_))
        ));
        assert!(matches!(
            registry.get(&rec.session_id),
            Err(SessionError::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.remove(&SessionId::new("never-existed")),
            Err(SessionError::SessionNotFound(_))
        ));
    }

    #[test]
    fn attach_and_detach_handles() {
        let registry = SessionRegistry::in_memory();
        let rec = registry.create(PathBuf::from("/tmp")).unwrap();
        registry.attach(&rec.session_id, ProcessHandle::new(7)).unwrap();
        assert_eq!(registry.attached(), vec![rec.session_id.clone()]);
        assert_eq!(registry.detach(&rec.session_id), Some(ProcessHandle::new(7)));
        assert!(registry.get(&rec.session_id).unwrap().process.is_none());
    }

    #[test]
    fn records_reload_detached_from_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let registry = SessionRegistry::new(FileStore::open(dir.path()).unwrap());
            let rec = registry.create(PathBuf::from("/work/app")).unwrap();
            registry.attach(&rec.session_id, ProcessHandle::new(1)).unwrap();
            registry
                .set_conversation(&rec.session_id, "conv-1".to_string())
                .unwrap();
            rec.session_id
        };

        let registry = SessionRegistry::new(FileStore::open(dir.path()).unwrap());
        let rec = registry.get(&id).unwrap();
        assert_eq!(rec.working_directory, PathBuf::from("/work/app"));
        assert_eq!(rec.conversation_id.as_deref(), Some("conv-1"));
        assert!(rec.process.is_none());
    }

    #[test]
    fn exit_by_another_registry_is_seen_through_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let first = SessionRegistry::new(FileStore::open(dir.path()).unwrap());
        let rec = first.create(PathBuf::from("/work/app")).unwrap();
        let id = rec.session_id;

        let second = SessionRegistry::new(FileStore::open(dir.path()).unwrap());
        second.remove(&id).unwrap();

        assert!(matches!(
            first.update_activity(&id),
            Err(SessionError::SessionNotFound(_))
        ));
        assert!(matches!(first.get(&id), Err(SessionError::SessionNotFound(_))));
        assert!(matches!(first.remove(&id), Err(SessionError::AlreadyExited(_))));

        let third = SessionRegistry::new(FileStore::open(dir.path()).unwrap());
        assert!(third.get(&id).is_err());
        assert!(third.list().unwrap().is_empty());
    }

    #[test]
    fn idle_since_filters_by_activity() {
        let registry = SessionRegistry::in_memory();
        let old = registry.create(PathBuf::from("/tmp")).unwrap();
        let cutoff = Utc::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let fresh = registry.create(PathBuf::from("/tmp")).unwrap();

        let idle = registry.idle_since(cutoff).unwrap();
        assert!(idle.contains(&old.session_id));
        assert!(!idle.contains(&fresh.session_id));
    }
}
