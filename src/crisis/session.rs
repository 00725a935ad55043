// Session persistence for crisis state
//
// The guard never touches ambient storage directly. It goes through a
// SessionStore, which can be in-memory, a JSON file on disk, or a
// ResilientStore that keeps working in memory when its backend fails.

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::detector::Severity;

/// Session-scoped keys
pub const KEY_CRISIS_DETECTED: &str = "crisisDetected";
pub const KEY_CRISIS_LEVEL: &str = "crisisLevel";
pub const KEY_USER_ID: &str = "userId";

/// Long-lived keys (append-only JSON arrays)
pub const KEY_CRISIS_EVENTS: &str = "crisisEvents";
pub const KEY_CRISIS_ACTIONS: &str = "crisisActions";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored data is malformed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Key/value persistence used for crisis state and audit logs
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Remove every key
    fn clear(&self) -> Result<(), StoreError>;

    /// Read-modify-write of one key. `op` sees the current value and
    /// returns the replacement, or None to leave the key untouched.
    /// Returns what was written.
    ///
    /// The default is a plain get then set; stores shared between
    /// processes override it to run under one lock.
    fn update(
        &self,
        key: &str,
        op: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<Option<String>, StoreError> {
        let current = self.get(key)?;
        match op(current.as_deref()) {
            Some(next) => {
                self.set(key, &next)?;
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }
}

impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }

    fn update(
        &self,
        key: &str,
        op: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<Option<String>, StoreError> {
        (**self).update(key, op)
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        op: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<Option<String>, StoreError> {
        // The entry guard holds the shard lock for the whole update
        let written = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let next = op(Some(entry.get().as_str()));
                if let Some(next) = &next {
                    entry.insert(next.clone());
                }
                next
            }
            Entry::Vacant(entry) => {
                let next = op(None);
                if let Some(next) = &next {
                    entry.insert(next.clone());
                }
                next
            }
        };
        Ok(written)
    }
}

/// JSON object on disk, one file per store.
///
/// Every operation holds an exclusive lock on the file for the whole
/// read-modify-write, so two processes sharing a store interleave whole
/// operations. Between sessions the last writer still wins.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_locked<T>(
        &self,
        op: impl FnOnce(&mut BTreeMap<String, String>) -> (T, bool),
    ) -> Result<T, StoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let result = Self::locked_op(&mut file, op);

        if let Err(e) = FileExt::unlock(&file) {
            tracing::debug!(path = %self.path.display(), "Failed to unlock store file: {}", e);
        }
        result
    }

    fn locked_op<T>(
        file: &mut File,
        op: impl FnOnce(&mut BTreeMap<String, String>) -> (T, bool),
    ) -> Result<T, StoreError> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let mut map: BTreeMap<String, String> = if contents.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&contents)?
        };

        let (value, dirty) = op(&mut map);

        if dirty {
            let json = serde_json::to_string_pretty(&map)?;
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(json.as_bytes())?;
            file.sync_data()?;
        }

        Ok(value)
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_locked(|map| (map.get(key).cloned(), false))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.with_locked(|map| {
            map.insert(key.to_string(), value.to_string());
            ((), true)
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.with_locked(|map| {
            let removed = map.remove(key).is_some();
            ((), removed)
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.with_locked(|map| {
            map.clear();
            ((), true)
        })
    }

    fn update(
        &self,
        key: &str,
        op: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<Option<String>, StoreError> {
        self.with_locked(|map| {
            let next = op(map.get(key).map(String::as_str));
            match next {
                Some(next) => {
                    map.insert(key.to_string(), next.clone());
                    (Some(next), true)
                }
                None => (None, false),
            }
        })
    }
}

/// Store wrapper that never fails.
///
/// Writes land in an in-memory overlay first and are then forwarded to the
/// backend; backend errors are logged and swallowed. Reads prefer the
/// overlay, so the current page sees its own writes even when the backend
/// is disabled or full. State that only reached the overlay does not
/// survive a reload.
pub struct ResilientStore {
    name: &'static str,
    backend: Arc<dyn SessionStore>,
    overlay: DashMap<String, String>,
    removed: DashSet<String>,
    /// Keys whose last write never reached the backend
    diverged: DashSet<String>,
}

impl ResilientStore {
    pub fn new(name: &'static str, backend: Arc<dyn SessionStore>) -> Self {
        Self {
            name,
            backend,
            overlay: DashMap::new(),
            removed: DashSet::new(),
            diverged: DashSet::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.overlay.get(key) {
            return Some(value.value().clone());
        }
        if self.removed.contains(key) {
            return None;
        }
        match self.backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    store = self.name,
                    key,
                    "Storage read failed, using memory only: {}",
                    e
                );
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        self.removed.remove(key);
        self.overlay.insert(key.to_string(), value.to_string());
        match self.backend.set(key, value) {
            Ok(()) => {
                self.diverged.remove(key);
            }
            Err(e) => {
                self.diverged.insert(key.to_string());
                tracing::warn!(
                    store = self.name,
                    key,
                    "Storage write failed, state kept in memory for this page: {}",
                    e
                );
            }
        }
    }

    pub fn remove(&self, key: &str) {
        self.overlay.remove(key);
        self.removed.insert(key.to_string());
        match self.backend.remove(key) {
            Ok(()) => {
                self.diverged.remove(key);
            }
            Err(e) => {
                self.diverged.insert(key.to_string());
                tracing::warn!(store = self.name, key, "Storage remove failed: {}", e);
            }
        }
    }

    /// Read-modify-write through the backend's own `update`, so the change
    /// is applied to the latest stored value. When the backend fails, or an
    /// earlier write never reached it, `op` runs against this page's view
    /// instead.
    pub fn update(
        &self,
        key: &str,
        op: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Option<String> {
        if !self.diverged.contains(key) {
            match self.backend.update(key, op) {
                Ok(written) => {
                    if let Some(value) = &written {
                        self.removed.remove(key);
                        self.overlay.insert(key.to_string(), value.clone());
                    }
                    return written;
                }
                Err(e) => {
                    tracing::warn!(
                        store = self.name,
                        key,
                        "Storage update failed, applying it in memory: {}",
                        e
                    );
                }
            }
        }

        let current = self.get(key);
        let next = op(current.as_deref())?;
        self.set(key, &next);
        Some(next)
    }
}

/// Persisted crisis state for one browsing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrisisSession {
    pub active: bool,
    pub severity: Severity,
}

impl CrisisSession {
    pub fn load(store: &ResilientStore) -> Self {
        let active = store.get(KEY_CRISIS_DETECTED).as_deref() == Some("true");
        if !active {
            return Self::default();
        }

        // An unreadable level on an active session is treated as high
        let severity = store
            .get(KEY_CRISIS_LEVEL)
            .and_then(|level| Severity::parse(&level))
            .filter(|s| *s != Severity::None)
            .unwrap_or(Severity::High);

        Self { active, severity }
    }

    pub fn save(&self, store: &ResilientStore) {
        if self.active {
            store.set(KEY_CRISIS_DETECTED, "true");
            store.set(KEY_CRISIS_LEVEL, self.severity.as_str());
        } else {
            Self::clear(store);
        }
    }

    pub fn clear(store: &ResilientStore) {
        store.remove(KEY_CRISIS_DETECTED);
        store.remove(KEY_CRISIS_LEVEL);
    }
}

/// Read the session's user id, generating and persisting one if absent
pub fn ensure_user_id(store: &ResilientStore) -> String {
    if let Some(id) = store.get(KEY_USER_ID).filter(|id| !id.trim().is_empty()) {
        return id;
    }
    let id = format!("anonymous_{}", Uuid::new_v4().simple());
    store.set(KEY_USER_ID, &id);
    tracing::debug!(user_id = %id, "Generated anonymous user id");
    id
}
