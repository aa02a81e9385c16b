//! Small string key/value stores for tracker state.

use crate::error::{TrackerError, TrackerResult};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> TrackerResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> TrackerResult<()>;
    fn remove(&self, key: &str) -> TrackerResult<()>;
}

/// Process-local storage, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> TrackerResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| TrackerError::storage("memory storage lock poisoned"))
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> TrackerResult<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> TrackerResult<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> TrackerResult<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// A JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> TrackerResult<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(TrackerError::storage(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> TrackerResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                TrackerError::storage(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let tmp = self.path.with_extension("tmp");
        let text = serde_json::to_string_pretty(entries)?;
        std::fs::write(&tmp, text)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                TrackerError::storage(format!("cannot write {}: {}", self.path.display(), e))
            })?;
        debug!(path = %self.path.display(), keys = entries.len(), "Wrote tracker storage");
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> TrackerResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| TrackerError::storage("file storage lock poisoned"))?;
        let mut entries = self.read_all()?;
        apply(&mut entries);
        self.write_all(&entries)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> TrackerResult<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> TrackerResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> TrackerResult<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}
