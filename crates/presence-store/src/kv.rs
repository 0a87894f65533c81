//! Key-value substrate shared by the face, config and ledger stores.
//!
//! Every logical store persists one JSON document under one fixed key.
//! Writes are all-or-nothing per key; there is no cross-key transaction.
//! Read-modify-write sequences go through [`KeyValueStore::update`], which
//! is atomic against every other handle on the same backing store.

use crate::error::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// The three fixed logical keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    RegisteredFaces,
    AppConfig,
    AttendanceLog,
}

impl StoreKey {
    pub const ALL: [StoreKey; 3] = [
        StoreKey::RegisteredFaces,
        StoreKey::AppConfig,
        StoreKey::AttendanceLog,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StoreKey::RegisteredFaces => "registered_faces",
            StoreKey::AppConfig => "app_config",
            StoreKey::AttendanceLog => "attendance_log",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback for [`KeyValueStore::update`]: receives the current value and
/// returns the replacement, or `None` to leave the key untouched.
pub type UpdateFn<'a> = dyn FnMut(Option<String>) -> Result<Option<String>> + 'a;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: StoreKey) -> Result<Option<String>>;
    fn set(&self, key: StoreKey, value: &str) -> Result<()>;
    fn remove(&self, key: StoreKey) -> Result<()>;

    /// Atomically read, transform and write `key`.
    ///
    /// No other writer, in this process or another one sharing the store,
    /// can interleave between the read and the write. An error from `f`
    /// aborts without writing. `f` must not call back into the store.
    fn update(&self, key: StoreKey, f: &mut UpdateFn<'_>) -> Result<()>;
}

/// Process-local store, mainly for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>> {
        Ok(lock(&self.entries)?.get(&key).cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<()> {
        lock(&self.entries)?.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<()> {
        lock(&self.entries)?.remove(&key);
        Ok(())
    }

    fn update(&self, key: StoreKey, f: &mut UpdateFn<'_>) -> Result<()> {
        let mut entries = lock(&self.entries)?;
        if let Some(value) = f(entries.get(&key).cloned())? {
            entries.insert(key, value);
        }
        Ok(())
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|e| StoreError::Lock(e.to_string()))
}

/// Read and decode the document under `key`.
///
/// A document that fails to parse is logged and treated as absent: the
/// stored data is a local convenience cache, not a source of truth worth
/// crashing over.
pub(crate) fn load_json<T: DeserializeOwned>(
    kv: &dyn KeyValueStore,
    key: StoreKey,
) -> Result<Option<T>> {
    Ok(kv.get(key)?.and_then(|raw| decode(key, &raw)))
}

fn decode<T: DeserializeOwned>(key: StoreKey, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "corrupt persisted state; treating as empty");
            None
        }
    }
}

/// Atomically load the document under `key` (default when absent or
/// corrupt), let `mutate` change it, and store it back.
///
/// `mutate` returns whether the document changed; nothing is written when
/// it returns `false` or an error. The result is that flag.
pub(crate) fn update_json<T, F>(kv: &dyn KeyValueStore, key: StoreKey, mutate: F) -> Result<bool>
where
    T: DeserializeOwned + Serialize + Default,
    F: FnOnce(&mut T) -> Result<bool>,
{
    let mut mutate = Some(mutate);
    let mut changed = false;
    kv.update(key, &mut |raw: Option<String>| -> Result<Option<String>> {
        let mutate = mutate
            .take()
            .ok_or_else(|| StoreError::Lock(format!("update of {key} re-entered")))?;
        let mut document: T = raw
            .as_deref()
            .and_then(|raw| decode(key, raw))
            .unwrap_or_default();
        changed = mutate(&mut document)?;
        if changed {
            Ok(Some(serde_json::to_string(&document)?))
        } else {
            Ok(None)
        }
    })?;
    Ok(changed)
}

pub(crate) fn save_json<T: Serialize + ?Sized>(
    kv: &dyn KeyValueStore,
    key: StoreKey,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    kv.set(key, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let kv = MemoryStore::new();
        assert_eq!(kv.get(StoreKey::AppConfig).unwrap(), None);
        kv.set(StoreKey::AppConfig, "{}").unwrap();
        assert_eq!(kv.get(StoreKey::AppConfig).unwrap().as_deref(), Some("{}"));
        kv.remove(StoreKey::AppConfig).unwrap();
        assert_eq!(kv.get(StoreKey::AppConfig).unwrap(), None);
    }

    #[test]
    fn test_key_names() {
        let names: Vec<_> = StoreKey::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, ["registered_faces", "app_config", "attendance_log"]);
    }

    #[test]
    fn test_update_json_writes_only_when_changed() {
        let kv = MemoryStore::new();
        let wrote = update_json(&kv, StoreKey::AttendanceLog, |logs: &mut Vec<String>| {
            logs.push("a".into());
            Ok(true)
        })
        .unwrap();
        assert!(wrote);
        assert_eq!(kv.get(StoreKey::AttendanceLog).unwrap().as_deref(), Some(r#"["a"]"#));

        let wrote = update_json(&kv, StoreKey::AttendanceLog, |logs: &mut Vec<String>| {
            logs.clear();
            Ok(false)
        })
        .unwrap();
        assert!(!wrote);
        assert_eq!(kv.get(StoreKey::AttendanceLog).unwrap().as_deref(), Some(r#"["a"]"#));
    }

    #[test]
    fn test_update_json_error_aborts_write() {
        let kv = MemoryStore::new();
        let result = update_json(&kv, StoreKey::AppConfig, |_: &mut Vec<String>| {
            Err::<bool, _>(StoreError::InvalidCredentials)
        });
        assert!(matches!(result, Err(StoreError::InvalidCredentials)));
        assert_eq!(kv.get(StoreKey::AppConfig).unwrap(), None);
    }

    #[test]
    fn test_corrupt_json_reads_as_absent() {
        let kv = MemoryStore::new();
        kv.set(StoreKey::AttendanceLog, "[not json").unwrap();
        let logs: Option<Vec<String>> = load_json(&kv, StoreKey::AttendanceLog).unwrap();
        assert!(logs.is_none());
    }
}
