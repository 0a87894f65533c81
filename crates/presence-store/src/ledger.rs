//! Append-only attendance log, persisted as a JSON array of record strings.
//!
//! Every mutation is a whole-document read-modify-write done through the
//! store's atomic update, so concurrent mutators (including other processes
//! on the same database) cannot lose each other's updates.

use crate::error::{Result, StoreError};
use crate::kv::{load_json, save_json, update_json, KeyValueStore, StoreKey};
use presence_core::{AttendanceRecord, LedgerSink};
use std::sync::Arc;

pub struct AttendanceLedger {
    kv: Arc<dyn KeyValueStore>,
}

impl AttendanceLedger {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn load(&self) -> Result<Vec<String>> {
        Ok(load_json(self.kv.as_ref(), StoreKey::AttendanceLog)?.unwrap_or_default())
    }

    fn modify(&self, mutate: impl FnOnce(&mut Vec<String>) -> bool) -> Result<bool> {
        update_json(self.kv.as_ref(), StoreKey::AttendanceLog, |logs: &mut Vec<String>| {
            Ok(mutate(logs))
        })
    }

    /// Append a raw record line.
    pub fn append_line(&self, line: &str) -> Result<()> {
        self.modify(|logs| {
            logs.push(line.to_string());
            true
        })?;
        Ok(())
    }

    /// Records in insertion order, optionally narrowed to those containing
    /// `filter` (case-insensitive).
    pub fn list(&self, filter: Option<&str>) -> Result<Vec<String>> {
        let logs = self.load()?;
        let Some(needle) = filter.filter(|f| !f.is_empty()) else {
            return Ok(logs);
        };
        let needle = needle.to_lowercase();
        Ok(logs
            .into_iter()
            .filter(|line| line.to_lowercase().contains(&needle))
            .collect())
    }

    /// Replace the first record equal to `old` with `new`.
    pub fn edit(&self, old: &str, new: &str) -> Result<bool> {
        let edited = self.modify(|logs| match logs.iter_mut().find(|line| line.as_str() == old) {
            Some(slot) => {
                *slot = new.to_string();
                true
            }
            None => false,
        })?;
        if edited {
            tracing::info!(old, new, "edited attendance record");
        }
        Ok(edited)
    }

    /// Remove the first record equal to `value`.
    pub fn delete(&self, value: &str) -> Result<bool> {
        let deleted = self.modify(|logs| match logs.iter().position(|line| line == value) {
            Some(pos) => {
                logs.remove(pos);
                true
            }
            None => false,
        })?;
        if deleted {
            tracing::info!(record = value, "deleted attendance record");
        }
        Ok(deleted)
    }

    /// Overwrite the whole ledger (backup restore).
    pub(crate) fn replace_all(&self, logs: &[String]) -> Result<()> {
        save_json(self.kv.as_ref(), StoreKey::AttendanceLog, logs)
    }
}

impl LedgerSink for AttendanceLedger {
    type Error = StoreError;

    fn append(&self, record: &AttendanceRecord) -> Result<()> {
        self.append_line(&record.to_string())
    }
}
