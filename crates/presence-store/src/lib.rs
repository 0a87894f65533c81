//! presence-store - Persistence for the attendance system.
//!
//! Registered faces, admin configuration and the attendance ledger are each
//! one JSON document in a key-value substrate (SQLite on disk, or memory).
//! Also provides the backup codec, the CSV report and the
//! [`AttendanceService`] facade the front ends talk to.

pub mod backup;
pub mod config;
pub mod csv_export;
pub mod error;
pub mod faces;
pub mod kv;
pub mod ledger;
pub mod service;
pub mod sqlite;

pub use backup::{BackupCodec, BackupContents, BackupDocument};
pub use config::{AdminConfig, ConfigStore, PasswordHash, PlaintextPassword};
pub use error::StoreError;
pub use faces::EmbeddingStore;
pub use kv::{KeyValueStore, MemoryStore, StoreKey};
pub use ledger::AttendanceLedger;
pub use service::{AttendanceService, ServiceError, ServiceResult};
pub use sqlite::SqliteStore;

use std::path::PathBuf;

/// Default database location: `$XDG_DATA_HOME/presence/presence.db`,
/// falling back to `~/.local/share/presence/presence.db`.
pub fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("presence")
        .join("presence.db")
}
