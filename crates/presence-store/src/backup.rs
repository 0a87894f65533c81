//! Whole-state backup document.
//!
//! ```json
//! {
//!   "registeredFaces": [{ "id": "E1", "name": "Alice", "descriptor": [/* 128 floats */] }],
//!   "config": { "admin_username": "admin", "admin_password": "<base64 of hash>", "min_capture_interval_minutes": 5 },
//!   "attendanceLogs": ["Alice - E1 - 2024-01-01T00:00:00.000Z"]
//! }
//! ```
//!
//! The password hash is Base64-wrapped. That is format obfuscation kept for
//! compatibility with existing backups, and it is trivially reversible: a
//! backup file must be guarded like the database itself.

use crate::config::{AdminConfig, PasswordHash};
use crate::error::{Result, StoreError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use presence_core::RegisteredIdentity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const REQUIRED_FIELDS: [&str; 3] = ["registeredFaces", "config", "attendanceLogs"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub registered_faces: Vec<RegisteredIdentity>,
    pub config: BackupConfig,
    pub attendance_logs: Vec<String>,
}

/// [`AdminConfig`] as it appears inside a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub admin_username: String,
    /// Base64 of the hex password hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
    #[serde(
        default = "crate::config::default_interval",
        deserialize_with = "crate::config::deserialize_interval"
    )]
    pub min_capture_interval_minutes: u32,
}

/// Decoded contents of a backup, ready to overwrite the stores.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupContents {
    pub faces: Vec<RegisteredIdentity>,
    pub config: AdminConfig,
    pub ledger: Vec<String>,
}

pub struct BackupCodec;

impl BackupCodec {
    pub fn export(
        faces: &[RegisteredIdentity],
        config: &AdminConfig,
        ledger: &[String],
    ) -> BackupDocument {
        BackupDocument {
            registered_faces: faces.to_vec(),
            config: BackupConfig {
                admin_username: config.admin_username.clone(),
                admin_password: config
                    .admin_password_hash
                    .as_ref()
                    .map(|hash| STANDARD.encode(hash.as_str())),
                min_capture_interval_minutes: config.min_capture_interval_minutes,
            },
            attendance_logs: ledger.to_vec(),
        }
    }

    /// Serialize a document as pretty-printed JSON.
    pub fn encode(document: &BackupDocument) -> Result<String> {
        Ok(serde_json::to_string_pretty(document)?)
    }

    /// Parse and validate a backup document.
    ///
    /// Fails with [`StoreError::InvalidFormat`] when the text is not JSON,
    /// any of the three top-level fields is missing, a field has the wrong
    /// shape, a face id is blank or repeated, or the password field is
    /// absent or not valid Base64.
    pub fn import(text: &str) -> Result<BackupContents> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| StoreError::InvalidFormat(format!("not a JSON document: {e}")))?;

        let Some(object) = value.as_object() else {
            return Err(StoreError::InvalidFormat("expected a JSON object".into()));
        };
        if let Some(missing) = REQUIRED_FIELDS
            .iter()
            .find(|field| object.get(**field).map_or(true, |v| v.is_null()))
        {
            return Err(StoreError::InvalidFormat(format!("missing field `{missing}`")));
        }

        let document: BackupDocument = serde_json::from_value(value)
            .map_err(|e| StoreError::InvalidFormat(e.to_string()))?;

        check_identities(&document.registered_faces)?;

        let encoded = document.config.admin_password.as_deref().ok_or_else(|| {
            StoreError::InvalidFormat("missing field `config.admin_password`".into())
        })?;
        let admin_password_hash = Some(decode_password(encoded)?);

        Ok(BackupContents {
            faces: document.registered_faces,
            config: AdminConfig {
                admin_username: document.config.admin_username,
                admin_password_hash,
                min_capture_interval_minutes: document.config.min_capture_interval_minutes,
            },
            ledger: document.attendance_logs,
        })
    }
}

fn check_identities(faces: &[RegisteredIdentity]) -> Result<()> {
    let mut seen = HashSet::with_capacity(faces.len());
    for face in faces {
        if face.id.trim().is_empty() {
            return Err(StoreError::InvalidFormat("blank employee id".into()));
        }
        if !seen.insert(face.id.as_str()) {
            return Err(StoreError::InvalidFormat(format!(
                "duplicate employee id `{}`",
                face.id
            )));
        }
    }
    Ok(())
}

fn decode_password(encoded: &str) -> Result<PasswordHash> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| StoreError::InvalidFormat(format!("admin_password is not base64: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| StoreError::InvalidFormat("admin_password is not UTF-8".into()))?;
    Ok(PasswordHash::from_stored(&text))
}
