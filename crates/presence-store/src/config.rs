//! Admin configuration: username, SHA-256 password hash, cooldown window.
//!
//! Plaintext and hashed passwords are distinct types, so a hash is never
//! hashed twice and a plaintext never reaches storage. The hash is a
//! convenience check for the admin screens, not a security boundary.

use crate::error::{Result, StoreError};
use crate::kv::{load_json, save_json, update_json, KeyValueStore, StoreKey};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";
pub const DEFAULT_MIN_CAPTURE_INTERVAL_MINUTES: u32 = 5;

const HASH_HEX_LEN: usize = 64;

/// A password as typed by the operator. Never persisted.
#[derive(Clone)]
pub struct PlaintextPassword(String);

impl PlaintextPassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn hash(&self) -> PasswordHash {
        PasswordHash(hex::encode(Sha256::digest(self.0.as_bytes())))
    }
}

impl fmt::Debug for PlaintextPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlaintextPassword(<redacted>)")
    }
}

/// Lowercase hex SHA-256 digest of a password.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Accept `value` only if it already looks like a SHA-256 hex digest.
    pub fn parse(value: &str) -> Option<Self> {
        let looks_hashed =
            value.len() == HASH_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit());
        looks_hashed.then(|| Self(value.to_ascii_lowercase()))
    }

    /// Interpret a value read from storage or a backup.
    ///
    /// Values that do not look like a digest are treated as legacy plaintext
    /// and hashed.
    pub fn from_stored(value: &str) -> Self {
        Self::parse(value).unwrap_or_else(|| PlaintextPassword::new(value).hash())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn verify(&self, candidate: &PlaintextPassword) -> bool {
        candidate.hash() == *self
    }
}

impl From<PasswordHash> for String {
    fn from(hash: PasswordHash) -> Self {
        hash.0
    }
}

impl<'de> Deserialize<'de> for PasswordHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_stored(&raw))
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminConfig {
    pub admin_username: String,
    /// Stored under `admin_password` for compatibility with existing data.
    #[serde(
        rename = "admin_password",
        alias = "admin_password_hash",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub admin_password_hash: Option<PasswordHash>,
    #[serde(
        default = "default_interval",
        deserialize_with = "deserialize_interval"
    )]
    pub min_capture_interval_minutes: u32,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password_hash: Some(PlaintextPassword::new(DEFAULT_ADMIN_PASSWORD).hash()),
            min_capture_interval_minutes: DEFAULT_MIN_CAPTURE_INTERVAL_MINUTES,
        }
    }
}

pub(crate) fn default_interval() -> u32 {
    DEFAULT_MIN_CAPTURE_INTERVAL_MINUTES
}

/// Older writers stored the interval as a string; accept both.
pub(crate) fn deserialize_interval<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    let parsed = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => u32::try_from(n).ok(),
        Raw::Text(s) => s.trim().parse::<u32>().ok(),
    };
    Ok(parsed.unwrap_or_else(|| {
        tracing::warn!("invalid min_capture_interval_minutes in stored config; using default");
        DEFAULT_MIN_CAPTURE_INTERVAL_MINUTES
    }))
}

pub struct ConfigStore {
    kv: Arc<dyn KeyValueStore>,
}

impl ConfigStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Current config, creating and persisting defaults on first use.
    pub fn load(&self) -> Result<AdminConfig> {
        if let Some(config) = load_json(self.kv.as_ref(), StoreKey::AppConfig)? {
            return Ok(config);
        }
        // Another handle may initialize concurrently; keep whichever landed first.
        let mut initialized = false;
        let mut current = AdminConfig::default();
        self.kv.update(StoreKey::AppConfig, &mut |raw: Option<String>| -> Result<Option<String>> {
            let stored = raw
                .as_deref()
                .and_then(|raw| serde_json::from_str::<AdminConfig>(raw).ok());
            if let Some(config) = stored {
                current = config;
                return Ok(None);
            }
            initialized = true;
            Ok(Some(serde_json::to_string(&current)?))
        })?;
        if initialized {
            tracing::info!(username = %current.admin_username, "initialized default admin config");
        }
        Ok(current)
    }

    pub fn save(&self, config: &AdminConfig) -> Result<()> {
        save_json(self.kv.as_ref(), StoreKey::AppConfig, config)
    }

    /// Persist a new cooldown window length.
    pub fn save_interval(&self, minutes: u32) -> Result<AdminConfig> {
        let mut saved = AdminConfig::default();
        update_json(self.kv.as_ref(), StoreKey::AppConfig, |config: &mut AdminConfig| {
            config.min_capture_interval_minutes = minutes;
            saved = config.clone();
            Ok(true)
        })?;
        tracing::info!(minutes, "saved min capture interval");
        Ok(saved)
    }

    /// Change username and/or password after proving the current password.
    ///
    /// Empty replacements count as "not provided". Nothing is written when
    /// the current password is wrong.
    pub fn change_credentials(
        &self,
        current: &PlaintextPassword,
        new_username: Option<&str>,
        new_password: Option<&PlaintextPassword>,
    ) -> Result<AdminConfig> {
        let mut saved = AdminConfig::default();
        update_json(self.kv.as_ref(), StoreKey::AppConfig, |config: &mut AdminConfig| {
            let authorized = config
                .admin_password_hash
                .as_ref()
                .is_some_and(|hash| hash.verify(current));
            if !authorized {
                tracing::warn!("credential change rejected: incorrect current password");
                return Err(StoreError::InvalidCredentials);
            }

            if let Some(username) = new_username.filter(|u| !u.is_empty()) {
                config.admin_username = username.to_string();
            }
            if let Some(password) = new_password.filter(|p| !p.is_empty()) {
                config.admin_password_hash = Some(password.hash());
            }
            saved = config.clone();
            Ok(true)
        })?;
        tracing::info!(username = %saved.admin_username, "admin credentials updated");
        Ok(saved)
    }

    /// Whether `username` / `password` match the stored admin credentials.
    pub fn verify_login(&self, username: &str, password: &PlaintextPassword) -> Result<bool> {
        let config = self.load()?;
        let ok = username == config.admin_username
            && config
                .admin_password_hash
                .as_ref()
                .is_some_and(|hash| hash.verify(password));
        Ok(ok)
    }
}
