//! Registered identities, persisted as one JSON array under `registered_faces`.

use crate::error::{Result, StoreError};
use crate::kv::{load_json, save_json, update_json, KeyValueStore, StoreKey};
use presence_core::{Embedding, RegisteredIdentity, RECORD_DELIMITER};
use std::sync::Arc;

type Faces = Vec<RegisteredIdentity>;

pub struct EmbeddingStore {
    kv: Arc<dyn KeyValueStore>,
}

impl EmbeddingStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// All registered identities in insertion order.
    pub fn list(&self) -> Result<Vec<RegisteredIdentity>> {
        Ok(load_json(self.kv.as_ref(), StoreKey::RegisteredFaces)?.unwrap_or_default())
    }

    pub fn get(&self, id: &str) -> Result<Option<RegisteredIdentity>> {
        Ok(self.list()?.into_iter().find(|f| f.id == id))
    }

    /// Register a new identity. Fails without writing if `id` is taken.
    pub fn register(&self, id: &str, name: &str, embedding: Embedding) -> Result<()> {
        if id.trim().is_empty() {
            return Err(StoreError::InvalidIdentity(id.to_string()));
        }
        if name.contains(RECORD_DELIMITER) || id.contains(RECORD_DELIMITER) {
            tracing::warn!(
                id,
                "identity contains the record delimiter; its attendance records will not parse back losslessly"
            );
        }

        let mut total = 0;
        update_json(self.kv.as_ref(), StoreKey::RegisteredFaces, |faces: &mut Faces| {
            if faces.iter().any(|f| f.id == id) {
                return Err(StoreError::DuplicateIdentity(id.to_string()));
            }
            faces.push(RegisteredIdentity {
                id: id.to_string(),
                name: name.to_string(),
                embedding,
            });
            total = faces.len();
            Ok(true)
        })?;

        tracing::info!(id, name, total, "registered identity");
        Ok(())
    }

    /// Remove the identity with `id`. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = update_json(self.kv.as_ref(), StoreKey::RegisteredFaces, |faces: &mut Faces| {
            let before = faces.len();
            faces.retain(|f| f.id != id);
            Ok(faces.len() != before)
        })?;
        if removed {
            tracing::info!(id, "deleted identity");
        }
        Ok(removed)
    }

    /// Change the display name of `id`. Returns whether it was found.
    pub fn rename(&self, id: &str, new_name: &str) -> Result<bool> {
        let renamed = update_json(self.kv.as_ref(), StoreKey::RegisteredFaces, |faces: &mut Faces| {
            let Some(face) = faces.iter_mut().find(|f| f.id == id) else {
                return Ok(false);
            };
            face.name = new_name.to_string();
            Ok(true)
        })?;
        if renamed {
            tracing::info!(id, new_name, "renamed identity");
        }
        Ok(renamed)
    }

    /// Overwrite the whole collection (backup restore).
    pub(crate) fn replace_all(&self, faces: &[RegisteredIdentity]) -> Result<()> {
        save_json(self.kv.as_ref(), StoreKey::RegisteredFaces, faces)
    }
}
