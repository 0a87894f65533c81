//! Application facade over the stores and the attendance session.
//!
//! This is the surface the UI layer (and the daemon / CLI) talks to. Passes
//! that mutate cooldown state take `&mut self`, so at most one attendance
//! pass can be in flight per service.

use crate::backup::{BackupCodec, BackupContents};
use crate::config::{AdminConfig, ConfigStore, PlaintextPassword};
use crate::csv_export;
use crate::error::StoreError;
use crate::faces::EmbeddingStore;
use crate::kv::{KeyValueStore, StoreKey};
use crate::ledger::AttendanceLedger;
use presence_core::{
    AttendanceSession, BatchReport, Clock, CooldownController, Detection, Embedding,
    RegisteredIdentity, SessionError, SystemClock,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("no face detected; make sure the face is clearly visible")]
    NoFaceDetected,
    #[error("{0} faces detected; registration needs exactly one")]
    MultipleFaces(usize),
    #[error("no faces registered; register faces first")]
    NoFacesRegistered,
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

pub struct AttendanceService<C: Clock = SystemClock> {
    kv: Arc<dyn KeyValueStore>,
    faces: EmbeddingStore,
    config: ConfigStore,
    ledger: Arc<AttendanceLedger>,
    session: AttendanceSession<Arc<AttendanceLedger>, C>,
}

impl AttendanceService<SystemClock> {
    pub fn open(kv: Arc<dyn KeyValueStore>) -> ServiceResult<Self> {
        Self::with_clock(kv, SystemClock)
    }
}

impl<C: Clock> AttendanceService<C> {
    /// Build the service, loading (or initializing) the admin config to size
    /// the cooldown window.
    pub fn with_clock(kv: Arc<dyn KeyValueStore>, clock: C) -> ServiceResult<Self> {
        let config = ConfigStore::new(kv.clone());
        let interval = config.load()?.min_capture_interval_minutes;
        let ledger = Arc::new(AttendanceLedger::new(kv.clone()));
        let session = AttendanceSession::new(CooldownController::new(interval), ledger.clone(), clock);

        Ok(Self {
            faces: EmbeddingStore::new(kv.clone()),
            config,
            ledger,
            session,
            kv,
        })
    }

    /// Override the match distance threshold (default 0.6).
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.session = self.session.with_threshold(threshold);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.session.threshold()
    }

    pub fn faces(&self) -> &EmbeddingStore {
        &self.faces
    }

    pub fn ledger(&self) -> &AttendanceLedger {
        &self.ledger
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config
    }

    pub fn cooldown(&self) -> &CooldownController {
        self.session.cooldown()
    }

    // --- Registration -------------------------------------------------------

    pub fn register(&self, id: &str, name: &str, embedding: Embedding) -> ServiceResult<()> {
        Ok(self.faces.register(id, name, embedding)?)
    }

    /// Register from a frame's detections; exactly one face must be present.
    pub fn register_from_detections(
        &self,
        id: &str,
        name: &str,
        detections: &[Detection],
    ) -> ServiceResult<()> {
        match detections {
            [] => Err(ServiceError::NoFaceDetected),
            [only] => self.register(id, name, only.embedding.clone()),
            many => Err(ServiceError::MultipleFaces(many.len())),
        }
    }

    pub fn list_faces(&self) -> ServiceResult<Vec<RegisteredIdentity>> {
        Ok(self.faces.list()?)
    }

    pub fn rename_face(&self, id: &str, new_name: &str) -> ServiceResult<bool> {
        Ok(self.faces.rename(id, new_name)?)
    }

    pub fn delete_face(&self, id: &str) -> ServiceResult<bool> {
        Ok(self.faces.delete(id)?)
    }

    // --- Attendance ---------------------------------------------------------

    /// Run one attendance pass over a frame's detections.
    ///
    /// The gallery and the cooldown window are re-read on every pass so they
    /// reflect changes made through any handle on the same store.
    pub fn mark_attendance(&mut self, detections: &[Detection]) -> ServiceResult<BatchReport> {
        if detections.is_empty() {
            return Err(SessionError::NoFaceDetected.into());
        }
        let candidates = self.faces.list()?;
        if candidates.is_empty() {
            return Err(ServiceError::NoFacesRegistered);
        }

        let interval = self.config.load()?.min_capture_interval_minutes;
        let cooldown = self.session.cooldown_mut();
        if cooldown.min_interval_minutes() != interval {
            tracing::info!(minutes = interval, "cooldown window changed");
            cooldown.set_min_interval(interval);
        }

        let batch: Vec<Embedding> = detections.iter().map(|d| d.embedding.clone()).collect();
        Ok(self.session.process_now(&batch, &candidates)?)
    }

    pub fn attendance_logs(&self, filter: Option<&str>) -> ServiceResult<Vec<String>> {
        Ok(self.ledger.list(filter)?)
    }

    pub fn edit_log(&self, old: &str, new: &str) -> ServiceResult<bool> {
        Ok(self.ledger.edit(old, new)?)
    }

    pub fn delete_log(&self, value: &str) -> ServiceResult<bool> {
        Ok(self.ledger.delete(value)?)
    }

    /// CSV report of the (optionally filtered) ledger.
    pub fn export_csv(&self, filter: Option<&str>) -> ServiceResult<String> {
        let logs = self.ledger.list(filter)?;
        Ok(csv_export::to_csv(&logs)?)
    }

    // --- Admin --------------------------------------------------------------

    pub fn config(&self) -> ServiceResult<AdminConfig> {
        Ok(self.config.load()?)
    }

    pub fn login(&self, username: &str, password: &PlaintextPassword) -> ServiceResult<bool> {
        let ok = self.config.verify_login(username, password)?;
        if ok {
            tracing::info!(username, "admin logged in");
        } else {
            tracing::warn!(username, "admin login rejected");
        }
        Ok(ok)
    }

    /// Save the cooldown window and apply it to subsequent passes.
    pub fn save_interval(&mut self, minutes: u32) -> ServiceResult<AdminConfig> {
        let config = self.config.save_interval(minutes)?;
        self.session.cooldown_mut().set_min_interval(minutes);
        Ok(config)
    }

    pub fn change_credentials(
        &self,
        current: &PlaintextPassword,
        new_username: Option<&str>,
        new_password: Option<&PlaintextPassword>,
    ) -> ServiceResult<AdminConfig> {
        Ok(self.config.change_credentials(current, new_username, new_password)?)
    }

    // --- Backup -------------------------------------------------------------

    /// Pretty-printed backup document of faces, config and ledger.
    pub fn export_backup(&self) -> ServiceResult<String> {
        let document = BackupCodec::export(
            &self.faces.list()?,
            &self.config.load()?,
            &self.ledger.list(None)?,
        );
        Ok(BackupCodec::encode(&document)?)
    }

    /// Replace all persisted state with the contents of a backup.
    ///
    /// Destructive: the caller must have confirmed with the operator. The
    /// document is fully validated before anything is written.
    pub fn restore_backup(&mut self, text: &str) -> ServiceResult<()> {
        let BackupContents {
            faces,
            config,
            ledger,
        } = BackupCodec::import(text)?;

        self.faces.replace_all(&faces)?;
        self.config.save(&config)?;
        self.ledger.replace_all(&ledger)?;

        self.reset_cooldown(config.min_capture_interval_minutes);
        tracing::info!(
            faces = faces.len(),
            records = ledger.len(),
            "restored from backup"
        );
        Ok(())
    }

    /// Remove every persisted key. Defaults are re-created on next load.
    pub fn reset_all(&mut self) -> ServiceResult<()> {
        for key in StoreKey::ALL {
            self.kv.remove(key)?;
        }
        let interval = self.config.load()?.min_capture_interval_minutes;
        self.reset_cooldown(interval);
        tracing::info!("all data reset");
        Ok(())
    }

    fn reset_cooldown(&mut self, interval: u32) {
        let cooldown = self.session.cooldown_mut();
        cooldown.clear();
        cooldown.set_min_interval(interval);
    }
}
