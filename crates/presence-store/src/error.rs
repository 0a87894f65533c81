use presence_core::EmbeddingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("employee with ID {0} already exists")]
    DuplicateIdentity(String),
    #[error("invalid employee id: {0:?}")]
    InvalidIdentity(String),
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(#[from] EmbeddingError),
    #[error("incorrect admin password")]
    InvalidCredentials,
    #[error("invalid backup file format: {0}")]
    InvalidFormat(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Backend(#[from] rusqlite::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("store lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
