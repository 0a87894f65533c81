//! Seam to the external face detection / embedding provider.

use crate::types::{BoundingBox, Embedding};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),
    #[error("malformed detection payload: {0}")]
    Malformed(String),
}

/// One face found in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "boundingBox", alias = "bounding_box", default)]
    pub bounding_box: BoundingBox,
    pub embedding: Embedding,
}

/// Source of per-frame detections (camera + detector + embedding model).
///
/// Each call pulls one frame and returns zero or more detections.
/// Dropping the provider releases the capture device.
pub trait EmbeddingProvider: Send {
    fn detect(&mut self) -> Result<Vec<Detection>, ProviderError>;
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<P> {
    fn detect(&mut self) -> Result<Vec<Detection>, ProviderError> {
        (**self).detect()
    }
}
