use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of components in a face embedding produced by the embedding provider.
pub const EMBEDDING_DIM: usize = 128;

/// Euclidean distance at or below which a query is considered the same person.
/// Tuned to the embedding model's distance distribution.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Label reported for queries that match no registered identity.
pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("expected {expected}-dim embedding, got {actual}")]
    WrongDimension { expected: usize, actual: usize },
}

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Face embedding vector (always [`EMBEDDING_DIM`] components).
///
/// Serializes as a bare JSON array of numbers. Deserialization rejects
/// arrays of the wrong length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.len() != EMBEDDING_DIM {
            return Err(EmbeddingError::WrongDimension {
                expected: EMBEDDING_DIM,
                actual: values.len(),
            });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = EmbeddingError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.values
    }
}

/// A registered person: unique id, display name and reference embedding.
///
/// The embedding is stored under `descriptor` to stay compatible with
/// existing exports; `embedding` is accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredIdentity {
    pub id: String,
    pub name: String,
    #[serde(rename = "descriptor", alias = "embedding")]
    pub embedding: Embedding,
}

/// Outcome label of a match: a registered id or "unknown".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchLabel {
    Known(String),
    Unknown,
}

impl MatchLabel {
    pub fn as_str(&self) -> &str {
        match self {
            MatchLabel::Known(id) => id,
            MatchLabel::Unknown => UNKNOWN_LABEL,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, MatchLabel::Unknown)
    }
}

impl fmt::Display for MatchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of matching a query embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub label: MatchLabel,
    /// Euclidean distance to the closest candidate (infinite for an empty gallery).
    pub distance: f32,
}

/// Strategy for comparing a query embedding against a gallery of registered faces.
pub trait Matcher {
    fn compare(
        &self,
        query: &Embedding,
        gallery: &[RegisteredIdentity],
        threshold: f32,
    ) -> MatchResult;
}

/// Nearest-neighbour matcher over Euclidean distance.
///
/// Pure function of its inputs: nothing is cached between calls, so every
/// call sees the gallery snapshot it is handed.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        query: &Embedding,
        gallery: &[RegisteredIdentity],
        threshold: f32,
    ) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        // Strict `<` keeps the first candidate on ties.
        for (i, identity) in gallery.iter().enumerate() {
            let dist = query.euclidean_distance(&identity.embedding);
            if best_idx.is_none() || dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= threshold => MatchResult {
                label: MatchLabel::Known(gallery[idx].id.clone()),
                distance: best_dist,
            },
            _ => MatchResult {
                label: MatchLabel::Unknown,
                distance: best_dist,
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// 128-dim embedding with `head` in the leading components and zeros elsewhere.
    pub fn embedding(head: &[f32]) -> Embedding {
        let mut values = vec![0.0; EMBEDDING_DIM];
        values[..head.len()].copy_from_slice(head);
        Embedding::new(values).unwrap()
    }

    pub fn identity(id: &str, name: &str, head: &[f32]) -> RegisteredIdentity {
        RegisteredIdentity {
            id: id.into(),
            name: name.into(),
            embedding: embedding(head),
        }
    }
}
