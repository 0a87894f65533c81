//! presence-core - Identity matching and attendance admission engine.
//!
//! Matches query face embeddings against registered identities by Euclidean
//! distance and admits attendance events subject to a per-identity cooldown.
//! Face capture and embedding extraction live behind [`EmbeddingProvider`].

pub mod clock;
pub mod cooldown;
pub mod provider;
pub mod record;
pub mod session;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::{CooldownController, Decision};
pub use provider::{Detection, EmbeddingProvider, ProviderError};
pub use record::{AttendanceRecord, RECORD_DELIMITER};
pub use session::{AttendanceSession, BatchReport, BatchSummary, LedgerSink, Outcome, SessionError};
pub use types::{
    BoundingBox, Embedding, EmbeddingError, EuclideanMatcher, MatchLabel, MatchResult, Matcher,
    RegisteredIdentity, DEFAULT_MATCH_THRESHOLD, EMBEDDING_DIM, UNKNOWN_LABEL,
};
