//! Error types for reviewer matching.

use thiserror::Error;

use crate::model::ReviewerId;

/// Result type alias for matching operations.
pub type Result<T> = std::result::Result<T, MatchError>;

/// Errors a caller can see. Embedding and narrative failures never surface
/// here; they degrade to "no evidence" or a template narrative.
#[derive(Error, Debug)]
pub enum MatchError {
    /// Every topic field is blank.
    #[error("topic has no text to match against")]
    EmptyTopic,

    /// No candidates were supplied.
    #[error("candidate pool is empty")]
    EmptyCandidatePool,

    /// Reviewer not present in the candidate pool.
    #[error("reviewer not found: {0}")]
    ReviewerNotFound(ReviewerId),

    /// Topic not known to the topic repository.
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] capstone_embeddings::EmbeddingError),
}
