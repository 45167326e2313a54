//! Error types for Offer Flux

use thiserror::Error;

/// Errors that can occur while running the attribution pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to parse input record: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Malformed payload for user {user_id} at t={timestamp}: {reason}")]
    MalformedPayload {
        user_id: String,
        timestamp: u64,
        reason: String,
    },

    #[error("Invalid identifier {0:?}: must be non-empty and must not contain the key separator")]
    InvalidIdentifier(String),

    #[error("Offer ranking mismatch: label table has {expected} names but {actual} offers were ranked")]
    RankingMismatch { expected: usize, actual: usize },

    #[error("No profile found for user {user_id}")]
    MissingJoinTarget { user_id: String },

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
