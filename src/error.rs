//! Error types for promptsmith operations.
//!
//! Defines error types for the major subsystems:
//! - LLM API interactions (judge and generation calls)
//! - Embedding and vector math
//! - Prompt record storage
//! - The optimization run itself

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: LITELLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors that can occur while producing or comparing embeddings.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding service returned no vector")]
    Empty,

    #[error("Embedding transport failed: {0}")]
    Transport(String),
}

impl From<LlmError> for EmbeddingError {
    fn from(err: LlmError) -> Self {
        EmbeddingError::Transport(err.to_string())
    }
}

/// Errors that can occur in the prompt record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record '{0}' not found")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// The single error surfaced by an optimization run.
///
/// Judge malformation, empty generations and retrieval outages are all
/// recovered inside the run; only a failed transport call escapes.
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("Transport failure during {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: LlmError,
    },
}

impl OptimizerError {
    /// Wraps an LLM transport error with the stage that issued the call.
    pub fn transport(operation: &'static str, source: LlmError) -> Self {
        OptimizerError::Transport { operation, source }
    }

    /// Name of the stage whose call failed.
    pub fn operation(&self) -> &'static str {
        match self {
            OptimizerError::Transport { operation, .. } => operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_error_names_operation() {
        let err = OptimizerError::transport(
            "baseline scoring",
            LlmError::RequestFailed("connection refused".to_string()),
        );
        assert_eq!(err.operation(), "baseline scoring");
        let msg = err.to_string();
        assert!(msg.contains("baseline scoring"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_embedding_error_from_llm_error() {
        let err: EmbeddingError = LlmError::RateLimited("slow down".to_string()).into();
        assert!(matches!(err, EmbeddingError::Transport(_)));
    }
}
