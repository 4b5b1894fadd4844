use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::{EmbeddingError, VectorIndexError};
use crate::llm::LlmError;
use crate::pipeline::PipelineError;
use crate::retrieval::RerankError;

/// Main error type for regcon
#[derive(Error, Debug)]
pub enum RegconError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Knowledge base artifacts are missing or unreadable
    #[error("Artifact error: {0}")]
    Artifacts(String),

    /// Vector and chunk artifacts are out of lockstep
    #[error("Artifacts out of lockstep: {vectors} vectors, {chunks} chunks, manifest says {expected}")]
    ArtifactMismatch {
        vectors: usize,
        chunks: usize,
        expected: usize,
    },

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector index errors
    #[error("Vector index error: {0}")]
    VectorIndex(#[from] VectorIndexError),

    /// Reranker errors
    #[error("Rerank error: {0}")]
    Rerank(#[from] RerankError),

    /// Generation client errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Orchestrator errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for regcon operations
pub type Result<T> = std::result::Result<T, RegconError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn run_question(question: &str) -> Result<()> {
        if question.trim().is_empty() {
            Err(PipelineError::EmptyQuestion)?;
        }
        Ok(())
    }

    #[test]
    fn test_module_errors_convert() {
        let error = run_question("  ").unwrap_err();
        assert!(matches!(
            error,
            RegconError::Pipeline(PipelineError::EmptyQuestion)
        ));
        assert_eq!(error.to_string(), "Pipeline error: Question is empty");
        assert!(run_question("VAT rate?").is_ok());
    }
}
