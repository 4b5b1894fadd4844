//! Cross-encoder reranking

use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Relevance ordering of candidate passages against a query
pub trait RerankProvider: Send + Sync {
    /// Score `documents` against `query`
    ///
    /// Returns `(document index, relevance score)` pairs, sorted by score descending.
    fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<(usize, f32)>, RerankError>;

    fn model_name(&self) -> &str;
}

/// Local cross-encoder reranker
pub struct CrossEncoderReranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl CrossEncoderReranker {
    /// Create a new reranker with specified model
    ///
    /// # Arguments
    /// * `model_name` - "BAAI/bge-reranker-base" or "jinaai/jina-reranker-v1-turbo-en"
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        let reranker_model = match model_name {
            "BAAI/bge-reranker-base" | "bge-reranker-base" => RerankerModel::BGERerankerBase,
            "jinaai/jina-reranker-v1-turbo-en" => RerankerModel::JINARerankerV1TurboEn,
            _ => {
                return Err(RerankError::InitializationError(format!(
                    "Unsupported reranker model: {}",
                    model_name
                )))
            }
        };

        tracing::info!("Initializing reranker model: {}", model_name);

        let init_options = RerankInitOptions::new(reranker_model).with_show_download_progress(true);

        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }

    /// Create reranker with default model
    pub fn with_default_model() -> Result<Self, RerankError> {
        Self::new("BAAI/bge-reranker-base")
    }
}

impl RerankProvider for CrossEncoderReranker {
    fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<(usize, f32)>, RerankError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        if query.is_empty() {
            return Err(RerankError::InvalidInput(
                "Query cannot be empty".to_string(),
            ));
        }

        let documents: Vec<&str> = documents.iter().map(|s| s.as_str()).collect();

        let results = self
            .model
            .rerank(query, documents, false, None)
            .map_err(|e| RerankError::RerankingError(e.to_string()))?;

        let mut scored: Vec<(usize, f32)> =
            results.into_iter().map(|r| (r.index, r.score)).collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
