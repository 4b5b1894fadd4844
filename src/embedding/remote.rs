//! OpenAI-compatible embedding service client (`online` embedding mode)

use super::provider::check_embeddings;
use super::{EmbeddingError, EmbeddingProvider};
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embedding provider backed by a remote `/embeddings` endpoint
pub struct RemoteEmbeddingProvider {
    http: HttpClient,
    base_url: String,
    api_key: String,
    model_name: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl RemoteEmbeddingProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model_name: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model_name: model_name.into(),
            dimension,
        })
    }
}

impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut embeddings = self.embed_batch(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model_name,
            input: texts,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| EmbeddingError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(EmbeddingError::RequestError(format!(
                "embedding service returned {}: {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        // The service may answer out of order
        parsed.data.sort_by_key(|item| item.index);
        let embeddings: Vec<Vec<f32>> = parsed.data.into_iter().map(|i| i.embedding).collect();

        check_embeddings(&embeddings, texts.len(), self.dimension)?;

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let provider = RemoteEmbeddingProvider::new(
            "https://openrouter.ai/api/v1/",
            "key",
            "openai/text-embedding-3-small",
            1536,
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(provider.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(provider.dimension(), 1536);
    }

    #[test]
    fn test_response_ordering() {
        let body = r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#;
        let mut parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        parsed.data.sort_by_key(|item| item.index);

        assert_eq!(parsed.data[0].embedding, vec![1.0, 0.0]);
        assert_eq!(parsed.data[1].embedding, vec![0.0, 1.0]);
    }

    #[test]
    fn test_unreachable_service_is_error() {
        let provider = RemoteEmbeddingProvider::new(
            "http://127.0.0.1:9",
            "key",
            "model",
            4,
            Duration::from_millis(200),
        )
        .unwrap();

        let result = provider.embed_batch(&["text".to_string()]);
        assert!(result.is_err());
    }
}
