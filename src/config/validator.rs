use crate::config::{parse_duration, Config, SCHEMA_VERSION};
use crate::error::{RegconError, Result, ValidationError};
use crate::pipeline::Mode;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_knowledge_base(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_pipeline(config, &mut errors);

        if config.batch.max_concurrent == 0 {
            errors.push(ValidationError::new(
                "batch.max_concurrent",
                "At least one concurrent question is required",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RegconError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is not checked: paths may start with ~ and are created on demand
        for (path, value) in [
            ("storage.data_dir", &config.storage.data_dir),
            ("storage.artifacts_dir", &config.storage.artifacts_dir),
            ("storage.logs_dir", &config.storage.logs_dir),
        ] {
            if value.as_os_str().is_empty() {
                errors.push(ValidationError::new(path, "Path cannot be empty"));
            }
        }
    }

    fn validate_knowledge_base(config: &Config, errors: &mut Vec<ValidationError>) {
        let kb = &config.knowledge_base;

        if kb.raw_documents.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "knowledge_base.raw_documents",
                "Raw documents path cannot be empty",
            ));
        }

        if kb.chunk_size == 0 {
            errors.push(ValidationError::new(
                "knowledge_base.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        if kb.chunk_overlap >= kb.chunk_size {
            errors.push(ValidationError::new(
                "knowledge_base.chunk_overlap",
                format!(
                    "Chunk overlap ({}) must be smaller than chunk size ({})",
                    kb.chunk_overlap, kb.chunk_size
                ),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let mode = &config.embedding.mode;
        if mode != "offline" && mode != "online" {
            errors.push(ValidationError::new(
                "embedding.mode",
                format!("Mode must be 'offline' or 'online', got '{}'", mode),
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        for (path, temp) in [
            ("llm.temperature", config.llm.temperature),
            ("llm.expansion_temperature", config.llm.expansion_temperature),
        ] {
            if !(0.0..=2.0).contains(&temp) {
                errors.push(ValidationError::new(
                    path,
                    format!("Temperature must be between 0.0 and 2.0, got {}", temp),
                ));
            }
        }

        let valid_providers = ["openrouter", "openai", "ollama"];
        if !valid_providers.contains(&config.llm.provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, config.llm.provider
                ),
            ));
        }

        if !config.llm.base_url.starts_with("http://") && !config.llm.base_url.starts_with("https://")
        {
            errors.push(ValidationError::new(
                "llm.base_url",
                format!("Base URL must be http(s), got '{}'", config.llm.base_url),
            ));
        }

        if config.llm.api_key_env.is_empty() {
            errors.push(ValidationError::new(
                "llm.api_key_env",
                "API key environment variable name cannot be empty",
            ));
        }

        match parse_duration(&config.llm.request_timeout) {
            Some(timeout) if !timeout.is_zero() => {}
            _ => errors.push(ValidationError::new(
                "llm.request_timeout",
                format!("Invalid duration format: {}", config.llm.request_timeout),
            )),
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.k_final_chunks == 0 {
            errors.push(ValidationError::new(
                "retrieval.k_final_chunks",
                "Final context size must be greater than 0",
            ));
        }

        if retrieval.retrieval_k_for_rerank < retrieval.k_final_chunks {
            errors.push(ValidationError::new(
                "retrieval.retrieval_k_for_rerank",
                format!(
                    "Rerank width ({}) must be at least the final context size ({})",
                    retrieval.retrieval_k_for_rerank, retrieval.k_final_chunks
                ),
            ));
        }

        if retrieval.query_embedding_batch_size == 0 {
            errors.push(ValidationError::new(
                "retrieval.query_embedding_batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if retrieval.use_reranker && retrieval.reranker_model.is_empty() {
            errors.push(ValidationError::new(
                "retrieval.reranker_model",
                "Reranker model cannot be empty when reranking is enabled",
            ));
        }
    }

    fn validate_pipeline(config: &Config, errors: &mut Vec<ValidationError>) {
        let pipeline = &config.pipeline;

        if !(0.0..=1.0).contains(&pipeline.finish_threshold) {
            errors.push(ValidationError::new(
                "pipeline.finish_threshold",
                format!(
                    "Threshold must be between 0.0 and 1.0, got {}",
                    pipeline.finish_threshold
                ),
            ));
        }

        let mode: Mode = match pipeline.mode.parse() {
            Ok(mode) => mode,
            Err(_) => {
                errors.push(ValidationError::new(
                    "pipeline.mode",
                    format!("Mode must be 'refine' or 'reflect', got '{}'", pipeline.mode),
                ));
                return;
            }
        };

        let required = mode.minimum_steps(pipeline.max_refine_cycles, pipeline.max_search_cycles);
        if pipeline.step_ceiling < required {
            errors.push(ValidationError::new(
                "pipeline.step_ceiling",
                format!(
                    "Step ceiling {} is below the {} steps {} mode needs to reach its cycle limit",
                    pipeline.step_ceiling, required, mode
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_for(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(RegconError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(ConfigValidator::validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_invalid_mode() {
        let mut config = Config::default();
        config.embedding.mode = "invalid".to_string();
        config.pipeline.mode = "loop".to_string();
        let errors = errors_for(&config);
        assert!(errors.contains(&"embedding.mode".to_string()));
        assert!(errors.contains(&"pipeline.mode".to_string()));
    }

    #[test]
    fn test_rerank_width_below_k() {
        let mut config = Config::default();
        config.retrieval.k_final_chunks = 10;
        config.retrieval.retrieval_k_for_rerank = 5;
        assert_eq!(errors_for(&config), vec!["retrieval.retrieval_k_for_rerank"]);
    }

    #[test]
    fn test_overlap_and_threshold_collected_together() {
        let mut config = Config::default();
        config.knowledge_base.chunk_overlap = 1500;
        config.pipeline.finish_threshold = 1.5;
        let errors = errors_for(&config);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_step_ceiling_must_cover_cycles() {
        let mut config = Config::default();
        config.pipeline.mode = "reflect".to_string();
        config.pipeline.max_search_cycles = 10;
        config.pipeline.step_ceiling = 20;
        assert_eq!(errors_for(&config), vec!["pipeline.step_ceiling"]);

        config.pipeline.step_ceiling = 45;
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}
