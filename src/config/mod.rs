//! Configuration management for regcon
//!
//! Loads the TOML configuration, applies profile and environment overrides and
//! validates the result before anything is built from it.

use crate::error::{RegconError, Result};
use crate::pipeline::{Mode, OrchestratorSettings, StageSettings};
use crate::retrieval::RetrievalSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub knowledge_base: KnowledgeBaseConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub logs_dir: PathBuf,
}

/// Knowledge base construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    /// JSONL file of raw documents
    pub raw_documents: PathBuf,
    /// Chunk size in characters
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Rebuild artifacts when the raw documents are newer
    pub rebuild_if_stale: bool,
    /// Load artifacts from disk instead of rebuilding at startup
    pub use_local_artifacts: bool,
    /// Persist freshly built artifacts
    pub save_artifacts: bool,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub mode: String, // "online" or "offline"
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
}

impl EmbeddingConfig {
    pub fn is_online(&self) -> bool {
        self.mode == "online"
    }
}

/// Generation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    /// Temperature for answers, hypothetical answers, grading and reflection
    pub temperature: f32,
    /// Temperature for query expansion
    pub expansion_temperature: f32,
    pub request_timeout: String,
}

impl LlmConfig {
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(&self.request_timeout).ok_or_else(|| RegconError::InvalidConfigValue {
            path: "llm.request_timeout".to_string(),
            message: format!("Invalid duration format: {}", self.request_timeout),
        })
    }

    /// A local Ollama server takes no key
    pub fn requires_api_key(&self) -> bool {
        self.provider != "ollama"
    }

    /// Read the API key from the configured environment variable
    ///
    /// Providers that take no key get an empty one when the variable is unset.
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ if !self.requires_api_key() => Ok(String::new()),
            _ => Err(RegconError::Config(format!(
                "Environment variable {} is not set",
                self.api_key_env
            ))),
        }
    }
}

/// Vector index implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Exact search over every vector
    Flat,
    Hnsw,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub kind: IndexKind,
    pub hnsw_ef_construction: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_search: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            kind: IndexKind::Flat,
            hnsw_ef_construction: 200,
            hnsw_m: 16,
            hnsw_ef_search: 64,
        }
    }
}

/// Retrieval & rerank configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub k_final_chunks: usize,
    pub use_reranker: bool,
    pub retrieval_k_for_rerank: usize,
    pub query_embedding_batch_size: usize,
    pub reranker_model: String,
}

impl RetrievalConfig {
    pub fn settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            use_reranker: self.use_reranker,
            retrieval_k_for_rerank: self.retrieval_k_for_rerank,
            k_final_chunks: self.k_final_chunks,
            embedding_batch_size: self.query_embedding_batch_size,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub mode: String, // "refine" or "reflect"
    pub expansion_count: usize,
    pub finish_threshold: f32,
    pub max_refine_cycles: u32,
    pub max_search_cycles: u32,
    /// Hard cap on executed nodes per question
    pub step_ceiling: u32,
}

impl PipelineConfig {
    pub fn mode(&self) -> Result<Mode> {
        self.mode.parse().map_err(|_| RegconError::InvalidConfigValue {
            path: "pipeline.mode".to_string(),
            message: format!("Mode must be 'refine' or 'reflect', got '{}'", self.mode),
        })
    }

    pub fn settings(&self) -> Result<OrchestratorSettings> {
        Ok(OrchestratorSettings {
            mode: self.mode()?,
            finish_threshold: self.finish_threshold,
            max_refine_cycles: self.max_refine_cycles,
            max_search_cycles: self.max_search_cycles,
            step_ceiling: self.step_ceiling,
        })
    }
}

/// Batch worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_reranker: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k_final_chunks: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RegconError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RegconError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RegconError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RegconError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Load from `path`, or start from defaults when the file is absent
    ///
    /// A requested profile must exist either way.
    pub fn load_or_default(path: &Path, profile: Option<&str>) -> Result<Self> {
        if path.exists() {
            return match profile {
                Some(profile) => Self::load_with_profile(path, profile),
                None => Self::load(path),
            };
        }

        tracing::warn!(
            "Config file not found, using defaults. Run 'regcon config init' to create one."
        );
        let mut config = Self::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(profile)?;
        }
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| RegconError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(mode) = overrides.pipeline_mode {
            self.pipeline.mode = mode;
        }
        if let Some(mode) = overrides.embedding_mode {
            self.embedding.mode = mode;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(use_reranker) = overrides.use_reranker {
            self.retrieval.use_reranker = use_reranker;
        }
        if let Some(k) = overrides.k_final_chunks {
            self.retrieval.k_final_chunks = k;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: REGCON_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("REGCON_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__BASE_URL" => self.llm.base_url = value.to_string(),
            "LLM__TEMPERATURE" => self.llm.temperature = parse_value(path, value)?,
            "EMBEDDING__MODE" => self.embedding.mode = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "PIPELINE__MODE" => self.pipeline.mode = value.to_string(),
            "PIPELINE__FINISH_THRESHOLD" => {
                self.pipeline.finish_threshold = parse_value(path, value)?
            }
            "RETRIEVAL__USE_RERANKER" => self.retrieval.use_reranker = parse_value(path, value)?,
            "RETRIEVAL__K_FINAL_CHUNKS" => {
                self.retrieval.k_final_chunks = parse_value(path, value)?
            }
            "BATCH__MAX_CONCURRENT" => self.batch.max_concurrent = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RegconError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("regcon").join("config.toml"))
    }

    pub fn stage_settings(&self) -> StageSettings {
        StageSettings {
            expansion_count: self.pipeline.expansion_count,
            temperature: self.llm.temperature,
            expansion_temperature: self.llm.expansion_temperature,
        }
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| RegconError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Parse duration strings like "30s", "2m", "1h" or plain seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (number, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => s.split_at(split),
        None => (s, "s"),
    };
    let value: u64 = number.parse().ok()?;

    let seconds = match unit {
        "s" => value,
        "m" => value.checked_mul(60)?,
        "h" => value.checked_mul(3600)?,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.regcon");

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: data_dir.clone(),
                artifacts_dir: data_dir.join("artifacts"),
                logs_dir: data_dir.join("logs"),
            },
            knowledge_base: KnowledgeBaseConfig {
                raw_documents: data_dir.join("raw_documents.jsonl"),
                chunk_size: 1500,
                chunk_overlap: 200,
                rebuild_if_stale: true,
                use_local_artifacts: true,
                save_artifacts: true,
            },
            embedding: EmbeddingConfig {
                mode: "online".to_string(),
                model: "openai/text-embedding-3-small".to_string(),
                dimension: 1536,
                batch_size: 32,
            },
            llm: LlmConfig {
                provider: "openrouter".to_string(),
                base_url: "https://openrouter.ai/api/v1".to_string(),
                api_key_env: "OPENROUTER_API_KEY".to_string(),
                model: "mistralai/mistral-small-3.2-24b-instruct".to_string(),
                temperature: 0.0,
                expansion_temperature: 0.8,
                request_timeout: "60s".to_string(),
            },
            indexing: IndexingConfig::default(),
            retrieval: RetrievalConfig {
                k_final_chunks: 7,
                use_reranker: false,
                retrieval_k_for_rerank: 20,
                query_embedding_batch_size: 10,
                reranker_model: "BAAI/bge-reranker-base".to_string(),
            },
            pipeline: PipelineConfig {
                mode: "refine".to_string(),
                expansion_count: 3,
                finish_threshold: 0.8,
                max_refine_cycles: 2,
                max_search_cycles: 2,
                step_ceiling: 25,
            },
            batch: BatchConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.pipeline.mode = "reflect".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.pipeline.mode().unwrap(), Mode::Reflect);
        assert_eq!(loaded.retrieval.k_final_chunks, 7);
        assert_eq!(loaded.indexing.kind, IndexKind::Flat);
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(&temp.path().join("absent.toml"));
        assert!(matches!(result, Err(RegconError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_missing_file_with_unknown_profile() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.toml");

        let result = Config::load_or_default(&path, Some("thorough"));
        assert!(matches!(
            result,
            Err(RegconError::Config(ref message)) if message == "Unknown profile: thorough"
        ));
        assert!(Config::load_or_default(&path, None).is_ok());
    }

    #[test]
    fn test_file_profile_applied() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.profiles.insert(
            "thorough".to_string(),
            ProfileOverrides {
                pipeline_mode: Some("reflect".to_string()),
                ..Default::default()
            },
        );
        config.save(&path).unwrap();

        let loaded = Config::load_or_default(&path, Some("thorough")).unwrap();
        assert_eq!(loaded.pipeline.mode, "reflect");
        assert!(Config::load_or_default(&path, Some("fast")).is_err());
    }

    #[test]
    fn test_ollama_needs_no_api_key() {
        let mut llm = Config::default().llm;
        llm.api_key_env = "UNSET_TEST_LLM_KEY".to_string();

        llm.provider = "ollama".to_string();
        assert_eq!(llm.api_key().unwrap(), "");

        llm.provider = "openai".to_string();
        assert!(llm.api_key().is_err());
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.profiles.insert(
            "thorough".to_string(),
            ProfileOverrides {
                pipeline_mode: Some("reflect".to_string()),
                use_reranker: Some(true),
                ..Default::default()
            },
        );

        config.apply_profile("thorough").unwrap();
        assert_eq!(config.pipeline.mode, "reflect");
        assert!(config.retrieval.use_reranker);
        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_env_override_parsing() {
        let mut config = Config::default();
        config.set_value_from_env("RETRIEVAL__K_FINAL_CHUNKS", "5").unwrap();
        config.set_value_from_env("PIPELINE__MODE", "reflect").unwrap();
        assert_eq!(config.retrieval.k_final_chunks, 5);
        assert_eq!(config.pipeline.mode, "reflect");
        assert!(config.set_value_from_env("BATCH__MAX_CONCURRENT", "many").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("5d"), None);
    }
}
