//! Assembly of the answering system from configuration
//!
//! Loads (or builds) the knowledge base, creates the capability clients and
//! wires them into an [`Orchestrator`]. Index construction completes here,
//! before any question is answered.

use crate::config::Config;
use crate::embedding::{EmbeddingProvider, FastEmbedProvider, RemoteEmbeddingProvider, VectorSearch};
use crate::error::{RegconError, Result};
use crate::knowledge::{ArtifactStore, ChunkStore, KnowledgeBase, KnowledgeBaseBuilder};
use crate::llm::{GenerationClient, OpenAiClient};
use crate::pipeline::{Orchestrator, Stages};
use crate::retrieval::{CrossEncoderReranker, RerankProvider, Retriever};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) else {
        return Ok(path.to_path_buf());
    };

    let home = dirs::home_dir()
        .ok_or_else(|| RegconError::Config("Cannot determine home directory".to_string()))?;
    Ok(home.join(rest))
}

/// Create the embedding provider for the configured mode
pub fn embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;

    if embedding.is_online() {
        let provider = RemoteEmbeddingProvider::new(
            config.llm.base_url.clone(),
            config.llm.api_key()?,
            embedding.model.clone(),
            embedding.dimension,
            config.llm.timeout()?,
        )?;
        info!("Using remote embeddings: {}", embedding.model);
        Ok(Arc::new(provider))
    } else {
        let provider = FastEmbedProvider::new(&embedding.model)?;
        info!(
            "Using local embeddings: {} ({}D)",
            embedding.model,
            provider.dimension()
        );
        Ok(Arc::new(provider))
    }
}

pub fn generation_client(config: &Config) -> Result<Arc<dyn GenerationClient>> {
    let client = OpenAiClient::new(
        config.llm.base_url.clone(),
        config.llm.api_key()?,
        config.llm.model.clone(),
        config.llm.timeout()?,
    )?;
    info!("Using {} generation: {}", config.llm.provider, config.llm.model);
    Ok(Arc::new(client))
}

fn reranker(config: &Config) -> Option<Arc<dyn RerankProvider>> {
    if !config.retrieval.use_reranker {
        return None;
    }

    match CrossEncoderReranker::new(&config.retrieval.reranker_model) {
        Ok(reranker) => Some(Arc::new(reranker)),
        Err(e) => {
            warn!("Reranker unavailable, continuing without it: {}", e);
            None
        }
    }
}

/// Knowledge base lifecycle: load persisted artifacts or rebuild them
pub struct KnowledgeBaseManager<'a> {
    config: &'a Config,
    provider: Arc<dyn EmbeddingProvider>,
    artifacts: ArtifactStore,
    raw_documents: PathBuf,
}

impl<'a> KnowledgeBaseManager<'a> {
    pub fn new(config: &'a Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Ok(Self {
            config,
            provider,
            artifacts: ArtifactStore::new(expand_path(&config.storage.artifacts_dir)?),
            raw_documents: expand_path(&config.knowledge_base.raw_documents)?,
        })
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Whether startup should rebuild instead of loading
    pub fn needs_rebuild(&self) -> bool {
        let kb = &self.config.knowledge_base;

        if !kb.use_local_artifacts || !self.artifacts.exists() {
            return true;
        }
        if kb.rebuild_if_stale && self.artifacts.is_stale(&self.raw_documents) {
            info!(
                "{} is newer than the artifacts in {}",
                self.raw_documents.display(),
                self.artifacts.dir().display()
            );
            return true;
        }
        false
    }

    /// Build from the raw documents, persisting when configured
    pub fn build(&self) -> Result<KnowledgeBase> {
        let kb_config = &self.config.knowledge_base;
        let builder = KnowledgeBaseBuilder::new(
            Arc::clone(&self.provider),
            kb_config.chunk_size,
            kb_config.chunk_overlap,
            self.config.embedding.batch_size,
        );

        let knowledge_base = builder.build_from_file(&self.raw_documents)?;
        if kb_config.save_artifacts {
            self.artifacts.save(&knowledge_base)?;
        }
        Ok(knowledge_base)
    }

    /// Load artifacts, rebuilding when missing, stale or disabled
    pub fn load_or_build(&self, force_rebuild: bool) -> Result<KnowledgeBase> {
        if force_rebuild || self.needs_rebuild() {
            return self.build();
        }

        let knowledge_base = self.artifacts.load()?;
        if knowledge_base.embedding_model != self.provider.model_name() {
            warn!(
                "Artifacts were embedded with {} but queries use {}; rebuild with `regcon build --force`",
                knowledge_base.embedding_model,
                self.provider.model_name()
            );
        }
        if knowledge_base.dimension != self.provider.dimension() {
            return Err(RegconError::Artifacts(format!(
                "Artifacts have dimension {} but the embedding model produces {}",
                knowledge_base.dimension,
                self.provider.dimension()
            )));
        }
        Ok(knowledge_base)
    }
}

/// The assembled answering system
pub struct Consultant {
    orchestrator: Arc<Orchestrator>,
    chunk_count: usize,
}

impl Consultant {
    /// Build every component from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = embedding_provider(config)?;
        let knowledge_base = KnowledgeBaseManager::new(config, Arc::clone(&provider))?
            .load_or_build(false)?;
        let llm = generation_client(config)?;

        Self::assemble(config, provider, llm, knowledge_base)
    }

    /// Wire already-created capabilities around a knowledge base
    pub fn assemble(
        config: &Config,
        provider: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn GenerationClient>,
        knowledge_base: KnowledgeBase,
    ) -> Result<Self> {
        let index: Arc<dyn VectorSearch> = knowledge_base.build_index(&config.indexing)?;
        let (chunks, _vectors) = knowledge_base.into_parts();
        let store: Arc<ChunkStore> = Arc::new(chunks);
        let chunk_count = store.len();

        let retriever = Retriever::new(
            provider,
            index,
            store,
            reranker(config),
            config.retrieval.settings(),
        );
        let stages = Stages::new(llm, Arc::new(retriever), config.stage_settings());
        let orchestrator = Orchestrator::new(stages, config.pipeline.settings()?);

        info!(
            "Consultant ready: {} chunks, {} mode, model {}",
            chunk_count, config.pipeline.mode, config.llm.model
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            chunk_count,
        })
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn answer(&self, question: &str) -> String {
        self.orchestrator.answer(question)
    }
}
