//! Knowledge base: chunk store, embeddings and their persisted artifacts
//!
//! Chunk position N and vector N always describe the same passage; every
//! constructor checks that the two sequences are in lockstep.

mod artifacts;
mod builder;
mod documents;
mod splitter;
mod store;

pub use artifacts::{ArtifactManifest, ArtifactStore};
pub use builder::KnowledgeBaseBuilder;
pub use documents::{load_raw_documents, DocumentMetadata, RawDocument};
pub use splitter::TextSplitter;
pub use store::ChunkStore;

use crate::config::{IndexKind, IndexingConfig};
use crate::embedding::{FlatIndex, VectorIndex, VectorSearch};
use crate::error::{RegconError, Result};
use std::sync::Arc;

/// Chunks with their embeddings, position-aligned
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    pub chunks: ChunkStore,
    pub vectors: Vec<Vec<f32>>,
    pub embedding_model: String,
    pub dimension: usize,
}

impl KnowledgeBase {
    pub fn new(
        chunks: Vec<String>,
        vectors: Vec<Vec<f32>>,
        embedding_model: String,
        dimension: usize,
    ) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(RegconError::ArtifactMismatch {
                vectors: vectors.len(),
                chunks: chunks.len(),
                expected: chunks.len(),
            });
        }

        if let Some(bad) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(RegconError::Artifacts(format!(
                "Vector {} has dimension {}, expected {}",
                bad,
                vectors[bad].len(),
                dimension
            )));
        }

        Ok(Self {
            chunks: ChunkStore::new(chunks),
            vectors,
            embedding_model,
            dimension,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Build the in-memory search index over the vectors
    pub fn build_index(&self, indexing: &IndexingConfig) -> Result<Arc<dyn VectorSearch>> {
        let index: Arc<dyn VectorSearch> = match indexing.kind {
            IndexKind::Hnsw if !self.is_empty() => Arc::new(VectorIndex::from_vectors(
                self.dimension,
                &self.vectors,
                indexing.hnsw_ef_construction,
                indexing.hnsw_m,
                indexing.hnsw_ef_search,
            )?),
            _ => Arc::new(FlatIndex::from_vectors(self.dimension, self.vectors.clone())?),
        };

        tracing::info!(
            "Built {:?} index over {} vectors (dim {})",
            indexing.kind,
            index.len(),
            self.dimension
        );

        Ok(index)
    }

    /// Split into the shared chunk store and the raw vectors
    pub fn into_parts(self) -> (ChunkStore, Vec<Vec<f32>>) {
        (self.chunks, self.vectors)
    }
}
