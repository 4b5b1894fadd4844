//! Knowledge base build phase: raw documents -> provenance-prefixed chunks -> embeddings

use crate::embedding::{embed_in_batches_with_stats, EmbeddingProvider};
use crate::error::Result;
use crate::knowledge::{load_raw_documents, KnowledgeBase, RawDocument, TextSplitter};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct KnowledgeBaseBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    splitter: TextSplitter,
    batch_size: usize,
}

impl KnowledgeBaseBuilder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        chunk_size: usize,
        chunk_overlap: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            splitter: TextSplitter::new(chunk_size, chunk_overlap),
            batch_size,
        }
    }

    /// Split every document into chunks carrying its provenance prefix
    pub fn chunk_documents(&self, documents: &[RawDocument]) -> Vec<String> {
        let mut chunks = Vec::new();

        for document in documents {
            if document.content.trim().is_empty() {
                warn!("Skipping document {} with empty content", document.doc_id);
                continue;
            }

            let prefix = document.provenance_prefix();
            chunks.extend(
                self.splitter
                    .split(&document.content)
                    .into_iter()
                    .map(|chunk| format!("{}{}", prefix, chunk)),
            );
        }

        chunks
    }

    /// Chunk and embed documents into a new knowledge base
    pub fn build(&self, documents: &[RawDocument]) -> Result<KnowledgeBase> {
        let start = Instant::now();
        let chunks = self.chunk_documents(documents);

        info!(
            "Split {} documents into {} chunks, embedding with {}",
            documents.len(),
            chunks.len(),
            self.provider.model_name()
        );

        let (vectors, stats) =
            embed_in_batches_with_stats(self.provider.as_ref(), &chunks, self.batch_size);

        if stats.failed_batches > 0 {
            warn!(
                "{} of {} embedding batches failed; {} chunks have zero vectors and will not be retrievable",
                stats.failed_batches, stats.batches, stats.zero_filled
            );
        }

        info!(
            "Knowledge base built in {}ms",
            start.elapsed().as_millis()
        );

        KnowledgeBase::new(
            chunks,
            vectors,
            self.provider.model_name().to_string(),
            self.provider.dimension(),
        )
    }

    /// Build from a raw documents JSONL file
    pub fn build_from_file(&self, raw_documents: &Path) -> Result<KnowledgeBase> {
        let documents = load_raw_documents(raw_documents)?;
        info!(
            "Loaded {} raw documents from {}",
            documents.len(),
            raw_documents.display()
        );
        self.build(&documents)
    }
}
