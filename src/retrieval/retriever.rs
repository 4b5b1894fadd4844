//! Retrieval & rerank stage

use crate::embedding::{embed_in_batches, EmbeddingProvider, VectorSearch};
use crate::knowledge::ChunkStore;
use crate::retrieval::{merge_candidates, Candidate, CandidateSet, QuerySet, RerankProvider};
use ahash::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables for one retrieval pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalSettings {
    /// Send merged candidates through the reranker before truncation
    pub use_reranker: bool,
    /// Neighbours fetched per query when reranking
    pub retrieval_k_for_rerank: usize,
    /// Size of the final context set (also neighbours per query without reranking)
    pub k_final_chunks: usize,
    /// Query embedding batch size
    pub embedding_batch_size: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            use_reranker: false,
            retrieval_k_for_rerank: 20,
            k_final_chunks: 7,
            embedding_batch_size: 10,
        }
    }
}

/// Result of one retrieval pass
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// Every distinct chunk retrieved so far, in first-seen order
    pub pool: CandidateSet,
    /// Context handed to generation, at most `k_final_chunks`
    pub context: CandidateSet,
}

/// Retrieval stage over shared, read-only index handles
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorSearch>,
    store: Arc<ChunkStore>,
    reranker: Option<Arc<dyn RerankProvider>>,
    settings: RetrievalSettings,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorSearch>,
        store: Arc<ChunkStore>,
        reranker: Option<Arc<dyn RerankProvider>>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            reranker,
            settings,
        }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    fn reranker(&self) -> Option<&Arc<dyn RerankProvider>> {
        if self.settings.use_reranker {
            self.reranker.as_ref()
        } else {
            None
        }
    }

    /// Neighbours requested per query
    pub fn retrieval_width(&self) -> usize {
        if self.reranker().is_some() {
            self.settings.retrieval_k_for_rerank
        } else {
            self.settings.k_final_chunks
        }
    }

    /// Run one retrieval pass
    ///
    /// Every query in `queries` is re-embedded and searched. Hits are merged
    /// into `pool`, the chunks accumulated over earlier passes, and a context
    /// of at most `k_final_chunks` is chosen. Without the reranker, hits new to
    /// the pool get at least half of the context slots on a repeat pass. Never
    /// fails; an empty pool means nothing was found.
    pub fn retrieve(
        &self,
        question: &str,
        queries: &QuerySet,
        pool: &CandidateSet,
        context: &CandidateSet,
    ) -> Retrieval {
        let positions = self.search_positions(queries);
        debug!(
            "{} queries produced {} distinct chunk positions",
            queries.len(),
            positions.len()
        );

        let retrieved: Vec<Candidate> = positions
            .into_iter()
            .filter_map(|position| {
                self.store.get(position).map(|text| Candidate {
                    position,
                    text: text.to_string(),
                })
            })
            .collect();
        let fresh: CandidateSet = retrieved
            .iter()
            .filter(|c| !pool.contains_text(&c.text))
            .cloned()
            .collect();

        let pool = merge_candidates(pool, retrieved);
        if pool.is_empty() {
            info!("Retrieval found no candidates");
            return Retrieval::default();
        }

        let k = self.settings.k_final_chunks;
        debug!("{} new chunks, pool of {}", fresh.len(), pool.len());
        let context = match self.reranker() {
            Some(reranker) => self.rerank(reranker.as_ref(), question, pool.clone(), k),
            None => select_context(context, &fresh, k),
        };

        info!("Retrieval produced {} context chunks", context.len());
        Retrieval { pool, context }
    }

    /// Union of index hits across all queries, in first-seen order
    fn search_positions(&self, queries: &QuerySet) -> Vec<usize> {
        if queries.is_empty() {
            return Vec::new();
        }

        let embeddings = embed_in_batches(
            self.embedder.as_ref(),
            queries.as_slice(),
            self.settings.embedding_batch_size,
        );

        let rows = match self.index.search(&embeddings, self.retrieval_width()) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Vector search failed, treating as no hits: {}", e);
                return Vec::new();
            }
        };

        let mut seen = HashSet::default();
        let mut positions = Vec::new();
        for position in rows.into_iter().flatten().flatten() {
            if position >= self.store.len() {
                warn!(
                    "Index returned position {} beyond chunk store of {}",
                    position,
                    self.store.len()
                );
                continue;
            }
            if seen.insert(position) {
                positions.push(position);
            }
        }
        positions
    }

    fn rerank(
        &self,
        reranker: &dyn RerankProvider,
        question: &str,
        merged: CandidateSet,
        k: usize,
    ) -> CandidateSet {
        let documents: Vec<String> = merged.iter().map(|c| c.text.clone()).collect();

        let ranked = match reranker.rerank(question, &documents) {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!("Reranker failed, falling back to retrieval order: {}", e);
                return truncated(merged, k);
            }
        };

        let mut ranked: Vec<(usize, f32)> = ranked
            .into_iter()
            .filter(|(idx, _)| *idx < documents.len())
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let candidates = merged.as_slice();
        let reranked: CandidateSet = ranked
            .into_iter()
            .map(|(idx, _)| candidates[idx].clone())
            .take(k)
            .collect();

        if reranked.is_empty() {
            warn!("Reranker returned no usable ranking, falling back to retrieval order");
            return truncated(merged, k);
        }

        reranked
    }
}

/// Previous context first, capped so fresh hits keep `ceil(k / 2)` slots
fn select_context(previous: &CandidateSet, fresh: &CandidateSet, k: usize) -> CandidateSet {
    let reserved = if previous.is_empty() {
        k
    } else {
        fresh.len().min(k.div_ceil(2))
    };

    let mut context: CandidateSet = previous
        .iter()
        .take(k.saturating_sub(reserved))
        .cloned()
        .collect();
    for candidate in fresh.iter().chain(previous.iter()) {
        if context.len() >= k {
            break;
        }
        context.insert(candidate.position, candidate.text.clone());
    }
    context
}

fn truncated(mut candidates: CandidateSet, k: usize) -> CandidateSet {
    candidates.truncate(k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, FlatIndex};
    use crate::retrieval::RerankError;

    /// Embeds each text as a one-hot vector chosen by its first byte
    struct InitialEmbedder;

    impl EmbeddingProvider for InitialEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut v = vec![0.0; 4];
            let slot = text.bytes().next().map(|b| b as usize % 4).unwrap_or(0);
            v[slot] = 1.0;
            Ok(v)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "initial"
        }
    }

    struct ReverseReranker;

    impl RerankProvider for ReverseReranker {
        fn rerank(&self, _query: &str, documents: &[String]) -> Result<Vec<(usize, f32)>, RerankError> {
            Ok((0..documents.len()).map(|i| (i, i as f32)).collect())
        }

        fn model_name(&self) -> &str {
            "reverse"
        }
    }

    fn retriever(chunks: usize, settings: RetrievalSettings, reranker: Option<Arc<dyn RerankProvider>>) -> Retriever {
        let store: Vec<String> = (0..chunks).map(|i| format!("chunk {}", i)).collect();
        let vectors: Vec<Vec<f32>> = (0..chunks)
            .map(|i| {
                let mut v = vec![0.0; 4];
                v[i % 4] = 1.0;
                v
            })
            .collect();

        Retriever::new(
            Arc::new(InitialEmbedder),
            Arc::new(FlatIndex::from_vectors(4, vectors).unwrap()),
            Arc::new(ChunkStore::new(store)),
            reranker,
            settings,
        )
    }

    #[test]
    fn test_width_depends_on_reranker() {
        let settings = RetrievalSettings {
            use_reranker: true,
            ..Default::default()
        };
        assert_eq!(retriever(4, settings, Some(Arc::new(ReverseReranker))).retrieval_width(), 20);
        assert_eq!(retriever(4, settings, None).retrieval_width(), 7);
    }

    #[test]
    fn test_result_bounded_by_k() {
        let settings = RetrievalSettings {
            k_final_chunks: 3,
            ..Default::default()
        };
        let retriever = retriever(12, settings, None);
        let queries = QuerySet::from_question("abc");

        let context = retriever
            .retrieve("abc", &queries, &CandidateSet::new(), &CandidateSet::new())
            .context;
        assert_eq!(context.len(), 3);
    }

    #[test]
    fn test_reranker_order_applied() {
        let settings = RetrievalSettings {
            use_reranker: true,
            retrieval_k_for_rerank: 4,
            k_final_chunks: 2,
            embedding_batch_size: 10,
        };
        let retriever = retriever(4, settings, Some(Arc::new(ReverseReranker)));
        let queries = QuerySet::from_question("abc");

        let context = retriever
            .retrieve("abc", &queries, &CandidateSet::new(), &CandidateSet::new())
            .context;
        let merged_order: Vec<usize> = retriever
            .search_positions(&queries)
            .into_iter()
            .collect();

        assert_eq!(context.len(), 2);
        assert_eq!(context.as_slice()[0].position, merged_order[3]);
        assert_eq!(context.as_slice()[1].position, merged_order[2]);
    }

    #[test]
    fn test_empty_store_returns_empty() {
        let retriever = retriever(0, RetrievalSettings::default(), None);
        let retrieval = retriever.retrieve(
            "q",
            &QuerySet::from_question("q"),
            &CandidateSet::new(),
            &CandidateSet::new(),
        );
        assert!(retrieval.context.is_empty());
        assert!(retrieval.pool.is_empty());
    }
    #[test]
    fn test_repeat_pass_admits_new_hits() {
        let settings = RetrievalSettings {
            k_final_chunks: 2,
            ..Default::default()
        };
        let retriever = retriever(8, settings, None);

        // "a" is byte 97, slot 1: chunks 1 and 5
        let mut queries = QuerySet::from_question("a");
        let first = retriever.retrieve("a", &queries, &CandidateSet::new(), &CandidateSet::new());
        let first_positions: Vec<usize> = first.context.iter().map(|c| c.position).collect();
        assert_eq!(first_positions, vec![1, 5]);

        // "c" is byte 99, slot 3: chunks 3 and 7
        queries.push("c");
        let second = retriever.retrieve("a", &queries, &first.pool, &first.context);
        let second_positions: Vec<usize> = second.context.iter().map(|c| c.position).collect();

        assert_eq!(second.context.len(), 2);
        assert_eq!(second_positions[0], 1);
        assert!(second_positions.contains(&3));
        assert!(second.pool.len() >= 4);
    }

    #[test]
    fn test_repeat_pass_without_new_hits_keeps_context() {
        let settings = RetrievalSettings {
            k_final_chunks: 2,
            ..Default::default()
        };
        let retriever = retriever(8, settings, None);
        let queries = QuerySet::from_question("a");

        let first = retriever.retrieve("a", &queries, &CandidateSet::new(), &CandidateSet::new());
        let second = retriever.retrieve("a", &queries, &first.pool, &first.context);

        assert_eq!(second.context.texts(), first.context.texts());
        assert_eq!(second.pool.len(), first.pool.len());
    }

    #[test]
    fn test_select_context_reserves_half_for_fresh() {
        let previous: CandidateSet = (0..4)
            .map(|i| Candidate {
                position: i,
                text: format!("old {}", i),
            })
            .collect();
        let fresh: CandidateSet = (10..20)
            .map(|i| Candidate {
                position: i,
                text: format!("new {}", i),
            })
            .collect();

        let context = select_context(&previous, &fresh, 4);
        assert_eq!(context.texts(), vec!["old 0", "old 1", "new 10", "new 11"]);
    }
}
