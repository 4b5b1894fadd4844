/// Batched embedding with per-batch failure isolation
use super::EmbeddingProvider;
use tracing::{debug, warn};

/// Outcome counters for one `embed_in_batches` call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub batches: usize,
    pub failed_batches: usize,
    pub embedded: usize,
    pub zero_filled: usize,
}

/// Embed `texts` in batches of `batch_size`
///
/// Never fails: a batch the provider cannot embed (error, wrong count or wrong
/// dimension) is replaced by zero vectors, so the output always has exactly
/// one vector of `provider.dimension()` per input, in input order.
pub fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Vec<Vec<f32>> {
    embed_in_batches_with_stats(provider, texts, batch_size).0
}

/// Same as [`embed_in_batches`], also reporting how many batches degraded
pub fn embed_in_batches_with_stats(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> (Vec<Vec<f32>>, BatchStats) {
    let dimension = provider.dimension();
    let batch_size = batch_size.max(1);
    let mut stats = BatchStats::default();
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
        stats.batches += 1;

        match provider.embed_batch(batch) {
            Ok(embeddings)
                if embeddings.len() == batch.len()
                    && embeddings.iter().all(|e| e.len() == dimension) =>
            {
                debug!("Embedded batch {} ({} texts)", batch_no, batch.len());
                stats.embedded += batch.len();
                all_embeddings.extend(embeddings);
            }
            Ok(embeddings) => {
                warn!(
                    "Embedding batch {} returned {} vectors for {} texts, substituting zero vectors",
                    batch_no,
                    embeddings.len(),
                    batch.len()
                );
                stats.failed_batches += 1;
                stats.zero_filled += batch.len();
                all_embeddings.extend(std::iter::repeat(vec![0.0; dimension]).take(batch.len()));
            }
            Err(e) => {
                warn!(
                    "Embedding batch {} failed, substituting zero vectors: {}",
                    batch_no, e
                );
                stats.failed_batches += 1;
                stats.zero_filled += batch.len();
                all_embeddings.extend(std::iter::repeat(vec![0.0; dimension]).take(batch.len()));
            }
        }
    }

    (all_embeddings, stats)
}
