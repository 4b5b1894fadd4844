//! Embedding & indexing
//!
//! - `EmbeddingProvider` abstracts the embedding service (remote API or local model)
//! - `embed_in_batches` is the never-failing batched embedding call used by retrieval
//!   and by the knowledge base build
//! - `VectorSearch` abstracts the positional nearest-neighbour index (flat or HNSW)
mod batch;
mod provider;
mod remote;
mod vector_index;

pub use batch::{embed_in_batches, embed_in_batches_with_stats, BatchStats};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use remote::RemoteEmbeddingProvider;
pub use vector_index::{FlatIndex, SearchResult, VectorIndex, VectorIndexError, VectorSearch};
