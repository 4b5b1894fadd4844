/// Vector indexes over chunk embeddings
///
/// Both indexes are positional: vector N corresponds to chunk N in the chunk store.
use hnsw_rs::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Search result with position and similarity score
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Position of the vector (and of its chunk)
    pub id: usize,
    /// Cosine similarity score (higher is more similar)
    pub score: f32,
}

/// Nearest-neighbour search over a read-only index
///
/// Each query row has exactly `k` slots; slots the index cannot fill are `None`.
pub trait VectorSearch: Send + Sync {
    fn search(
        &self,
        queries: &[Vec<f32>],
        k: usize,
    ) -> Result<Vec<Vec<Option<usize>>>, VectorIndexError>;

    /// Number of indexed vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension
    fn dimension(&self) -> usize;
}

fn pad_row(results: Vec<SearchResult>, k: usize) -> Vec<Option<usize>> {
    let mut row: Vec<Option<usize>> = results.into_iter().take(k).map(|r| Some(r.id)).collect();
    row.resize(k, None);
    row
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Exact cosine-similarity index (brute force)
///
/// Default index kind; adequate for corpora of tens of thousands of chunks.
pub struct FlatIndex {
    vectors: Vec<Vec<f32>>,
    norms: Vec<f32>,
    dimension: usize,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: Vec::new(),
            norms: Vec::new(),
            dimension,
        }
    }

    /// Build an index from vectors in position order
    pub fn from_vectors(dimension: usize, vectors: Vec<Vec<f32>>) -> Result<Self, VectorIndexError> {
        let mut index = Self::new(dimension);
        for vector in vectors {
            index.push(vector)?;
        }
        Ok(index)
    }

    /// Append a vector; its position is the current length
    pub fn push(&mut self, vector: Vec<f32>) -> Result<usize, VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.norms.push(norm(&vector));
        self.vectors.push(vector);
        Ok(self.vectors.len() - 1)
    }

    /// Top-k positions for a single query, sorted by similarity descending
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let query_norm = norm(query);
        let mut scored: Vec<SearchResult> = self
            .vectors
            .iter()
            .zip(self.norms.iter())
            .enumerate()
            .map(|(id, (vector, vector_norm))| {
                let denom = query_norm * vector_norm;
                let score = if denom > 0.0 {
                    query.iter().zip(vector.iter()).map(|(a, b)| a * b).sum::<f32>() / denom
                } else {
                    0.0
                };
                SearchResult { id, score }
            })
            .collect();

        // Stable sort keeps position order among ties, so degenerate queries stay deterministic
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

impl VectorSearch for FlatIndex {
    fn search(
        &self,
        queries: &[Vec<f32>],
        k: usize,
    ) -> Result<Vec<Vec<Option<usize>>>, VectorIndexError> {
        queries
            .iter()
            .map(|query| Ok(pad_row(self.nearest(query, k)?, k)))
            .collect()
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// HNSW vector index wrapper
///
/// Approximate nearest neighbour search with cosine distance, for large corpora.
pub struct VectorIndex {
    index: RwLock<Hnsw<'static, f32, DistCosine>>,
    dimension: usize,
    ef_search: usize,
    count: AtomicUsize,
}

impl VectorIndex {
    /// Create a new vector index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match embedding dimension)
    /// * `capacity` - Expected number of vectors
    /// * `ef_construction` - HNSW construction parameter (higher = better recall, slower build)
    /// * `m` - HNSW M parameter (number of connections per layer)
    /// * `ef_search` - HNSW search parameter (higher = better recall, slower search)
    pub fn new(
        dimension: usize,
        capacity: usize,
        ef_construction: usize,
        m: usize,
        ef_search: usize,
    ) -> Result<Self, VectorIndexError> {
        if dimension == 0 || m == 0 {
            return Err(VectorIndexError::InitializationError(
                "dimension and M must be greater than 0".to_string(),
            ));
        }

        let index = Hnsw::<f32, DistCosine>::new(m, capacity.max(1), 16, ef_construction, DistCosine);

        Ok(Self {
            index: RwLock::new(index),
            dimension,
            ef_search,
            count: AtomicUsize::new(0),
        })
    }

    /// Build an index from vectors in position order
    pub fn from_vectors(
        dimension: usize,
        vectors: &[Vec<f32>],
        ef_construction: usize,
        m: usize,
        ef_search: usize,
    ) -> Result<Self, VectorIndexError> {
        let index = Self::new(dimension, vectors.len(), ef_construction, m, ef_search)?;
        for (position, vector) in vectors.iter().enumerate() {
            index.insert(position, vector)?;
        }
        Ok(index)
    }

    /// Insert a vector at the given chunk position
    pub fn insert(&self, position: usize, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        // Zero vectors (failed embeddings) have no cosine direction and are left out
        if norm(vector) == 0.0 {
            tracing::debug!("Skipping zero vector at position {}", position);
            self.count.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        let index = self
            .index
            .write()
            .map_err(|e| VectorIndexError::InsertError(e.to_string()))?;
        index.insert((vector, position));
        self.count.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    /// Top-k positions for a single query, sorted by similarity descending
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if norm(query) == 0.0 || k == 0 {
            return Ok(Vec::new());
        }

        let index = self
            .index
            .read()
            .map_err(|e| VectorIndexError::SearchError(e.to_string()))?;

        let results = index
            .search(query, k, self.ef_search.max(k))
            .into_iter()
            .map(|neighbour| SearchResult {
                id: neighbour.d_id,
                score: 1.0 - neighbour.distance,
            })
            .collect();

        Ok(results)
    }
}

impl VectorSearch for VectorIndex {
    fn search(
        &self,
        queries: &[Vec<f32>],
        k: usize,
    ) -> Result<Vec<Vec<Option<usize>>>, VectorIndexError> {
        queries
            .iter()
            .map(|query| Ok(pad_row(self.nearest(query, k)?, k)))
            .collect()
    }

    fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
