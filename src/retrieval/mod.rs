//! Retrieval & reranking
//!
//! Embeds every active query, searches the vector index once per query, merges
//! the hits into a text-deduplicated candidate set and bounds it to the final
//! context size, optionally through a cross-encoder reranker.

mod deduplication;
mod reranker;
mod retriever;

pub use deduplication::merge_candidates;
pub use reranker::{CrossEncoderReranker, RerankError, RerankProvider};
pub use retriever::{Retrieval, RetrievalSettings, Retriever};

use ahash::HashSet;

/// All query strings active for retrieval
///
/// Grows monotonically; blank and duplicate queries are suppressed on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySet {
    queries: Vec<String>,
}

impl QuerySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a query set from the original question
    pub fn from_question(question: &str) -> Self {
        let mut set = Self::new();
        set.push(question);
        set
    }

    /// Add a query; returns false when it is blank or already present
    pub fn push(&mut self, query: impl AsRef<str>) -> bool {
        let query = query.as_ref().trim();
        if query.is_empty() || self.queries.iter().any(|q| q == query) {
            return false;
        }
        self.queries.push(query.to_string());
        true
    }

    pub fn extend<I, S>(&mut self, queries: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        queries.into_iter().filter(|q| self.push(q)).count()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn contains(&self, query: &str) -> bool {
        let query = query.trim();
        self.queries.iter().any(|q| q == query)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.queries
    }
}

/// One chunk considered as context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Position in the chunk store
    pub position: usize,
    /// Chunk text, provenance prefix included
    pub text: String,
}

/// Ordered, text-deduplicated collection of candidate chunks
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
    seen: HashSet<String>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a chunk; returns false when its text is already present
    pub fn insert(&mut self, position: usize, text: String) -> bool {
        if !self.seen.insert(text.clone()) {
            return false;
        }
        self.candidates.push(Candidate { position, text });
        true
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.text.as_str()).collect()
    }

    pub fn contains_text(&self, text: &str) -> bool {
        self.seen.contains(text)
    }

    /// Keep the first `k` candidates
    pub fn truncate(&mut self, k: usize) {
        for dropped in self.candidates.drain(k.min(self.candidates.len())..) {
            self.seen.remove(&dropped.text);
        }
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.candidates
    }
}

impl FromIterator<Candidate> for CandidateSet {
    fn from_iter<T: IntoIterator<Item = Candidate>>(iter: T) -> Self {
        let mut set = Self::new();
        for candidate in iter {
            set.insert(candidate.position, candidate.text);
        }
        set
    }
}
