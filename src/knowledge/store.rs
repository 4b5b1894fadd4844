/// Ordered, read-only sequence of chunk texts
///
/// Position N holds the text whose vector sits at position N in the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkStore {
    chunks: Vec<String>,
}

impl ChunkStore {
    pub fn new(chunks: Vec<String>) -> Self {
        Self { chunks }
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.chunks.get(position).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.chunks
    }
}

impl From<Vec<String>> for ChunkStore {
    fn from(chunks: Vec<String>) -> Self {
        Self::new(chunks)
    }
}
