//! Deterministic capability stubs shared by the integration tests
#![allow(dead_code)]

use regcon::embedding::{EmbeddingError, EmbeddingProvider, FlatIndex};
use regcon::knowledge::ChunkStore;
use regcon::llm::{Completion, GenerationClient, LlmError, TokenUsage};
use regcon::pipeline::{Orchestrator, OrchestratorSettings, StageSettings, Stages};
use regcon::retrieval::{RerankError, RerankProvider, RetrievalSettings, Retriever};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Two-axis embedding: texts mentioning VAT point one way, everything else the other
pub struct KeywordEmbedder;

impl EmbeddingProvider for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.contains("VAT") {
            Ok(vec![1.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

/// Returns all-zero vectors for every input
pub struct ZeroEmbedder;

impl EmbeddingProvider for ZeroEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![0.0, 0.0])
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(vec![vec![0.0, 0.0]; texts.len()])
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "zero"
    }
}

/// Embedding service that is always down
pub struct DownEmbedder;

impl EmbeddingProvider for DownEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::RequestError("connection refused".to_string()))
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::RequestError("connection refused".to_string()))
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "down"
    }
}

pub struct FailingReranker;

impl RerankProvider for FailingReranker {
    fn rerank(&self, _query: &str, _documents: &[String]) -> Result<Vec<(usize, f32)>, RerankError> {
        Err(RerankError::RerankingError("model crashed".to_string()))
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Generation stub that recognises each stage by its prompt wording
///
/// The answer stage copies the first context line mentioning VAT, or says
/// nothing is known when none does.
pub struct ScriptedLlm {
    pub score: String,
    pub reflection: String,
    pub fail_everything: bool,
    /// Prompts containing this marker make the stub panic
    pub panic_marker: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(score: &str, reflection: &str) -> Self {
        Self {
            score: score.to_string(),
            reflection: reflection.to_string(),
            fail_everything: false,
            panic_marker: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_everything: true,
            ..Self::new("", "")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GenerationClient for ScriptedLlm {
    fn complete(&self, prompt: &str, _temperature: f32) -> Result<Completion, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(marker) = &self.panic_marker {
            if prompt.contains(marker.as_str()) {
                panic!("stub crashed on {}", marker);
            }
        }
        if self.fail_everything {
            return Err(LlmError::ServiceError {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        let text = if prompt.starts_with("Rate how well") {
            self.score.clone()
        } else if prompt.starts_with("Critique") {
            self.reflection.replace("{n}", &n.to_string())
        } else if prompt.contains("Rephrase the user's question") {
            "1. Standard tax rate on goods\n2. Consumption tax percentage".to_string()
        } else if prompt.starts_with("Write a short") {
            "A tax is charged on sales.".to_string()
        } else {
            match prompt.lines().find(|l| l.contains("VAT rate is")) {
                Some(line) => format!("According to the corpus: {}", line.trim()),
                None => regcon::pipeline::NO_INFO_ANSWER.to_string(),
            }
        };

        Ok(Completion::new(text, usage))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Chunk store with one VAT chunk among unrelated ones
pub fn vat_corpus(unrelated: usize) -> Vec<String> {
    let mut chunks: Vec<String> = (0..unrelated)
        .map(|i| {
            format!(
                "Source: Property Code (law). Article: {}. Property owners file a declaration by March.",
                i + 1
            )
        })
        .collect();
    chunks.insert(
        unrelated / 2,
        "Source: Tax Code (law). Article: 164. The standard VAT rate is 20 percent.".to_string(),
    );
    chunks
}

pub fn retriever(
    embedder: Arc<dyn EmbeddingProvider>,
    chunks: Vec<String>,
    reranker: Option<Arc<dyn RerankProvider>>,
    settings: RetrievalSettings,
) -> Retriever {
    let keyword = KeywordEmbedder;
    let vectors: Vec<Vec<f32>> = chunks
        .iter()
        .map(|c| keyword.embed(c).unwrap_or_else(|_| vec![0.0, 0.0]))
        .collect();

    Retriever::new(
        embedder,
        Arc::new(FlatIndex::from_vectors(2, vectors).unwrap()),
        Arc::new(ChunkStore::new(chunks)),
        reranker,
        settings,
    )
}

pub fn orchestrator(
    llm: Arc<dyn GenerationClient>,
    retriever: Retriever,
    settings: OrchestratorSettings,
) -> Orchestrator {
    let stages = Stages::new(llm, Arc::new(retriever), StageSettings::default());
    Orchestrator::new(stages, settings)
}

/// Orchestrator over the VAT corpus with keyword embeddings and no reranker
pub fn vat_orchestrator(llm: ScriptedLlm, settings: OrchestratorSettings) -> Orchestrator {
    let retriever = retriever(
        Arc::new(KeywordEmbedder),
        vat_corpus(9),
        None,
        RetrievalSettings::default(),
    );
    orchestrator(Arc::new(llm), retriever, settings)
}
