//! Per-question working memory of the orchestrator

use crate::pipeline::{prompts, Answer, Reflection, NO_INFO_ANSWER};
use crate::retrieval::{CandidateSet, QuerySet, Retrieval};

/// State of one question's run; created per question and dropped after the answer is read
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub question: String,
    pub queries: QuerySet,
    pub hypothetical_answer: Option<String>,
    /// Every distinct chunk retrieved so far; grows across search cycles
    pub pool: CandidateSet,
    /// Bounded context set produced by the latest retrieval
    pub candidates: CandidateSet,
    pub answer: Option<Answer>,
    pub score: Option<f32>,
    pub reflection: Option<Reflection>,
    pub search_cycles: u32,
    pub refine_cycles: u32,
    /// Nodes executed so far
    pub steps: u32,
}

/// Changes produced by one stage
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub queries: Vec<String>,
    pub hypothetical_answer: Option<String>,
    pub retrieval: Option<Retrieval>,
    pub answer: Option<Answer>,
    pub score: Option<f32>,
    pub reflection: Option<Reflection>,
    pub search_cycle_completed: bool,
    pub refine_cycle_completed: bool,
}

impl PipelineState {
    pub fn new(question: &str) -> Self {
        Self {
            question: question.trim().to_string(),
            queries: QuerySet::from_question(question),
            hypothetical_answer: None,
            pool: CandidateSet::new(),
            candidates: CandidateSet::new(),
            answer: None,
            score: None,
            reflection: None,
            search_cycles: 0,
            refine_cycles: 0,
            steps: 0,
        }
    }

    /// Merge a stage's delta; queries only grow and counters only increase
    pub fn apply(&mut self, delta: StateDelta) {
        self.queries.extend(delta.queries);

        if let Some(hypothetical) = delta.hypothetical_answer {
            self.queries.push(&hypothetical);
            self.hypothetical_answer = Some(hypothetical);
        }
        if let Some(retrieval) = delta.retrieval {
            self.pool = retrieval.pool;
            self.candidates = retrieval.context;
        }
        if let Some(answer) = delta.answer {
            self.answer = Some(answer);
        }
        if let Some(score) = delta.score {
            self.score = Some(score);
        }
        if let Some(reflection) = delta.reflection {
            self.reflection = Some(reflection);
        }
        if delta.search_cycle_completed {
            self.search_cycles += 1;
        }
        if delta.refine_cycle_completed {
            self.refine_cycles += 1;
        }
    }

    /// Current draft as text, the no-information sentence when there is none yet
    pub fn answer_text(&self) -> &str {
        match &self.answer {
            Some(answer) => answer.as_str(),
            None => NO_INFO_ANSWER,
        }
    }

    /// Candidate texts joined for a prompt
    pub fn context(&self) -> String {
        prompts::join_context(&self.candidates.texts())
    }
}
