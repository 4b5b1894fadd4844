//! State machine driver

use crate::pipeline::{
    Answer, GradeDecision, Mode, NextAction, PipelineError, PipelineState, Stages, StateDelta,
    PROCESSING_FAILED_ANSWER,
};
use crate::usage::UsageLog;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Expand,
    Hypothesize,
    Retrieve,
    Generate,
    Grade,
    Refine,
    Reflect,
    UpdateQuery,
    End,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Node::Expand => "expand",
            Node::Hypothesize => "hypothesize",
            Node::Retrieve => "retrieve",
            Node::Generate => "generate",
            Node::Grade => "grade",
            Node::Refine => "refine",
            Node::Reflect => "reflect",
            Node::UpdateQuery => "update_query",
            Node::End => "end",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorSettings {
    pub mode: Mode,
    pub finish_threshold: f32,
    pub max_refine_cycles: u32,
    pub max_search_cycles: u32,
    /// Hard cap on executed nodes, independent of the cycle counters
    pub step_ceiling: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Refine,
            finish_threshold: 0.8,
            max_refine_cycles: 2,
            max_search_cycles: 2,
            step_ceiling: 25,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub answer: Answer,
    /// Score of the last grading, refine mode only
    pub score: Option<f32>,
    pub refine_cycles: u32,
    pub search_cycles: u32,
    pub steps: u32,
    pub queries: usize,
    pub context_chunks: usize,
    /// Distinct chunks retrieved across all passes
    pub pooled_chunks: usize,
    /// Action of the last reflection, reflect mode only
    pub last_action: Option<NextAction>,
}

impl RunOutcome {
    fn from_state(state: PipelineState) -> Self {
        Self {
            answer: state.answer.unwrap_or(Answer::NoInformation),
            score: state.score,
            refine_cycles: state.refine_cycles,
            search_cycles: state.search_cycles,
            steps: state.steps,
            queries: state.queries.len(),
            context_chunks: state.candidates.len(),
            pooled_chunks: state.pool.len(),
            last_action: state.reflection.map(|r| r.action),
        }
    }
}

pub struct Orchestrator {
    stages: Stages,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(stages: Stages, settings: OrchestratorSettings) -> Self {
        Self { stages, settings }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Answer a question, always returning a non-empty string
    pub fn answer(&self, question: &str) -> String {
        let mut usage = UsageLog::new();
        self.answer_with_usage(question, &mut usage)
    }

    /// Like [`Orchestrator::answer`], recording usage into `usage`
    pub fn answer_with_usage(&self, question: &str, usage: &mut UsageLog) -> String {
        match self.run(question, usage) {
            Ok(outcome) => outcome.answer.as_str().to_string(),
            Err(e) => {
                error!("Failed to process question '{}': {}", question, e);
                PROCESSING_FAILED_ANSWER.to_string()
            }
        }
    }

    /// Drive the graph from Expand to End
    pub fn run(&self, question: &str, usage: &mut UsageLog) -> Result<RunOutcome, PipelineError> {
        if question.trim().is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        let start = Instant::now();
        let mut state = PipelineState::new(question);
        let mut node = Node::Expand;

        while node != Node::End {
            if state.steps >= self.settings.step_ceiling {
                return Err(PipelineError::StepCeilingExceeded {
                    limit: self.settings.step_ceiling,
                    node,
                });
            }

            debug!("step {}: {}", state.steps + 1, node);
            let delta = self.execute(node, &state, usage);
            state.apply(delta);
            state.steps += 1;
            node = self.next(node, &state);
        }

        usage.record_timing("answer_question", start.elapsed());

        let outcome = RunOutcome::from_state(state);
        info!(
            "Answered in {} steps ({} mode, {} refine / {} search cycles, {} context chunks)",
            outcome.steps,
            self.settings.mode,
            outcome.refine_cycles,
            outcome.search_cycles,
            outcome.context_chunks
        );
        Ok(outcome)
    }

    fn execute(&self, node: Node, state: &PipelineState, usage: &mut UsageLog) -> StateDelta {
        match node {
            Node::Expand => self.stages.expand(state, usage),
            Node::Hypothesize => self.stages.hypothesize(state, usage),
            Node::Retrieve => self.stages.retrieve(state, usage),
            Node::Generate => self.stages.generate(state, usage),
            Node::Grade => self.stages.grade(state, usage),
            Node::Refine => self.stages.refine(state, usage),
            Node::Reflect => self.stages.reflect(state, usage),
            Node::UpdateQuery => self.stages.update_query(state),
            Node::End => StateDelta::default(),
        }
    }

    /// Edge selection after `node` has run
    fn next(&self, node: Node, state: &PipelineState) -> Node {
        let settings = &self.settings;

        match node {
            Node::Expand => Node::Hypothesize,
            Node::Hypothesize => Node::Retrieve,
            Node::Retrieve if state.candidates.is_empty() => {
                info!("No candidates retrieved, answering with no information");
                Node::End
            }
            Node::Retrieve => Node::Generate,
            Node::Generate => match settings.mode {
                Mode::Refine => Node::Grade,
                // A verdict after the last permitted search could not be acted on
                Mode::Reflect if state.search_cycles < settings.max_search_cycles => Node::Reflect,
                Mode::Reflect => Node::End,
            },
            Node::Grade => {
                let score = state.score.unwrap_or(0.0);
                match GradeDecision::decide(
                    score,
                    settings.finish_threshold,
                    state.refine_cycles,
                    settings.max_refine_cycles,
                ) {
                    GradeDecision::Finish => Node::End,
                    GradeDecision::ContinueRefine => Node::Refine,
                }
            }
            Node::Refine => Node::Grade,
            Node::Reflect => match state.reflection.as_ref().map(|r| &r.action) {
                Some(NextAction::Search { query })
                    if state.search_cycles < settings.max_search_cycles =>
                {
                    if state.queries.contains(query) {
                        debug!("Reflection repeated an existing query, finishing");
                        Node::End
                    } else {
                        Node::UpdateQuery
                    }
                }
                _ => Node::End,
            },
            Node::UpdateQuery => Node::Retrieve,
            Node::End => Node::End,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, EmbeddingProvider, FlatIndex};
    use crate::knowledge::ChunkStore;
    use crate::llm::{Completion, GenerationClient, LlmError, TokenUsage};
    use crate::pipeline::{StageSettings, GENERATION_ERROR_ANSWER, NO_INFO_ANSWER};
    use crate::retrieval::{RetrievalSettings, Retriever};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct AxisEmbedder;

    impl EmbeddingProvider for AxisEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut v = vec![0.0; 3];
            v[text.len() % 3] = 1.0;
            Ok(v)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "axis"
        }
    }

    /// Answers by stage, recognised from the prompt wording
    struct ScriptedLlm {
        score: &'static str,
        reflection: &'static str,
        fail_answers: bool,
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(score: &'static str, reflection: &'static str) -> Self {
            Self {
                score,
                reflection,
                fail_answers: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl GenerationClient for ScriptedLlm {
        fn complete(&self, prompt: &str, _temperature: f32) -> Result<Completion, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let text = if prompt.starts_with("Rate how well") {
                self.score.to_string()
            } else if prompt.starts_with("Critique") {
                self.reflection.replace("{n}", &n.to_string())
            } else if prompt.contains("Rephrase the user's question") {
                "alt one\nalt two".to_string()
            } else if prompt.starts_with("Write a short") {
                "hypothetical".to_string()
            } else if self.fail_answers {
                return Err(LlmError::RequestError("down".to_string()));
            } else {
                format!("answer {}", n)
            };
            Ok(Completion::new(text, TokenUsage::default()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn orchestrator(llm: ScriptedLlm, chunks: usize, settings: OrchestratorSettings) -> Orchestrator {
        let texts: Vec<String> = (0..chunks).map(|i| format!("chunk {}", i)).collect();
        let vectors: Vec<Vec<f32>> = (0..chunks)
            .map(|i| {
                let mut v = vec![0.0; 3];
                v[i % 3] = 1.0;
                v
            })
            .collect();

        let retriever = Retriever::new(
            Arc::new(AxisEmbedder),
            Arc::new(FlatIndex::from_vectors(3, vectors).unwrap()),
            Arc::new(ChunkStore::new(texts)),
            None,
            RetrievalSettings {
                k_final_chunks: 2,
                ..Default::default()
            },
        );

        let stages = Stages::new(Arc::new(llm), Arc::new(retriever), StageSettings::default());
        Orchestrator::new(stages, settings)
    }

    #[test]
    fn test_refine_stops_at_threshold() {
        let orch = orchestrator(ScriptedLlm::new("0.95", ""), 6, OrchestratorSettings::default());
        let outcome = orch.run("What is VAT?", &mut UsageLog::new()).unwrap();

        assert_eq!(outcome.refine_cycles, 0);
        assert_eq!(outcome.steps, 5);
        assert!(outcome.answer.is_answered());
    }

    #[test]
    fn test_refine_stops_at_cycle_cap() {
        let orch = orchestrator(ScriptedLlm::new("0.1", ""), 6, OrchestratorSettings::default());
        let outcome = orch.run("What is VAT?", &mut UsageLog::new()).unwrap();

        assert_eq!(outcome.refine_cycles, 2);
        assert_eq!(outcome.steps, Mode::Refine.minimum_steps(2, 0));
        assert_eq!(outcome.score, Some(0.1));
    }

    #[test]
    fn test_reflect_searches_until_cap() {
        let settings = OrchestratorSettings {
            mode: Mode::Reflect,
            ..Default::default()
        };
        let llm = ScriptedLlm::new(
            "",
            r#"{"critique": "incomplete", "action": "search", "new_query": "query {n}"}"#,
        );
        let orch = orchestrator(llm, 6, settings);
        let outcome = orch.run("What is VAT?", &mut UsageLog::new()).unwrap();

        assert_eq!(outcome.search_cycles, 2);
        assert!(matches!(outcome.last_action, Some(NextAction::Search { .. })));
        assert_eq!(outcome.steps, Mode::Reflect.minimum_steps(0, 2));
        assert!(outcome.context_chunks <= 2);
    }

    #[test]
    fn test_reflect_finishes_on_unparseable_verdict() {
        let settings = OrchestratorSettings {
            mode: Mode::Reflect,
            ..Default::default()
        };
        let orch = orchestrator(ScriptedLlm::new("", "looks fine to me"), 6, settings);
        let outcome = orch.run("What is VAT?", &mut UsageLog::new()).unwrap();

        assert_eq!(outcome.search_cycles, 0);
        assert_eq!(outcome.last_action, Some(NextAction::Finish));
    }

    #[test]
    fn test_empty_index_gives_no_information() {
        for mode in [Mode::Refine, Mode::Reflect] {
            let settings = OrchestratorSettings {
                mode,
                ..Default::default()
            };
            let orch = orchestrator(ScriptedLlm::new("0.9", ""), 0, settings);
            assert_eq!(orch.answer("What is VAT?"), NO_INFO_ANSWER);
        }
    }

    #[test]
    fn test_generation_failure_is_graded() {
        let mut llm = ScriptedLlm::new("0.2", "");
        llm.fail_answers = true;
        let orch = orchestrator(llm, 6, OrchestratorSettings::default());
        let outcome = orch.run("What is VAT?", &mut UsageLog::new()).unwrap();

        // Refinement fails too, so the error sentence survives every cycle
        assert_eq!(outcome.answer, Answer::GenerationFailed);
        assert_eq!(outcome.answer.as_str(), GENERATION_ERROR_ANSWER);
        assert_eq!(outcome.score, Some(0.2));
        assert_eq!(outcome.refine_cycles, 2);
    }

    #[test]
    fn test_step_ceiling_is_enforced() {
        let settings = OrchestratorSettings {
            step_ceiling: 6,
            ..Default::default()
        };
        let orch = orchestrator(ScriptedLlm::new("0.1", ""), 6, settings);

        let result = orch.run("What is VAT?", &mut UsageLog::new());
        assert!(matches!(
            result,
            Err(PipelineError::StepCeilingExceeded { limit: 6, .. })
        ));
        assert_eq!(orch.answer("What is VAT?"), PROCESSING_FAILED_ANSWER);
    }

    #[test]
    fn test_empty_question_is_rejected() {
        let orch = orchestrator(ScriptedLlm::new("0.9", ""), 6, OrchestratorSettings::default());
        assert_eq!(orch.answer("   "), PROCESSING_FAILED_ANSWER);
    }

    #[test]
    fn test_usage_is_recorded_per_stage() {
        let orch = orchestrator(ScriptedLlm::new("0.95", ""), 6, OrchestratorSettings::default());
        let mut usage = UsageLog::new();
        orch.run("What is VAT?", &mut usage).unwrap();

        let tasks: Vec<&str> = usage.timings().iter().map(|t| t.task.as_str()).collect();
        assert_eq!(
            tasks,
            vec![
                "expand_question",
                "generate_hypothetical_answer",
                "retrieve",
                "generate_answer",
                "grade_answer",
                "answer_question"
            ]
        );
        assert_eq!(usage.tokens().len(), 4);
    }
}
