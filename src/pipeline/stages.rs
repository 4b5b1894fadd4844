//! Pipeline stages
//!
//! Each stage reads the state, calls at most one external capability and
//! returns a delta. Failures are logged and replaced by the stage's fallback.

use crate::llm::{GenerationClient, LlmError};
use crate::pipeline::{
    decision, prompts, Answer, NextAction, PipelineState, Reflection, StateDelta,
};
use crate::retrieval::Retriever;
use crate::usage::UsageLog;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Generation parameters shared by the stages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSettings {
    /// Alternative phrasings requested from the expansion stage
    pub expansion_count: usize,
    pub temperature: f32,
    pub expansion_temperature: f32,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            expansion_count: 3,
            temperature: 0.0,
            expansion_temperature: 0.8,
        }
    }
}

pub struct Stages {
    llm: Arc<dyn GenerationClient>,
    retriever: Arc<Retriever>,
    settings: StageSettings,
}

impl Stages {
    pub fn new(
        llm: Arc<dyn GenerationClient>,
        retriever: Arc<Retriever>,
        settings: StageSettings,
    ) -> Self {
        Self {
            llm,
            retriever,
            settings,
        }
    }

    /// One generation call with token and time accounting
    fn complete(
        &self,
        task: &str,
        prompt: &str,
        temperature: f32,
        usage: &mut UsageLog,
    ) -> Result<String, LlmError> {
        let start = Instant::now();
        let result = self.llm.complete(prompt, temperature);
        usage.record_timing(task, start.elapsed());

        let completion = result?;
        usage.record_tokens(self.llm.model_name(), task, completion.usage);
        Ok(completion.text)
    }

    /// Alternative phrasings of the question; none on failure
    pub fn expand(&self, state: &PipelineState, usage: &mut UsageLog) -> StateDelta {
        let count = self.settings.expansion_count;
        if count == 0 {
            return StateDelta::default();
        }

        let prompt = prompts::expansion(&state.question, count);
        match self.complete("expand_question", &prompt, self.settings.expansion_temperature, usage)
        {
            Ok(text) => {
                let queries = decision::parse_expansions(&text, count);
                debug!("Expanded question into {} phrasings", queries.len());
                StateDelta {
                    queries,
                    ..Default::default()
                }
            }
            Err(e) => {
                warn!("Query expansion failed, using the original question only: {}", e);
                StateDelta::default()
            }
        }
    }

    /// Hypothetical answer used as an extra retrieval query; the question itself on failure
    pub fn hypothesize(&self, state: &PipelineState, usage: &mut UsageLog) -> StateDelta {
        let prompt = prompts::hypothetical_answer(&state.question);
        let hypothetical = match self.complete(
            "generate_hypothetical_answer",
            &prompt,
            self.settings.temperature,
            usage,
        ) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => state.question.clone(),
            Err(e) => {
                warn!("Hypothetical answer failed, probing with the question: {}", e);
                state.question.clone()
            }
        };

        StateDelta {
            hypothetical_answer: Some(hypothetical),
            ..Default::default()
        }
    }

    /// Search with every active query, merged into the chunks already held
    pub fn retrieve(&self, state: &PipelineState, usage: &mut UsageLog) -> StateDelta {
        let start = Instant::now();
        let retrieval = self.retriever.retrieve(
            &state.question,
            &state.queries,
            &state.pool,
            &state.candidates,
        );
        usage.record_timing("retrieve", start.elapsed());

        StateDelta {
            retrieval: Some(retrieval),
            ..Default::default()
        }
    }

    /// Draft an answer strictly from the candidate set
    pub fn generate(&self, state: &PipelineState, usage: &mut UsageLog) -> StateDelta {
        let answer = if state.candidates.is_empty() {
            Answer::NoInformation
        } else {
            let prompt = prompts::answer(&state.context(), &state.question);
            match self.complete("generate_answer", &prompt, self.settings.temperature, usage) {
                Ok(text) => Answer::from_generated(&text),
                Err(e) => {
                    warn!("Answer generation failed: {}", e);
                    Answer::GenerationFailed
                }
            }
        };

        StateDelta {
            answer: Some(answer),
            ..Default::default()
        }
    }

    /// Score the current draft in [0, 1]; 0.0 when the grader fails
    pub fn grade(&self, state: &PipelineState, usage: &mut UsageLog) -> StateDelta {
        let prompt = prompts::grade(&state.question, state.answer_text(), &state.context());
        let score = match self.complete("grade_answer", &prompt, self.settings.temperature, usage) {
            Ok(text) => decision::parse_score(&text),
            Err(e) => {
                warn!("Grading failed, scoring the draft 0.0: {}", e);
                0.0
            }
        };
        debug!("Draft scored {:.2}", score);

        StateDelta {
            score: Some(score),
            ..Default::default()
        }
    }

    /// Rewrite the draft against the same context; the cycle counts even on failure
    pub fn refine(&self, state: &PipelineState, usage: &mut UsageLog) -> StateDelta {
        let prompt = prompts::refine(&state.question, &state.context(), state.answer_text());
        let answer = match self.complete("refine_answer", &prompt, self.settings.temperature, usage)
        {
            Ok(text) if !text.trim().is_empty() => Some(Answer::from_generated(&text)),
            Ok(_) => None,
            Err(e) => {
                warn!("Refinement failed, keeping the previous draft: {}", e);
                None
            }
        };

        StateDelta {
            answer,
            refine_cycle_completed: true,
            ..Default::default()
        }
    }

    /// Critique the draft and decide whether to search again; finishes on failure
    pub fn reflect(&self, state: &PipelineState, usage: &mut UsageLog) -> StateDelta {
        let prompt = prompts::reflect(&state.question, &state.context(), state.answer_text());
        let reflection = match self.complete("reflect", &prompt, self.settings.temperature, usage) {
            Ok(text) => decision::parse_reflection(&text),
            Err(e) => {
                warn!("Reflection failed, finishing: {}", e);
                Reflection::finish(format!("reflection unavailable: {}", e))
            }
        };
        debug!("Reflection verdict: {:?}", reflection.action);

        StateDelta {
            reflection: Some(reflection),
            ..Default::default()
        }
    }

    /// Add the reflection's query and count the search cycle
    pub fn update_query(&self, state: &PipelineState) -> StateDelta {
        let queries = match state.reflection.as_ref().map(|r| &r.action) {
            Some(NextAction::Search { query }) => vec![query.clone()],
            _ => Vec::new(),
        };

        StateDelta {
            queries,
            search_cycle_completed: true,
            ..Default::default()
        }
    }
}
