//! Adaptive RAG orchestrator
//!
//! A question moves through a graph of stages:
//!
//! ```text
//! Expand -> Hypothesize -> Retrieve -> Generate -+-> Grade <-> Refine          (refine mode)
//!                              ^                 |
//!                              |                 +-> Reflect -> UpdateQuery    (reflect mode)
//!                              +------------------------------------+
//! ```
//!
//! Stages read the current [`PipelineState`] and return a [`StateDelta`]; the
//! driver in [`Orchestrator`] applies deltas, picks the next node and enforces
//! the step ceiling. Stage failures never leave a stage: each one substitutes
//! its fallback value.

mod decision;
mod machine;
mod prompts;
mod stages;
mod state;

pub use decision::{parse_expansions, parse_reflection, parse_score, GradeDecision, NextAction, Reflection};
pub use machine::{Node, Orchestrator, OrchestratorSettings, RunOutcome};
pub use stages::{StageSettings, Stages};
pub use state::{PipelineState, StateDelta};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Retrieval found nothing, or the model found no answer in the context
pub const NO_INFO_ANSWER: &str =
    "Unfortunately, my knowledge base has no information on your question.";

/// The generation service failed while drafting the answer
pub const GENERATION_ERROR_ANSWER: &str = "An error occurred while generating the answer.";

/// The orchestrator itself failed
pub const PROCESSING_FAILED_ANSWER: &str =
    "Failed to process the question. Please try again later.";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Step ceiling of {limit} reached before {node}")]
    StepCeilingExceeded { limit: u32, node: Node },
}

/// Which loop follows the first generated draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Grade the draft and rewrite it until it scores well enough
    Refine,
    /// Critique the draft and widen the search when context is missing
    Reflect,
}

impl Mode {
    /// Executed nodes needed to run every configured cycle to its limit
    pub fn minimum_steps(self, max_refine_cycles: u32, max_search_cycles: u32) -> u32 {
        match self {
            // Expand, Hypothesize, Retrieve, Generate, Grade + (Refine, Grade) per cycle
            Mode::Refine => 5 + 2 * max_refine_cycles,
            // The last search cycle ends at Generate without another reflection
            Mode::Reflect if max_search_cycles == 0 => 4,
            Mode::Reflect => 4 + 4 * max_search_cycles,
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refine" => Ok(Mode::Refine),
            "reflect" => Ok(Mode::Reflect),
            other => Err(format!("unknown pipeline mode '{}'", other)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Refine => write!(f, "refine"),
            Mode::Reflect => write!(f, "reflect"),
        }
    }
}

/// Terminal answer of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Answer {
    Answered(String),
    NoInformation,
    GenerationFailed,
}

impl Answer {
    /// Classify model output, recognising the no-information sentence
    pub fn from_generated(text: &str) -> Self {
        if normalize(text) == normalize(NO_INFO_ANSWER) {
            Answer::NoInformation
        } else {
            Answer::Answered(text.trim().to_string())
        }
    }

    /// Text shown to the caller
    pub fn as_str(&self) -> &str {
        match self {
            Answer::Answered(text) => text,
            Answer::NoInformation => NO_INFO_ANSWER,
            Answer::GenerationFailed => GENERATION_ERROR_ANSWER,
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, Answer::Answered(_))
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_distinct() {
        assert_ne!(NO_INFO_ANSWER, GENERATION_ERROR_ANSWER);
        assert_ne!(NO_INFO_ANSWER, PROCESSING_FAILED_ANSWER);
        assert_ne!(GENERATION_ERROR_ANSWER, PROCESSING_FAILED_ANSWER);
    }

    #[test]
    fn test_model_no_info_sentence_is_recognised() {
        let quoted = format!("`{}`\n", NO_INFO_ANSWER);
        assert_eq!(Answer::from_generated(&quoted), Answer::NoInformation);
        assert!(Answer::from_generated("The fine is 5%.").is_answered());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Reflect".parse::<Mode>().unwrap(), Mode::Reflect);
        assert!("loop".parse::<Mode>().is_err());
        assert_eq!(Mode::Refine.to_string(), "refine");
    }

    #[test]
    fn test_minimum_steps() {
        assert_eq!(Mode::Refine.minimum_steps(2, 0), 9);
        assert_eq!(Mode::Reflect.minimum_steps(0, 0), 4);
        assert_eq!(Mode::Reflect.minimum_steps(0, 2), 12);
    }
}
