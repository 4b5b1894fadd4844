//! Multi-question batch worker
//!
//! Runs independent questions on a bounded pool. Each question gets its own
//! pipeline state and usage log; only the orchestrator's read-only handles are
//! shared. A question whose run fails or panics is answered with the
//! processing-failed sentence without affecting the others.

use crate::error::{RegconError, Result};
use crate::pipeline::{Answer, Orchestrator, PipelineError, RunOutcome, PROCESSING_FAILED_ANSWER};
use crate::usage::UsageLog;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// A question to answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchQuestion {
    #[serde(default)]
    pub id: Option<String>,
    pub question: String,
}

/// How a question ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Answered,
    NoInformation,
    GenerationFailed,
    ProcessingFailed,
}

impl From<&Answer> for OutcomeKind {
    fn from(answer: &Answer) -> Self {
        match answer {
            Answer::Answered(_) => OutcomeKind::Answered,
            Answer::NoInformation => OutcomeKind::NoInformation,
            Answer::GenerationFailed => OutcomeKind::GenerationFailed,
        }
    }
}

/// One line of the batch output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAnswer {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub outcome: OutcomeKind,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub answered: usize,
    pub no_information: usize,
    pub generation_failed: usize,
    pub processing_failed: usize,
    pub duration_ms: u64,
}

impl BatchSummary {
    fn from_answers(answers: &[BatchAnswer], duration_ms: u64) -> Self {
        let count = |kind: OutcomeKind| answers.iter().filter(|a| a.outcome == kind).count();
        Self {
            total: answers.len(),
            answered: count(OutcomeKind::Answered),
            no_information: count(OutcomeKind::NoInformation),
            generation_failed: count(OutcomeKind::GenerationFailed),
            processing_failed: count(OutcomeKind::ProcessingFailed),
            duration_ms,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Questions:          {}", self.total)?;
        writeln!(f, "Answered:           {}", self.answered)?;
        writeln!(f, "No information:     {}", self.no_information)?;
        writeln!(f, "Generation failed:  {}", self.generation_failed)?;
        writeln!(f, "Processing failed:  {}", self.processing_failed)?;
        write!(f, "Duration:           {}ms", self.duration_ms)
    }
}

/// Answers in input order with their merged usage
#[derive(Debug)]
pub struct BatchReport {
    pub answers: Vec<BatchAnswer>,
    pub usage: UsageLog,
    pub summary: BatchSummary,
}

pub struct BatchRunner {
    orchestrator: Arc<Orchestrator>,
    max_concurrent: usize,
}

type RunResult = (std::result::Result<RunOutcome, PipelineError>, UsageLog, u64);

impl BatchRunner {
    pub fn new(orchestrator: Arc<Orchestrator>, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Answer every question with at most `max_concurrent` in flight
    pub async fn run(&self, questions: Vec<BatchQuestion>) -> BatchReport {
        let start = Instant::now();
        let total = questions.len();
        info!(
            "Starting batch of {} questions ({} concurrent)",
            total, self.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(total);

        for (index, item) in questions.into_iter().enumerate() {
            let id = item.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let permit = semaphore.clone().acquire_owned().await.ok();
            let orchestrator = Arc::clone(&self.orchestrator);
            let question = item.question.clone();

            let handle = tokio::task::spawn_blocking(move || -> RunResult {
                let _permit = permit;
                let started = Instant::now();
                let mut usage = UsageLog::new();
                let result = orchestrator.run(&question, &mut usage);
                (result, usage, started.elapsed().as_millis() as u64)
            });

            handles.push((index, id, item.question, handle));
        }

        let mut answers = Vec::with_capacity(total);
        let mut usage = UsageLog::new();

        for (index, id, question, handle) in handles {
            let answer = match handle.await {
                Ok((Ok(outcome), run_usage, duration_ms)) => {
                    usage.merge(run_usage);
                    BatchAnswer {
                        id,
                        question,
                        answer: outcome.answer.as_str().to_string(),
                        outcome: OutcomeKind::from(&outcome.answer),
                        duration_ms,
                    }
                }
                Ok((Err(e), run_usage, duration_ms)) => {
                    usage.merge(run_usage);
                    error!("Question {} failed: {}", index + 1, e);
                    failed_answer(id, question, duration_ms)
                }
                Err(e) => {
                    error!("Question {} worker did not complete: {}", index + 1, e);
                    failed_answer(id, question, 0)
                }
            };
            answers.push(answer);
        }

        let summary = BatchSummary::from_answers(&answers, start.elapsed().as_millis() as u64);
        info!(
            "Batch complete: {} answered, {} no information, {} failed, {}ms",
            summary.answered,
            summary.no_information,
            summary.generation_failed + summary.processing_failed,
            summary.duration_ms
        );

        BatchReport {
            answers,
            usage,
            summary,
        }
    }
}

fn failed_answer(id: String, question: String, duration_ms: u64) -> BatchAnswer {
    BatchAnswer {
        id,
        question,
        answer: PROCESSING_FAILED_ANSWER.to_string(),
        outcome: OutcomeKind::ProcessingFailed,
        duration_ms,
    }
}

/// Read questions from a `.jsonl` file of `{"id", "question"}` records or
/// plain text with one question per line
pub fn load_questions(path: &Path) -> Result<Vec<BatchQuestion>> {
    let file = std::fs::File::open(path).map_err(|e| RegconError::Io {
        source: e,
        context: format!("Failed to open questions file: {}", path.display()),
    })?;
    let jsonl = path.extension().is_some_and(|ext| ext == "jsonl");

    let mut questions = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| RegconError::Io {
            source: e,
            context: format!("Failed to read {}:{}", path.display(), line_no + 1),
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let question = if jsonl {
            serde_json::from_str::<BatchQuestion>(line).map_err(|e| RegconError::Json {
                source: e,
                context: format!("Invalid question at {}:{}", path.display(), line_no + 1),
            })?
        } else {
            BatchQuestion {
                id: None,
                question: line.to_string(),
            }
        };

        if question.question.trim().is_empty() {
            warn!("Skipping empty question at {}:{}", path.display(), line_no + 1);
            continue;
        }
        questions.push(question);
    }

    Ok(questions)
}

/// Write answers as JSON lines
pub fn write_answers(path: &Path, answers: &[BatchAnswer]) -> Result<()> {
    let mut file = std::fs::File::create(path).map_err(|e| RegconError::Io {
        source: e,
        context: format!("Failed to create output file: {}", path.display()),
    })?;

    for answer in answers {
        let line = serde_json::to_string(answer).map_err(|e| RegconError::Json {
            source: e,
            context: format!("Failed to serialize answer {}", answer.id),
        })?;
        writeln!(file, "{}", line).map_err(|e| RegconError::Io {
            source: e,
            context: format!("Failed to write output file: {}", path.display()),
        })?;
    }

    Ok(())
}
