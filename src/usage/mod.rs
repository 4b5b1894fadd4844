//! Token and timing accounting
//!
//! A `UsageLog` belongs to one run and is passed into every stage call.
//! Concurrent runs each own a log; the batch worker merges them afterwards.

use crate::error::{RegconError, Result};
use crate::llm::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tokens consumed by one generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub model: String,
    pub task: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Wall time spent in one stage call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingRecord {
    pub task: String,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageLog {
    tokens: Vec<TokenRecord>,
    timings: Vec<TimingRecord>,
}

/// Token totals for one (model, task) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSummary {
    pub model: String,
    pub task: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub calls: usize,
    /// Percentage of all tokens in the log
    pub share: f64,
}

/// Timing statistics for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub task: String,
    pub calls: usize,
    pub total_ms: f64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Percentage of all recorded time
    pub share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub generated_at: DateTime<Utc>,
    pub total_tokens: u64,
    pub by_model_task: Vec<TokenSummary>,
    pub by_task: Vec<TimingSummary>,
    pub tokens: Vec<TokenRecord>,
    pub timings: Vec<TimingRecord>,
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        (part / whole * 10_000.0).round() / 100.0
    } else {
        0.0
    }
}

impl UsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tokens(&mut self, model: &str, task: &str, usage: TokenUsage) {
        self.tokens.push(TokenRecord {
            model: model.to_string(),
            task: task.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            recorded_at: Utc::now(),
        });
    }

    pub fn record_timing(&mut self, task: &str, duration: Duration) {
        self.timings.push(TimingRecord {
            task: task.to_string(),
            duration_ms: duration.as_secs_f64() * 1000.0,
        });
    }

    /// Append another run's records
    pub fn merge(&mut self, other: UsageLog) {
        self.tokens.extend(other.tokens);
        self.timings.extend(other.timings);
    }

    pub fn tokens(&self) -> &[TokenRecord] {
        &self.tokens
    }

    pub fn timings(&self) -> &[TimingRecord] {
        &self.timings
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.timings.is_empty()
    }

    pub fn total_tokens(&self) -> u64 {
        self.tokens.iter().map(|r| r.total_tokens).sum()
    }

    pub fn token_summary(&self) -> Vec<TokenSummary> {
        let mut groups: BTreeMap<(&str, &str), TokenSummary> = BTreeMap::new();

        for record in &self.tokens {
            let entry = groups
                .entry((record.model.as_str(), record.task.as_str()))
                .or_insert_with(|| TokenSummary {
                    model: record.model.clone(),
                    task: record.task.clone(),
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    total_tokens: 0,
                    calls: 0,
                    share: 0.0,
                });
            entry.prompt_tokens += record.prompt_tokens;
            entry.completion_tokens += record.completion_tokens;
            entry.total_tokens += record.total_tokens;
            entry.calls += 1;
        }

        let total = self.total_tokens() as f64;
        groups
            .into_values()
            .map(|mut summary| {
                summary.share = percentage(summary.total_tokens as f64, total);
                summary
            })
            .collect()
    }

    /// Per-task timing statistics, most expensive task first
    pub fn timing_summary(&self) -> Vec<TimingSummary> {
        let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for record in &self.timings {
            groups.entry(record.task.as_str()).or_default().push(record.duration_ms);
        }

        let overall: f64 = self.timings.iter().map(|r| r.duration_ms).sum();
        let mut summaries: Vec<TimingSummary> = groups
            .into_iter()
            .map(|(task, durations)| {
                let total: f64 = durations.iter().sum();
                TimingSummary {
                    task: task.to_string(),
                    calls: durations.len(),
                    total_ms: total,
                    mean_ms: total / durations.len() as f64,
                    min_ms: durations.iter().copied().fold(f64::INFINITY, f64::min),
                    max_ms: durations.iter().copied().fold(0.0, f64::max),
                    share: percentage(total, overall),
                }
            })
            .collect();

        summaries.sort_by(|a, b| b.total_ms.total_cmp(&a.total_ms));
        summaries
    }

    pub fn report(&self) -> UsageReport {
        UsageReport {
            generated_at: Utc::now(),
            total_tokens: self.total_tokens(),
            by_model_task: self.token_summary(),
            by_task: self.timing_summary(),
            tokens: self.tokens.clone(),
            timings: self.timings.clone(),
        }
    }

    /// Write the report as `<timestamp>_usage.json` under `dir`
    pub fn save_report(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| RegconError::Io {
            source: e,
            context: format!("Failed to create logs directory: {}", dir.display()),
        })?;

        let report = self.report();
        let path = dir.join(format!(
            "{}_usage.json",
            report.generated_at.format("%Y%m%d_%H%M%S")
        ));

        let json = serde_json::to_string_pretty(&report).map_err(|e| RegconError::Json {
            source: e,
            context: "Failed to serialize usage report".to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| RegconError::Io {
            source: e,
            context: format!("Failed to write usage report: {}", path.display()),
        })?;

        tracing::info!("Usage report saved to {}", path.display());
        Ok(path)
    }
}
