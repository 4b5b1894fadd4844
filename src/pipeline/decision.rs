//! Parsing of free-form model output into decisions
//!
//! Every fallback for unparseable output lives here: scores default to 0.0,
//! reflections default to finishing.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"-?(?:\d+(?:[.,]\d+)?|[.,]\d+)").ok())
        .as_ref()
}

fn list_marker_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*(?:\d+\s*[.)]|[-*•])\s*").ok())
        .as_ref()
}

/// First number in the text that lies in [0, 1]; 0.0 when there is none
///
/// Out-of-range numbers such as `8/10` or `-0.5` are skipped, not clamped.
pub fn parse_score(text: &str) -> f32 {
    let Some(pattern) = number_pattern() else {
        return 0.0;
    };

    pattern
        .find_iter(text)
        .filter_map(|m| parse_decimal(m.as_str()))
        .find(|score| (0.0..=1.0).contains(score))
        .unwrap_or(0.0)
}

fn parse_decimal(raw: &str) -> Option<f32> {
    let mut normalized = raw.replace(',', ".");
    // ".85" and "-.5" need a leading zero
    if let Some(dot) = normalized.find('.') {
        if dot == 0 || (dot == 1 && normalized.starts_with('-')) {
            normalized.insert(dot, '0');
        }
    }
    normalized.parse::<f32>().ok().filter(|v| v.is_finite())
}

/// One alternative phrasing per line, list markers and blank lines removed
pub fn parse_expansions(text: &str, limit: usize) -> Vec<String> {
    text.lines()
        .map(|line| match list_marker_pattern() {
            Some(pattern) => pattern.replace(line, "").trim().to_string(),
            None => line.trim().to_string(),
        })
        .map(|line| line.trim_matches('"').trim().to_string())
        .filter(|line| !line.is_empty())
        .take(limit)
        .collect()
}

/// Outcome of grading a draft
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeDecision {
    ContinueRefine,
    Finish,
}

impl GradeDecision {
    pub fn decide(score: f32, threshold: f32, refine_cycles: u32, max_refine_cycles: u32) -> Self {
        if score >= threshold || refine_cycles >= max_refine_cycles {
            GradeDecision::Finish
        } else {
            GradeDecision::ContinueRefine
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    Search { query: String },
    Finish,
}

/// Critique of a draft and what to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reflection {
    pub critique: String,
    pub action: NextAction,
}

impl Reflection {
    pub fn finish(critique: impl Into<String>) -> Self {
        Self {
            critique: critique.into(),
            action: NextAction::Finish,
        }
    }

    pub fn is_search(&self) -> bool {
        matches!(self.action, NextAction::Search { .. })
    }
}

#[derive(Debug, Deserialize)]
struct ReflectionPayload {
    #[serde(default)]
    critique: Option<String>,
    action: String,
    #[serde(default, alias = "query", alias = "search_query")]
    new_query: Option<String>,
}

/// Locate a reflection object anywhere in the text
///
/// A `search` action without a usable query, or anything that fails to parse,
/// becomes `Finish`.
pub fn parse_reflection(text: &str) -> Reflection {
    let Some(payload) = find_payload(text) else {
        return Reflection::finish(text.trim());
    };

    let critique = payload.critique.unwrap_or_default().trim().to_string();
    let query = payload
        .new_query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());

    match (payload.action.trim().to_ascii_lowercase().as_str(), query) {
        ("search", Some(query)) => Reflection {
            critique,
            action: NextAction::Search { query },
        },
        _ => Reflection::finish(critique),
    }
}

fn find_payload(text: &str) -> Option<ReflectionPayload> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value @ Value::Object(_))) => serde_json::from_value(value).ok(),
            _ => None,
        }
    })
}
