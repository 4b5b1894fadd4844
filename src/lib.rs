//! Regcon - Adaptive Retrieval Consultant
//!
//! Answers tax and regulatory questions from a private document corpus. A
//! question is expanded, matched against a vector index of the corpus and
//! answered by a language model, then graded and refined or critiqued and
//! re-searched within bounded cycles.

pub mod batch;
pub mod cli;
pub mod config;
pub mod consultant;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod retrieval;
pub mod usage;

pub use error::{RegconError, Result};
