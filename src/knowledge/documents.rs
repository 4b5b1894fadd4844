//! Raw corpus documents and provenance prefixes

use crate::error::{RegconError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Structural position of a document within its source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub chapter: Option<String>,
    /// Article numbers come as strings or numbers depending on the scraper
    #[serde(default)]
    pub article_number: Option<Value>,
}

/// One record of `raw_documents.jsonl`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub doc_id: String,
    pub source_name: String,
    pub source_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<DocumentMetadata>,
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

impl RawDocument {
    /// Provenance text prepended to every chunk of this document
    ///
    /// Kept inline so it takes part in embedding and retrieval.
    pub fn provenance_prefix(&self) -> String {
        let mut prefix = format!("Source: {} ({}). ", self.source_name, self.source_type);

        if !self.title.trim().is_empty() {
            prefix.push_str(&format!("Title: {}. ", self.title.trim()));
        }

        if let Some(metadata) = &self.metadata {
            if let Some(chapter) = metadata.chapter.as_deref().map(str::trim) {
                if !chapter.is_empty() {
                    prefix.push_str(&format!("Chapter: {}. ", chapter));
                }
            }
            if let Some(article) = metadata.article_number.as_ref().and_then(value_text) {
                prefix.push_str(&format!("Article: {}. ", article));
            }
        }

        prefix
    }
}

/// Read a JSONL file of raw documents, skipping blank lines
pub fn load_raw_documents(path: &Path) -> Result<Vec<RawDocument>> {
    let file = std::fs::File::open(path).map_err(|e| RegconError::Io {
        source: e,
        context: format!("Failed to open raw documents: {}", path.display()),
    })?;

    let mut documents = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| RegconError::Io {
            source: e,
            context: format!("Failed to read {}:{}", path.display(), line_no + 1),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let document: RawDocument = serde_json::from_str(&line).map_err(|e| RegconError::Json {
            source: e,
            context: format!("Invalid document at {}:{}", path.display(), line_no + 1),
        })?;
        documents.push(document);
    }

    Ok(documents)
}
