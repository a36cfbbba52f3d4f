//! Search-related models for queries and results.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::chunk::Chunk;
use super::document::{Document, DocumentId};

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Immutable snapshot of a query response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matching chunks, best first
    pub matches: Vec<Chunk>,

    /// Number of nearest-neighbor hits that passed the score threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_matches: Option<usize>,

    /// Whether the nearest-neighbor search returned a full page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
}

impl SearchResult {
    /// The no-match result.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(matches: Vec<Chunk>, total_matches: usize, truncated: bool) -> Self {
        Self {
            matches,
            total_matches: Some(total_matches),
            truncated: Some(truncated),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }
}

/// Work computed once per reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub to_unindex: BTreeSet<DocumentId>,
    pub to_index: Vec<Document>,
}

impl ReconciliationPlan {
    /// Progress units an indexed document is worth.
    pub const UNITS_PER_DOCUMENT: u64 = 100;

    /// Diff the ids stored in the index against the project's documents.
    pub fn incremental(indexed: &BTreeSet<DocumentId>, documents: Vec<Document>) -> Self {
        let current: BTreeSet<DocumentId> = documents.iter().map(|d| d.id).collect();
        let to_unindex = indexed.difference(&current).copied().collect();
        let mut seen = BTreeSet::new();
        let to_index = documents
            .into_iter()
            .filter(|d| !indexed.contains(&d.id) && seen.insert(d.id))
            .collect();
        Self {
            to_unindex,
            to_index,
        }
    }

    /// Drop everything stored and index every document again.
    pub fn rebuild(indexed: &BTreeSet<DocumentId>, documents: Vec<Document>) -> Self {
        let mut seen = BTreeSet::new();
        Self {
            to_unindex: indexed.clone(),
            to_index: documents
                .into_iter()
                .filter(|d| seen.insert(d.id))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_unindex.is_empty() && self.to_index.is_empty()
    }

    pub fn total_work(&self) -> u64 {
        self.to_unindex.len() as u64 + self.to_index.len() as u64 * Self::UNITS_PER_DOCUMENT
    }
}
