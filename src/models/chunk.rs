//! Chunks and the entries they are stored as.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::document::DocumentId;

/// A retrievable, offset-addressed span of document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: DocumentId,
    pub document_name: String,
    pub section: Option<String>,
    pub text: String,
    /// Byte offset into the original document text
    pub begin: usize,
    /// Byte offset into the original document text, `begin <= end`
    pub end: usize,
    /// Similarity score, `NaN` until scored
    pub score: f32,
}

impl Chunk {
    pub fn new(
        document_id: DocumentId,
        document_name: impl Into<String>,
        section: Option<String>,
        text: impl Into<String>,
        begin: usize,
        end: usize,
    ) -> Self {
        Self {
            document_id,
            document_name: document_name.into(),
            section,
            text: text.into(),
            begin,
            end,
            score: f32::NAN,
        }
    }

    #[must_use]
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn is_scored(&self) -> bool {
        !self.score.is_nan()
    }

    /// Whether the offset ranges of both chunks intersect.
    pub fn overlaps(&self, other: &Chunk) -> bool {
        self.begin < other.end && other.begin < self.end
    }

    /// Merge two chunks of the same document and section.
    ///
    /// The text of the chunk that starts first (by `begin`, then `end`) comes
    /// first, so `a.merge(&b) == b.merge(&a)`. Returns `None` when the chunks
    /// belong to different documents or sections.
    pub fn merge(&self, other: &Chunk) -> Option<Chunk> {
        if self.document_id != other.document_id || self.section != other.section {
            return None;
        }

        let (first, second) = if (other.begin, other.end) < (self.begin, self.end) {
            (other, self)
        } else {
            (self, other)
        };

        Some(Chunk {
            document_id: self.document_id,
            document_name: first.document_name.clone(),
            section: self.section.clone(),
            text: format!("{}\n{}", first.text, second.text),
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
            score: (self.score + other.score) / 2.0,
        })
    }
}

/// Ranking order: score descending (`NaN` last), then document id, then begin.
pub fn rank_order(a: &Chunk, b: &Chunk) -> Ordering {
    compare_scores_desc(a.score, b.score)
        .then_with(|| a.document_id.cmp(&b.document_id))
        .then_with(|| a.begin.cmp(&b.begin))
}

pub(crate) fn compare_scores_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// The persisted unit inside a vector index, one per chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub embedding: Vec<f32>,
    pub text: String,
    pub section: Option<String>,
    pub document_id: DocumentId,
    pub begin: usize,
    pub end: usize,
}

impl IndexEntry {
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>) -> Self {
        Self {
            embedding,
            text: chunk.text.clone(),
            section: chunk.section.clone(),
            document_id: chunk.document_id,
            begin: chunk.begin,
            end: chunk.end,
        }
    }
}

/// A stored entry returned by a nearest-neighbor search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub document_id: DocumentId,
    pub section: Option<String>,
    pub text: String,
    pub begin: usize,
    pub end: usize,
    pub score: f32,
}

impl IndexHit {
    pub fn into_chunk(self, document_name: impl Into<String>) -> Chunk {
        Chunk {
            document_id: self.document_id,
            document_name: document_name.into(),
            section: self.section,
            text: self.text,
            begin: self.begin,
            end: self.end,
            score: self.score,
        }
    }
}
