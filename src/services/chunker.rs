//! Sentence-atomic chunking under a token budget.

use std::sync::Arc;

use crate::models::{Chunk, Document, DocumentText, TextSpan};
use crate::services::tokenizer::TokenCounter;
use crate::utils::trim_span;

/// Splits a document's sentences into contiguous chunks.
///
/// Sentences are accumulated until the next one would push the running token
/// count past 90% of the budget; the remaining 10% absorbs tokenizer
/// disagreement and prompt overhead downstream. A sentence is never split,
/// so a single sentence above the budget becomes a chunk of its own. Chunks
/// never straddle a section boundary.
#[derive(Clone)]
pub struct Chunker {
    counter: Arc<dyn TokenCounter>,
    token_budget: usize,
}

/// A sealed chunk before its text is copied out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub span: TextSpan,
    pub section: Option<String>,
    pub tokens: usize,
}

struct Pending<'a> {
    begin: usize,
    end: usize,
    tokens: usize,
    section: Option<&'a str>,
}

impl Chunker {
    pub fn new(counter: Arc<dyn TokenCounter>, token_budget: usize) -> Self {
        Self {
            counter,
            token_budget,
        }
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    /// Running-count ceiling: `floor(token_budget * 0.9)`.
    pub fn effective_limit(&self) -> usize {
        self.token_budget * 9 / 10
    }

    /// Chunk a document into unscored chunks.
    pub fn process(&self, document: &Document, content: &DocumentText) -> Vec<Chunk> {
        self.split(content)
            .into_iter()
            .map(|c| {
                Chunk::new(
                    document.id,
                    document.name.clone(),
                    c.section,
                    &content.text[c.span.begin..c.span.end],
                    c.span.begin,
                    c.span.end,
                )
            })
            .collect()
    }

    /// Compute chunk boundaries, trimmed of surrounding whitespace.
    pub fn split(&self, content: &DocumentText) -> Vec<ChunkSpan> {
        let text = content.text.as_str();
        let limit = self.effective_limit();

        let mut sentences = content.sentences.clone();
        sentences.sort();

        let mut chunks = Vec::new();
        let mut current: Option<Pending<'_>> = None;

        for sentence in sentences {
            let Some(sentence_text) = text.get(sentence.begin..sentence.end) else {
                tracing::warn!(
                    target: "chunker",
                    "skipping sentence {}..{} outside text of {} bytes",
                    sentence.begin,
                    sentence.end,
                    text.len()
                );
                continue;
            };

            let tokens = self.counter.count_tokens(sentence_text);
            let section = content.section_at(sentence.begin);

            if let Some(pending) = current.as_mut() {
                let fits = pending.tokens + tokens <= limit;
                if fits && pending.section == section && sentence.begin >= pending.end {
                    pending.end = sentence.end;
                    pending.tokens += tokens;
                    continue;
                }
            }

            if let Some(done) = current.take() {
                seal(text, done, &mut chunks);
            }
            current = Some(Pending {
                begin: sentence.begin,
                end: sentence.end,
                tokens,
                section,
            });
        }

        if let Some(done) = current {
            seal(text, done, &mut chunks);
        }

        chunks
    }
}

fn seal(text: &str, pending: Pending<'_>, chunks: &mut Vec<ChunkSpan>) {
    let span = trim_span(text, TextSpan::new(pending.begin, pending.end));
    if span.is_empty() {
        return;
    }
    chunks.push(ChunkSpan {
        span,
        section: pending.section.map(String::from),
        tokens: pending.tokens,
    });
}
