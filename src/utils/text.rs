//! Text processing utilities.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{SectionSpan, TextSpan};

static RE_SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.!?]+)\s+|\n\s*\n").unwrap());
static RE_MARKDOWN_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.+?)[ \t#]*$").unwrap());

/// Shrink `span` so it neither starts nor ends with whitespace in `text`.
///
/// Returns an empty span at the original `begin` when the span is all
/// whitespace or does not lie on character boundaries of `text`.
pub fn trim_span(text: &str, span: TextSpan) -> TextSpan {
    let Some(slice) = text.get(span.begin..span.end) else {
        return TextSpan::new(span.begin, span.begin);
    };
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading == slice.len() {
        return TextSpan::new(span.begin, span.begin);
    }
    TextSpan::new(span.begin + leading, span.end - trailing)
}

/// Split plain text into sentence spans.
///
/// A sentence ends at terminal punctuation followed by whitespace, or at a
/// blank line. Spans are trimmed and empty ones dropped.
pub fn sentence_spans(text: &str) -> Vec<TextSpan> {
    let mut spans = Vec::new();
    let mut start = 0;

    for caps in RE_SENTENCE_END.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let end = caps.get(1).map_or(whole.start(), |p| p.end());
        push_trimmed(text, &mut spans, TextSpan::new(start, end));
        start = whole.end();
    }
    push_trimmed(text, &mut spans, TextSpan::new(start, text.len()));

    spans
}

fn push_trimmed(text: &str, spans: &mut Vec<TextSpan>, span: TextSpan) {
    let trimmed = trim_span(text, span);
    if !trimmed.is_empty() {
        spans.push(trimmed);
    }
}

/// Derive sections from Markdown ATX headings.
///
/// Each section runs from its heading to the next heading (or the end of the
/// text). Text before the first heading belongs to no section.
pub fn markdown_sections(text: &str) -> Vec<SectionSpan> {
    let headings: Vec<(usize, String)> = RE_MARKDOWN_HEADING
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let title = caps.get(1)?.as_str().trim();
            (!title.is_empty()).then(|| (whole.start(), title.to_string()))
        })
        .collect();

    headings
        .iter()
        .enumerate()
        .map(|(i, (begin, name))| SectionSpan {
            name: name.clone(),
            begin: *begin,
            end: headings.get(i + 1).map_or(text.len(), |(next, _)| *next),
        })
        .collect()
}
