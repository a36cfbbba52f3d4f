//! Utility modules.

pub mod file;
pub mod retry;
pub mod text;

pub use file::{is_text_document, read_file_content, relative_path};
pub use retry::{Backoff, Retryable};
pub use text::{markdown_sections, sentence_spans, trim_span};
