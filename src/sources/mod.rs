//! Document sources.
//!
//! A source is the authoritative list of a project's documents and the only
//! place their text comes from. The indexing core never reads raw files.

mod local;
mod memory;

pub use local::{DEFAULT_EXCLUDE_PATTERNS, DEFAULT_MAX_FILE_SIZE, DirectorySource};
pub use memory::MemoryDocumentSource;

use async_trait::async_trait;

use crate::error::DocumentError;
use crate::models::{Document, DocumentId, DocumentText, ProjectId};

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Every document currently belonging to the project.
    async fn list_documents(&self, project: ProjectId) -> Result<Vec<Document>, DocumentError>;

    /// Plain text plus sentence and section spans of a document.
    async fn document_text(
        &self,
        project: ProjectId,
        document: &Document,
    ) -> Result<DocumentText, DocumentError>;

    /// Display name of a document, `None` once it no longer exists.
    async fn document_name(&self, project: ProjectId, id: DocumentId) -> Option<String>;
}
