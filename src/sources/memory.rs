//! In-memory document source.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::DocumentSource;
use crate::error::DocumentError;
use crate::models::{Document, DocumentId, DocumentText, ProjectId};
use crate::utils::{markdown_sections, sentence_spans};

#[derive(Debug, Clone)]
struct StoredDocument {
    name: String,
    content: DocumentText,
}

/// Documents held in memory, for applications that own their documents
/// elsewhere and for tests.
#[derive(Debug, Default)]
pub struct MemoryDocumentSource {
    projects: RwLock<HashMap<ProjectId, BTreeMap<DocumentId, StoredDocument>>>,
}

impl MemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document with pre-computed layout.
    pub fn insert(
        &self,
        project: ProjectId,
        document: Document,
        content: DocumentText,
    ) {
        self.projects.write().entry(project).or_default().insert(
            document.id,
            StoredDocument {
                name: document.name,
                content,
            },
        );
    }

    /// Insert plain text, splitting sentences and Markdown headings.
    pub fn insert_text(&self, project: ProjectId, document: Document, text: &str) {
        let content =
            DocumentText::new(text, sentence_spans(text)).with_sections(markdown_sections(text));
        self.insert(project, document, content);
    }

    pub fn remove(&self, project: ProjectId, id: DocumentId) -> bool {
        self.projects
            .write()
            .get_mut(&project)
            .is_some_and(|docs| docs.remove(&id).is_some())
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentSource {
    async fn list_documents(&self, project: ProjectId) -> Result<Vec<Document>, DocumentError> {
        let projects = self.projects.read();
        Ok(projects
            .get(&project)
            .map(|docs| {
                docs.iter()
                    .map(|(id, doc)| Document::new(*id, doc.name.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn document_text(
        &self,
        project: ProjectId,
        document: &Document,
    ) -> Result<DocumentText, DocumentError> {
        self.projects
            .read()
            .get(&project)
            .and_then(|docs| docs.get(&document.id))
            .map(|doc| doc.content.clone())
            .ok_or(DocumentError::NotFound(document.id))
    }

    async fn document_name(&self, project: ProjectId, id: DocumentId) -> Option<String> {
        self.projects
            .read()
            .get(&project)
            .and_then(|docs| docs.get(&id))
            .map(|doc| doc.name.clone())
    }
}
