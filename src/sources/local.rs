//! Local directory document source.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use walkdir::WalkDir;

use super::DocumentSource;
use crate::error::DocumentError;
use crate::models::{Document, DocumentId, DocumentText, ProjectId};
use crate::utils::file::{is_text_document, read_file_content, relative_path};
use crate::utils::{markdown_sections, sentence_spans};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "**/.git/**",
    "**/node_modules/**",
    "**/target/**",
    "**/.venv/**",
];

/// One directory tree is one project; every text file below it is a document.
///
/// Document ids are derived from the path relative to the root, so a file keeps
/// its id across runs and a rename looks like a removal plus a creation.
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
    project: ProjectId,
    exclude_patterns: Vec<glob::Pattern>,
    max_file_size: u64,
    paths: Mutex<HashMap<DocumentId, PathBuf>>,
}

impl DirectorySource {
    pub fn new(root: PathBuf, exclude_patterns: &[String], max_file_size: u64) -> Self {
        let project = ProjectId::from_key(&root.to_string_lossy());
        let exclude_patterns = exclude_patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!("ignoring invalid exclude pattern {p:?}: {e}");
                    None
                }
            })
            .collect();

        Self {
            root,
            project,
            exclude_patterns,
            max_file_size,
            paths: Mutex::new(HashMap::new()),
        }
    }

    /// Source over `root` with the default excludes and size limit.
    pub fn with_defaults(root: PathBuf) -> Self {
        let excludes: Vec<String> = DEFAULT_EXCLUDE_PATTERNS
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self::new(root, &excludes, DEFAULT_MAX_FILE_SIZE)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The project this directory represents.
    pub fn project(&self) -> ProjectId {
        self.project
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.exclude_patterns.iter().any(|p| p.matches(&path_str))
    }

    /// Walk the tree and refresh the id to path map.
    fn scan(&self) -> Result<Vec<Document>, DocumentError> {
        let mut documents = Vec::new();
        let mut paths = HashMap::new();

        for entry in WalkDir::new(&self.root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| DocumentError::Listing {
                project: self.project,
                message: e.to_string(),
            })?;
            let path = entry.path();

            if !path.is_file() || self.is_excluded(path) || !is_text_document(path) {
                continue;
            }
            let Some(name) = relative_path(&self.root, path) else {
                continue;
            };

            let id = DocumentId::from_key(&name);
            paths.insert(id, path.to_path_buf());
            documents.push(Document::new(id, name));
        }

        *self.paths.lock() = paths;
        Ok(documents)
    }

    fn check_project(&self, project: ProjectId) -> Result<(), DocumentError> {
        if project == self.project {
            Ok(())
        } else {
            Err(DocumentError::Listing {
                project,
                message: format!("directory {} is project {}", self.root.display(), self.project),
            })
        }
    }
}

#[async_trait]
impl DocumentSource for DirectorySource {
    async fn list_documents(&self, project: ProjectId) -> Result<Vec<Document>, DocumentError> {
        self.check_project(project)?;
        self.scan()
    }

    async fn document_text(
        &self,
        project: ProjectId,
        document: &Document,
    ) -> Result<DocumentText, DocumentError> {
        self.check_project(project)?;
        let path = self
            .paths
            .lock()
            .get(&document.id)
            .cloned()
            .unwrap_or_else(|| self.root.join(&document.name));

        let text = read_file_content(&path, self.max_file_size).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DocumentError::NotFound(document.id)
            } else {
                DocumentError::Extraction {
                    document: document.id,
                    message: e.to_string(),
                }
            }
        })?;

        let sentences = sentence_spans(&text);
        let is_markdown = path
            .extension()
            .map(|e| matches!(e.to_string_lossy().to_lowercase().as_str(), "md" | "markdown"))
            .unwrap_or(false);
        let sections = if is_markdown {
            markdown_sections(&text)
        } else {
            Vec::new()
        };

        Ok(DocumentText::new(text, sentences).with_sections(sections))
    }

    async fn document_name(&self, project: ProjectId, id: DocumentId) -> Option<String> {
        if project != self.project {
            return None;
        }
        let cached = self.paths.lock().get(&id).cloned();
        let path = match cached {
            Some(path) => path,
            None => {
                // Not listed in this process yet
                self.scan().ok()?;
                self.paths.lock().get(&id).cloned()?
            }
        };
        if !path.is_file() {
            return None;
        }
        relative_path(&self.root, &path)
    }
}
