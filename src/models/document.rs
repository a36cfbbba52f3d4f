use serde::{Deserialize, Serialize};

/// Identifier of a project. Each project owns exactly one vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

/// Identifier of a document within the surrounding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ProjectId {
    /// Derive a stable id from an arbitrary key (e.g. a canonical path).
    pub fn from_key(key: &str) -> Self {
        Self(stable_id(key))
    }
}

impl DocumentId {
    /// Derive a stable id from an arbitrary key (e.g. a relative path).
    pub fn from_key(key: &str) -> Self {
        Self(stable_id(key))
    }
}

/// First 8 bytes of a SHA-256 digest, masked to a non-negative `i64`.
fn stable_id(key: &str) -> i64 {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    (u64::from_be_bytes(bytes) & (i64::MAX as u64)) as i64
}

/// Document metadata as seen by the indexing core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
}

impl Document {
    pub fn new(id: DocumentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Half-open byte range `[begin, end)` into a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TextSpan {
    pub begin: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.begin <= offset && offset < self.end
    }
}

/// A named region of a document (e.g. a heading and the text below it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpan {
    pub name: String,
    pub begin: usize,
    pub end: usize,
}

/// Plain text of a document together with its sentence and section layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentText {
    pub text: String,
    pub sentences: Vec<TextSpan>,
    #[serde(default)]
    pub sections: Vec<SectionSpan>,
}

impl DocumentText {
    pub fn new(text: impl Into<String>, sentences: Vec<TextSpan>) -> Self {
        Self {
            text: text.into(),
            sentences,
            sections: Vec::new(),
        }
    }

    pub fn with_sections(mut self, sections: Vec<SectionSpan>) -> Self {
        self.sections = sections;
        self
    }

    /// Name of the section containing `offset`, if any.
    pub fn section_at(&self, offset: usize) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.begin <= offset && offset < s.end)
            .map(|s| s.name.as_str())
    }
}
