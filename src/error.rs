//! Error types for the document index.

use std::time::Duration;

use thiserror::Error;

use crate::models::{DocumentId, ProjectId};
use crate::utils::retry::Retryable;

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            // 5xx gateway errors and rate limiting are usually transient
            EmbeddingError::ServerError(msg) => {
                msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.to_lowercase().contains("unavailable")
                    || msg.to_lowercase().contains("too many requests")
            }
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_) => false,
        }
    }
}

/// Errors related to a project's vector index and its lease.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("timed out after {waited:?} waiting for the index lease of project {project}")]
    LeaseTimeout { project: ProjectId, waited: Duration },

    #[error("index of project {0} is leased")]
    LeaseOutstanding(ProjectId),

    #[error("index of project {0} is closed")]
    Closed(ProjectId),

    #[error("index storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors raised by a document source.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document {0} not found")]
    NotFound(DocumentId),

    #[error("text extraction failed for document {document}: {message}")]
    Extraction {
        document: DocumentId,
        message: String,
    },

    #[error("failed to list documents of project {project}: {message}")]
    Listing { project: ProjectId, message: String },
}

/// Errors that abort a reconciliation run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("document source error: {0}")]
    Documents(#[from] DocumentError),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}
