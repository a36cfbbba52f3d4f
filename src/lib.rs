pub mod cli;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod sources;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::AppError;
pub use models::{
    Chunk, Config, Document, DocumentId, DocumentText, OutputFormat, ProjectId, SearchResult,
};
pub use services::{IndexService, ReconcileMode, ReconcileReport};
pub use sources::{DirectorySource, DocumentSource, MemoryDocumentSource};
