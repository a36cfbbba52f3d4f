mod chunk;
mod config;
mod document;
mod search;

pub use chunk::{Chunk, IndexEntry, IndexHit, rank_order};
pub(crate) use chunk::compare_scores_desc;
pub use config::{
    ChunkingConfig, Config, DEFAULT_EMBEDDING_URL, DEFAULT_SCORE_THRESHOLD, DEFAULT_TOKEN_BUDGET,
    EmbeddingConfig, IndexConfig, LoggingConfig, QueryConfig, ReconcileConfig,
};
pub use document::{Document, DocumentId, DocumentText, ProjectId, SectionSpan, TextSpan};
pub use search::{OutputFormat, ReconciliationPlan, SearchResult};
