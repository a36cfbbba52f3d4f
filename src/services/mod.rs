//! Indexing and retrieval services.

pub mod chunker;
pub mod embedding;
pub mod merger;
pub mod pool;
pub mod query;
pub mod reconciler;
pub mod scheduler;
pub mod service;
pub mod tokenizer;
pub mod vector_index;

pub use chunker::{ChunkSpan, Chunker};
pub use embedding::{Embedder, HttpEmbeddingClient, normalize};
pub use merger::merge_chunks;
pub use pool::{IndexLease, IndexPool, PoolOptions};
pub use query::QueryService;
pub use reconciler::{
    IndexReconciler, ReconcileJob, ReconcileMode, ReconcileReport, ReconcileStatus,
    ReconcileTrigger,
};
pub use scheduler::{
    CancellationFlag, Job, JobContext, JobKey, JobKind, JobOutcome, JobState, Progress, Scheduler,
};
pub use service::IndexService;
pub use tokenizer::{HeuristicTokenCounter, HfTokenCounter, TokenCounter, token_counter_from_config};
pub use vector_index::VectorIndex;
