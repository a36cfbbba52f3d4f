//! Facade wiring pool, scheduler, reconciler and query path together.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::{AppError, IndexError, ReconcileError};
use crate::models::{Config, DocumentId, ProjectId, QueryConfig, SearchResult};
use crate::services::chunker::Chunker;
use crate::services::embedding::{Embedder, HttpEmbeddingClient};
use crate::services::pool::IndexPool;
use crate::services::query::QueryService;
use crate::services::reconciler::{
    IndexReconciler, ReconcileMode, ReconcileReport, ReconcileTrigger,
};
use crate::services::scheduler::{JobContext, JobKey, JobState, Scheduler};
use crate::services::tokenizer::{TokenCounter, token_counter_from_config};
use crate::services::vector_index::INDEX_FILE_NAME;
use crate::sources::DocumentSource;

/// Entry point for applications embedding the index.
///
/// Document events schedule debounced reconciliations; queries run on the
/// caller's task. Must be created inside a tokio runtime.
pub struct IndexService {
    pool: IndexPool,
    reconciler: Arc<IndexReconciler>,
    trigger: ReconcileTrigger,
    query: QueryService,
    query_defaults: QueryConfig,
    eviction: Mutex<Option<JoinHandle<()>>>,
}

impl IndexService {
    pub fn new(
        config: &Config,
        documents: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        let pool = IndexPool::from_config(&config.index);
        let chunker = Chunker::new(counter, config.chunking.token_budget as usize);
        let reconciler = Arc::new(IndexReconciler::new(
            pool.clone(),
            documents.clone(),
            embedder.clone(),
            chunker,
            config.embedding.batch_size as usize,
        ));
        let trigger = ReconcileTrigger::new(
            Arc::new(Scheduler::new()),
            reconciler.clone(),
            config.reconcile.debounce(),
        );
        let query =
            QueryService::new(pool.clone(), documents, embedder).with_trigger(trigger.clone());
        let eviction = pool.spawn_eviction(config.index.eviction_interval());

        Self {
            pool,
            reconciler,
            trigger,
            query,
            query_defaults: config.query.clone(),
            eviction: Mutex::new(Some(eviction)),
        }
    }

    /// Service using the HTTP embedding client and configured tokenizer.
    pub fn from_config(
        config: &Config,
        documents: Arc<dyn DocumentSource>,
    ) -> Result<Self, AppError> {
        let embedder = Arc::new(HttpEmbeddingClient::new(&config.embedding)?);
        let counter: Arc<dyn TokenCounter> = Arc::from(token_counter_from_config(&config.chunking)?);
        Ok(Self::new(config, documents, embedder, counter))
    }

    pub fn pool(&self) -> &IndexPool {
        &self.pool
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.trigger.scheduler()
    }

    pub fn document_created(&self, project: ProjectId, document: DocumentId) -> JobKey {
        tracing::debug!(target: "reconcile", "document {document} created in project {project}");
        self.trigger.fire(project, ReconcileMode::Incremental)
    }

    pub fn document_removed(&self, project: ProjectId, document: DocumentId) -> JobKey {
        tracing::debug!(target: "reconcile", "document {document} removed from project {project}");
        self.trigger.fire(project, ReconcileMode::Incremental)
    }

    pub fn request_rebuild(&self, project: ProjectId) -> JobKey {
        self.trigger.fire(project, ReconcileMode::Rebuild)
    }

    /// Run a reconciliation on the caller's task, bypassing the scheduler.
    pub async fn reconcile_now(
        &self,
        project: ProjectId,
        mode: ReconcileMode,
        ctx: &JobContext,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.reconciler.reconcile(project, mode, ctx).await
    }

    /// Query with the configured `top_n` and score threshold.
    pub async fn query(&self, project: ProjectId, query_text: &str) -> SearchResult {
        self.query
            .query(
                project,
                query_text,
                self.query_defaults.top_n as usize,
                self.query_defaults.score_threshold,
            )
            .await
    }

    /// Whether the project has a stored index holding at least one entry.
    ///
    /// Never creates the index and never schedules a reconciliation.
    pub async fn is_indexed(&self, project: ProjectId) -> Result<bool, IndexError> {
        let file = self.pool.index_dir(project).join(INDEX_FILE_NAME);
        if !file.exists() {
            return Ok(false);
        }
        let lease = self.pool.borrow(project).await?;
        Ok(!lease.is_empty()?)
    }

    pub fn query_service(&self) -> &QueryService {
        &self.query
    }

    pub fn job_state(&self, key: JobKey) -> Option<JobState> {
        self.scheduler().state(key)
    }

    pub fn job_progress(&self, key: JobKey) -> Option<(u64, u64)> {
        self.scheduler().progress(key)
    }

    /// Cancel the project's jobs and delete its index.
    ///
    /// Fails with `LeaseOutstanding` while a query or a running job holds the lease.
    pub fn clear_index(&self, project: ProjectId) -> Result<(), IndexError> {
        self.scheduler().cancel(JobKey::reconcile(project));
        self.scheduler().cancel(JobKey::rebuild(project));
        self.pool.clear_index(project)
    }

    pub fn shutdown(&self) {
        self.scheduler().shutdown();
        if let Some(handle) = self.eviction.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for IndexService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::services::reconciler::tests::{LetterEmbedder, WordCounter};
    use crate::sources::MemoryDocumentSource;

    const P: ProjectId = ProjectId(1);

    fn setup() -> (tempfile::TempDir, Arc<MemoryDocumentSource>, IndexService) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.index.data_dir = dir.path().to_path_buf();
        config.index.borrow_wait_timeout_ms = 200;
        config.reconcile.debounce_ms = 20;
        config.query.score_threshold = 0.9;

        let source = Arc::new(MemoryDocumentSource::new());
        let service = IndexService::new(
            &config,
            source.clone(),
            Arc::new(LetterEmbedder::default()),
            Arc::new(WordCounter),
        );
        (dir, source, service)
    }

    #[tokio::test]
    async fn test_document_events_reconcile() {
        let (_dir, source, service) = setup();

        source.insert_text(P, Document::new(DocumentId(1), "a"), "The cat sat.");
        let key = service.document_created(P, DocumentId(1));
        source.insert_text(P, Document::new(DocumentId(2), "b"), "Dogs bark.");
        assert_eq!(service.document_created(P, DocumentId(2)), key);
        assert_eq!(service.scheduler().wait_for(key).await, Some(JobState::Completed));

        let result = service.query(P, "Dogs bark.").await;
        assert_eq!(result.len(), 1);
        assert_eq!(result.matches[0].document_name, "b");

        source.remove(P, DocumentId(2));
        let key = service.document_removed(P, DocumentId(2));
        service.scheduler().wait_for(key).await;
        assert!(service.query(P, "Dogs bark.").await.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_and_clear() {
        let (_dir, source, service) = setup();
        source.insert_text(P, Document::new(DocumentId(1), "a"), "The cat sat.");

        let key = service.request_rebuild(P);
        assert_eq!(key, JobKey::rebuild(P));
        assert_eq!(service.scheduler().wait_for(key).await, Some(JobState::Completed));
        assert!(service.pool().index_dir(P).exists());

        let lease = service.pool().borrow(P).await.unwrap();
        assert!(matches!(
            service.clear_index(P),
            Err(IndexError::LeaseOutstanding(_))
        ));
        drop(lease);

        service.clear_index(P).unwrap();
        assert!(!service.pool().index_dir(P).exists());
    }

    /// One dimension per concept, synonyms share a dimension.
    struct ConceptEmbedder;

    fn concept_vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; 6];
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            let dim = match word {
                "cat" | "feline" => 0,
                "sleep" | "slept" | "nap" | "napping" => 1,
                "dog" | "dogs" => 2,
                "bark" => 3,
                "sat" => 4,
                "loudly" => 5,
                _ => continue,
            };
            v[dim] += 1.0;
        }
        v
    }

    #[async_trait::async_trait]
    impl Embedder for ConceptEmbedder {
        async fn embed(&self, text: &str) -> Option<Vec<f32>> {
            Some(concept_vector(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Option<Vec<(String, Vec<f32>)>> {
            Some(texts.iter().map(|t| (t.clone(), concept_vector(t))).collect())
        }
    }

    #[tokio::test]
    async fn test_semantic_match_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.index.data_dir = dir.path().to_path_buf();

        let source = Arc::new(MemoryDocumentSource::new());
        source.insert_text(P, Document::new(DocumentId(1), "D1"), "The cat sat. It slept.");
        source.insert_text(P, Document::new(DocumentId(2), "D2"), "Dogs bark loudly.");
        let service = IndexService::new(
            &config,
            source.clone(),
            Arc::new(ConceptEmbedder),
            Arc::new(WordCounter),
        );

        let report = service
            .reconcile_now(P, ReconcileMode::Incremental, &JobContext::default())
            .await
            .unwrap();
        assert_eq!(report.chunks_added, 2);

        let result = service
            .query_service()
            .query(P, "feline napping", 5, 0.2)
            .await;
        assert_eq!(result.len(), 1);
        let hit = &result.matches[0];
        assert_eq!(hit.document_name, "D1");
        assert_eq!(hit.text, "The cat sat. It slept.");
        assert!((hit.score - 2.0 / 6f32.sqrt()).abs() < 1e-4);
        assert_eq!(result.total_matches, Some(1));
        assert_eq!(result.truncated, Some(false));

        source.remove(P, DocumentId(1));
        let report = service
            .reconcile_now(P, ReconcileMode::Incremental, &JobContext::default())
            .await
            .unwrap();
        assert_eq!(report.unindexed, 1);
        assert_eq!(report.chunks_added, 0);

        let lease = service.pool().borrow(P).await.unwrap();
        assert_eq!(lease.len().unwrap(), 1);
        assert_eq!(lease.document_ids().unwrap(), [DocumentId(2)].into());
    }

    #[tokio::test]
    async fn test_directory_query_from_fresh_service() {
        let data = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();
        std::fs::write(docs.path().join("a.txt"), "The cat sat. It slept.").unwrap();

        let mut config = Config::default();
        config.index.data_dir = data.path().to_path_buf();
        config.query.score_threshold = 0.9;

        let open = || {
            let source = Arc::new(crate::sources::DirectorySource::with_defaults(
                docs.path().to_path_buf(),
            ));
            let project = source.project();
            let service = IndexService::new(
                &config,
                source,
                Arc::new(LetterEmbedder::default()),
                Arc::new(WordCounter),
            );
            (project, service)
        };

        {
            let (project, service) = open();
            let report = service
                .reconcile_now(project, ReconcileMode::Incremental, &JobContext::default())
                .await
                .unwrap();
            assert_eq!(report.chunks_added, 1);
        }

        let (project, service) = open();
        let result = service.query(project, "The cat sat. It slept.").await;
        assert_eq!(result.len(), 1);
        assert_eq!(result.matches[0].document_name, "a.txt");
    }

    #[tokio::test]
    async fn test_is_indexed_schedules_nothing() {
        let (_dir, source, service) = setup();
        assert!(!service.is_indexed(P).await.unwrap());
        assert!(!service.pool().index_dir(P).exists());

        source.insert_text(P, Document::new(DocumentId(1), "a"), "The cat sat.");
        service
            .reconcile_now(P, ReconcileMode::Incremental, &JobContext::default())
            .await
            .unwrap();
        assert!(service.is_indexed(P).await.unwrap());

        source.remove(P, DocumentId(1));
        service
            .reconcile_now(P, ReconcileMode::Incremental, &JobContext::default())
            .await
            .unwrap();
        assert!(!service.is_indexed(P).await.unwrap());
        assert_eq!(service.job_state(JobKey::reconcile(P)), None);
    }

    #[tokio::test]
    async fn test_reconcile_now_bypasses_scheduler() {
        let (_dir, source, service) = setup();
        source.insert_text(P, Document::new(DocumentId(1), "a"), "The cat sat.");

        let report = service
            .reconcile_now(P, ReconcileMode::Incremental, &JobContext::default())
            .await
            .unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(service.job_state(JobKey::reconcile(P)), None);
        assert_eq!(service.job_progress(JobKey::reconcile(P)), None);
    }
}
