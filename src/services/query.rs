//! Ranked retrieval against a project's index.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::IndexError;
use crate::models::{Chunk, DocumentId, ProjectId, SearchResult, rank_order};
use crate::services::embedding::{Embedder, normalize};
use crate::services::merger::merge_chunks;
use crate::services::pool::IndexPool;
use crate::services::reconciler::{ReconcileMode, ReconcileTrigger};
use crate::sources::DocumentSource;

/// Answers similarity queries. Never fails: every error degrades to an empty result.
pub struct QueryService {
    pool: IndexPool,
    documents: Arc<dyn DocumentSource>,
    embedder: Arc<dyn Embedder>,
    trigger: Option<ReconcileTrigger>,
}

impl QueryService {
    pub fn new(
        pool: IndexPool,
        documents: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            pool,
            documents,
            embedder,
            trigger: None,
        }
    }

    /// Enqueue a reconciliation whenever a query finds the index empty.
    pub fn with_trigger(mut self, trigger: ReconcileTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// The `top_n` most similar chunks scoring at least `score_threshold`, best first.
    pub async fn query(
        &self,
        project: ProjectId,
        query_text: &str,
        top_n: usize,
        score_threshold: f32,
    ) -> SearchResult {
        if query_text.trim().is_empty() || top_n == 0 {
            return SearchResult::empty();
        }

        match self
            .try_query(project, query_text, top_n, score_threshold)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(target: "query", "query against project {project} failed: {e}");
                SearchResult::empty()
            }
        }
    }

    /// [`query`](Self::query) followed by merging of overlapping chunks.
    pub async fn query_merged(
        &self,
        project: ProjectId,
        query_text: &str,
        top_n: usize,
        score_threshold: f32,
    ) -> SearchResult {
        let result = self.query(project, query_text, top_n, score_threshold).await;
        SearchResult {
            matches: merge_chunks(result.matches),
            ..result
        }
    }

    async fn try_query(
        &self,
        project: ProjectId,
        query_text: &str,
        top_n: usize,
        score_threshold: f32,
    ) -> Result<SearchResult, IndexError> {
        let hits = {
            let lease = self.pool.borrow(project).await?;

            if lease.is_empty()? {
                drop(lease);
                if let Some(trigger) = &self.trigger {
                    trigger.fire(project, ReconcileMode::Incremental);
                    tracing::info!(target: "query", "index of project {project} is empty, reconciliation requested");
                }
                return Ok(SearchResult::empty());
            }

            let Some(mut vector) = self.embedder.embed(query_text).await else {
                tracing::debug!(target: "query", "no embedding for query, returning no matches");
                return Ok(SearchResult::empty());
            };
            normalize(&mut vector);

            lease.search(&vector, top_n)?
        };

        let truncated = hits.len() >= top_n;
        let hits: Vec<_> = hits
            .into_iter()
            .filter(|h| h.score >= score_threshold)
            .collect();
        let total_matches = hits.len();

        let mut names: HashMap<DocumentId, Option<String>> = HashMap::new();
        let mut matches: Vec<Chunk> = Vec::with_capacity(hits.len());
        for hit in hits {
            let name = match names.get(&hit.document_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self.documents.document_name(project, hit.document_id).await;
                    names.insert(hit.document_id, name.clone());
                    name
                }
            };
            match name {
                Some(name) => matches.push(hit.into_chunk(name)),
                None => tracing::debug!(
                    target: "query",
                    "dropping hit for removed document {}",
                    hit.document_id
                ),
            }
        }
        matches.sort_by(rank_order);

        tracing::debug!(
            target: "query",
            "project {project}: {} matches (threshold {score_threshold})",
            matches.len()
        );
        Ok(SearchResult::new(matches, total_matches, truncated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, IndexEntry};
    use crate::services::chunker::Chunker;
    use crate::services::pool::{IndexLease, PoolOptions};
    use crate::services::reconciler::IndexReconciler;
    use crate::services::reconciler::tests::{LetterEmbedder, WordCounter};
    use crate::services::scheduler::{JobKey, JobState, Scheduler};
    use crate::sources::MemoryDocumentSource;
    use async_trait::async_trait;
    use std::time::Duration;

    const P: ProjectId = ProjectId(1);

    /// Returns a fixed vector per query text.
    struct MapEmbedder(HashMap<String, Vec<f32>>);

    #[async_trait]
    impl Embedder for MapEmbedder {
        async fn embed(&self, text: &str) -> Option<Vec<f32>> {
            self.0.get(text).cloned()
        }

        async fn embed_batch(&self, _texts: &[String]) -> Option<Vec<(String, Vec<f32>)>> {
            None
        }
    }

    fn pool(dir: &tempfile::TempDir) -> IndexPool {
        IndexPool::new(
            dir.path(),
            PoolOptions {
                borrow_wait: Duration::from_millis(50),
                idle_eviction_delay: Duration::from_secs(60),
                min_idle_time: Duration::ZERO,
            },
        )
    }

    fn entry(doc: i64, begin: usize, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            embedding,
            text: format!("chunk {doc}@{begin}"),
            section: None,
            document_id: DocumentId(doc),
            begin,
            end: begin + 5,
        }
    }

    async fn seed(pool: &IndexPool) -> IndexLease {
        let mut lease = pool.borrow(P).await.unwrap();
        lease
            .add_entries(&[
                entry(1, 0, vec![1.0, 0.0]),
                entry(1, 10, vec![0.8, 0.6]),
                entry(2, 0, vec![0.6, 0.8]),
                entry(3, 0, vec![0.0, 1.0]),
            ])
            .unwrap();
        lease
    }

    fn service(pool: IndexPool) -> (Arc<MemoryDocumentSource>, QueryService) {
        let source = Arc::new(MemoryDocumentSource::new());
        for id in 1..=3 {
            source.insert_text(P, Document::new(DocumentId(id), format!("doc-{id}")), "x");
        }
        let embedder = MapEmbedder(HashMap::from([
            ("east".to_string(), vec![2.0, 0.0]),
            ("north".to_string(), vec![0.0, 1.0]),
        ]));
        let service = QueryService::new(pool, source.clone(), Arc::new(embedder));
        (source, service)
    }

    #[tokio::test]
    async fn test_score_filter_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir);
        drop(seed(&pool).await);
        let (_, service) = service(pool);

        let result = service.query(P, "east", 10, 0.5).await;
        let scores: Vec<f32> = result.matches.iter().map(|c| c.score).collect();

        assert_eq!(result.len(), 3);
        assert!(scores.iter().all(|s| *s >= 0.5));
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(result.matches[0].document_name, "doc-1");
        assert_eq!(result.total_matches, Some(3));
        assert_eq!(result.truncated, Some(false));
    }

    #[tokio::test]
    async fn test_top_n_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir);
        drop(seed(&pool).await);
        let (_, service) = service(pool);

        let result = service.query(P, "north", 2, 0.0).await;
        assert_eq!(result.len(), 2);
        assert_eq!(result.matches[0].document_id, DocumentId(3));
        assert_eq!(result.truncated, Some(true));
    }

    #[tokio::test]
    async fn test_removed_document_hits_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir);
        drop(seed(&pool).await);
        let (source, service) = service(pool);
        source.remove(P, DocumentId(1));

        let result = service.query(P, "east", 10, 0.5).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result.matches[0].document_id, DocumentId(2));
        assert_eq!(result.total_matches, Some(3));
    }

    #[tokio::test]
    async fn test_failures_degrade_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir);
        drop(seed(&pool).await);
        let (_, service) = service(pool.clone());

        // No embedding for this text
        assert!(service.query(P, "west", 10, 0.0).await.is_empty());
        assert!(service.query(P, "   ", 10, 0.0).await.is_empty());
        assert!(service.query(P, "east", 0, 0.0).await.is_empty());

        // Lease held elsewhere
        let _held = pool.borrow(P).await.unwrap();
        assert_eq!(service.query(P, "east", 10, 0.0).await, SearchResult::empty());
    }

    #[tokio::test]
    async fn test_merged_query() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir);
        {
            let mut lease = pool.borrow(P).await.unwrap();
            lease
                .add_entries(&[
                    IndexEntry {
                        end: 12,
                        ..entry(1, 0, vec![1.0, 0.0])
                    },
                    entry(1, 10, vec![0.8, 0.6]),
                ])
                .unwrap();
        }
        let (_, service) = service(pool);

        let result = service.query_merged(P, "east", 10, 0.0).await;
        assert_eq!(result.len(), 1);
        assert_eq!((result.matches[0].begin, result.matches[0].end), (0, 15));
        assert!((result.matches[0].score - 0.9).abs() < 1e-6);
        assert_eq!(result.total_matches, Some(2));
        assert_eq!(result.truncated, Some(false));
    }

    #[tokio::test]
    async fn test_empty_index_triggers_reconciliation() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir);
        let source = Arc::new(MemoryDocumentSource::new());
        source.insert_text(P, Document::new(DocumentId(1), "cats"), "The cat sat.");
        let embedder = Arc::new(LetterEmbedder::default());

        let reconciler = Arc::new(IndexReconciler::new(
            pool.clone(),
            source.clone(),
            embedder.clone(),
            Chunker::new(Arc::new(WordCounter), 100),
            16,
        ));
        let trigger =
            ReconcileTrigger::new(Arc::new(Scheduler::new()), reconciler, Duration::from_millis(10));
        let service =
            QueryService::new(pool.clone(), source, embedder).with_trigger(trigger.clone());

        assert!(service.query(P, "cat", 5, 0.0).await.is_empty());
        assert_eq!(
            trigger.scheduler().wait_for(JobKey::reconcile(P)).await,
            Some(JobState::Completed)
        );

        let result = service.query(P, "The cat sat.", 5, 0.9).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result.matches[0].document_name, "cats");
    }
}
