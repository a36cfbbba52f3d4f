//! Index reconciliation: diff the stored document set against the live one and repair.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{IndexError, ReconcileError};
use crate::models::{Document, DocumentId, IndexEntry, ProjectId, ReconciliationPlan};
use crate::services::chunker::Chunker;
use crate::services::embedding::{Embedder, normalize};
use crate::services::pool::{IndexLease, IndexPool};
use crate::services::scheduler::{Job, JobContext, JobKey, JobOutcome, Scheduler};
use crate::sources::DocumentSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    /// Unindex removed documents, index new ones.
    Incremental,
    /// Unindex everything stored, index every document.
    Rebuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileStatus {
    Completed,
    /// Stopped early; the index keeps whatever was written so far.
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub project: ProjectId,
    pub mode: ReconcileMode,
    pub status: ReconcileStatus,
    pub unindexed: usize,
    pub indexed: usize,
    pub chunks_added: usize,
    pub skipped: Vec<DocumentId>,
    pub elapsed_ms: u64,
}

impl ReconcileReport {
    fn new(project: ProjectId, mode: ReconcileMode) -> Self {
        Self {
            project,
            mode,
            status: ReconcileStatus::Completed,
            unindexed: 0,
            indexed: 0,
            chunks_added: 0,
            skipped: Vec::new(),
            elapsed_ms: 0,
        }
    }
}

/// Why a single document was not indexed.
enum DocumentFailure {
    Skip(String),
    Cancelled,
    Index(IndexError),
}

impl From<IndexError> for DocumentFailure {
    fn from(e: IndexError) -> Self {
        DocumentFailure::Index(e)
    }
}

pub struct IndexReconciler {
    pool: IndexPool,
    documents: Arc<dyn DocumentSource>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    batch_size: usize,
}

impl IndexReconciler {
    pub fn new(
        pool: IndexPool,
        documents: Arc<dyn DocumentSource>,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
        batch_size: usize,
    ) -> Self {
        Self {
            pool,
            documents,
            embedder,
            chunker,
            batch_size: batch_size.max(1),
        }
    }

    /// Bring the project's index in line with its current documents.
    ///
    /// Holds the project's lease for the whole run. Per-document failures are
    /// logged and skipped; failures of the index itself or of document
    /// listing abort the run.
    pub async fn reconcile(
        &self,
        project: ProjectId,
        mode: ReconcileMode,
        ctx: &JobContext,
    ) -> Result<ReconcileReport, ReconcileError> {
        let started = Instant::now();
        let mut report = ReconcileReport::new(project, mode);

        let mut lease = self.pool.borrow(project).await?;
        let stored = lease.document_ids()?;
        let documents = self.documents.list_documents(project).await?;

        let plan = match mode {
            ReconcileMode::Incremental => ReconciliationPlan::incremental(&stored, documents),
            ReconcileMode::Rebuild => ReconciliationPlan::rebuild(&stored, documents),
        };
        ctx.progress.set_total(plan.total_work());
        tracing::info!(
            target: "reconcile",
            "project {project}: {} to unindex, {} to index ({mode:?})",
            plan.to_unindex.len(),
            plan.to_index.len()
        );

        for id in &plan.to_unindex {
            if ctx.is_cancelled() {
                return Ok(self.cancelled(report, started));
            }
            let removed = lease.delete_document(*id)?;
            tracing::debug!(target: "reconcile", "unindexed document {id} ({removed} entries)");
            report.unindexed += 1;
            ctx.progress.advance(1);
        }

        for document in &plan.to_index {
            if ctx.is_cancelled() {
                return Ok(self.cancelled(report, started));
            }

            let before = ctx.progress.processed();
            match self.index_document(&mut lease, project, document, ctx).await {
                Ok(added) => {
                    report.indexed += 1;
                    report.chunks_added += added;
                }
                Err(DocumentFailure::Cancelled) => {
                    // Earlier documents stay; the interrupted one is dropped so
                    // the next run picks it up again
                    lease.delete_document(document.id)?;
                    return Ok(self.cancelled(report, started));
                }
                Err(DocumentFailure::Index(e)) => return Err(e.into()),
                Err(DocumentFailure::Skip(reason)) => {
                    tracing::warn!(
                        target: "reconcile",
                        "skipping document {} ({}): {reason}",
                        document.id,
                        document.name
                    );
                    // Drop partial entries so the next run retries the document
                    lease.delete_document(document.id)?;
                    report.skipped.push(document.id);
                    let done = ctx.progress.processed() - before;
                    ctx.progress
                        .advance(ReconciliationPlan::UNITS_PER_DOCUMENT.saturating_sub(done));
                }
            }
        }

        lease.commit()?;
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            target: "reconcile",
            "project {project}: reconciled in {}ms ({} indexed, {} unindexed, {} skipped)",
            report.elapsed_ms,
            report.indexed,
            report.unindexed,
            report.skipped.len()
        );
        Ok(report)
    }

    fn cancelled(&self, mut report: ReconcileReport, started: Instant) -> ReconcileReport {
        report.status = ReconcileStatus::Cancelled;
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            target: "reconcile",
            "project {}: reconciliation cancelled, index left partially updated",
            report.project
        );
        report
    }

    /// Chunk, embed and store one document. Returns the number of entries added.
    async fn index_document(
        &self,
        lease: &mut IndexLease,
        project: ProjectId,
        document: &Document,
        ctx: &JobContext,
    ) -> Result<usize, DocumentFailure> {
        let chunks = {
            let content = self
                .documents
                .document_text(project, document)
                .await
                .map_err(|e| DocumentFailure::Skip(e.to_string()))?;
            self.chunker.process(document, &content)
        };

        if chunks.is_empty() {
            ctx.progress.advance(ReconciliationPlan::UNITS_PER_DOCUMENT);
            return Ok(0);
        }

        let batches = chunks.len().div_ceil(self.batch_size) as u64;
        let units = ReconciliationPlan::UNITS_PER_DOCUMENT;
        let mut added = 0;

        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            if ctx.is_cancelled() {
                return Err(DocumentFailure::Cancelled);
            }

            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self
                .embedder
                .embed_batch(&texts)
                .await
                .ok_or_else(|| DocumentFailure::Skip("embedding unavailable".to_string()))?;
            if embedded.len() != batch.len() {
                return Err(DocumentFailure::Skip(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }

            let entries: Vec<IndexEntry> = batch
                .iter()
                .zip(embedded)
                .map(|(chunk, (_, mut vector))| {
                    normalize(&mut vector);
                    IndexEntry::from_chunk(chunk, vector)
                })
                .collect();
            match lease.add_entries(&entries) {
                Ok(()) => {}
                Err(IndexError::DimensionMismatch { expected, actual }) => {
                    return Err(DocumentFailure::Skip(format!(
                        "embedding dimension {actual} does not match index dimension {expected}"
                    )));
                }
                Err(e) => return Err(e.into()),
            }
            added += entries.len();

            let i = i as u64;
            ctx.progress
                .advance(units * (i + 1) / batches - units * i / batches);
        }

        tracing::debug!(
            target: "reconcile",
            "indexed document {} ({}) as {added} chunks",
            document.id,
            document.name
        );
        Ok(added)
    }
}

/// A scheduled reconciliation of one project.
pub struct ReconcileJob {
    reconciler: Arc<IndexReconciler>,
    project: ProjectId,
    mode: ReconcileMode,
}

impl ReconcileJob {
    pub fn new(reconciler: Arc<IndexReconciler>, project: ProjectId, mode: ReconcileMode) -> Self {
        Self {
            reconciler,
            project,
            mode,
        }
    }
}

#[async_trait]
impl Job for ReconcileJob {
    fn key(&self) -> JobKey {
        match self.mode {
            ReconcileMode::Incremental => JobKey::reconcile(self.project),
            ReconcileMode::Rebuild => JobKey::rebuild(self.project),
        }
    }

    async fn run(&self, ctx: JobContext) -> JobOutcome {
        match self.reconciler.reconcile(self.project, self.mode, &ctx).await {
            Ok(report) => match report.status {
                ReconcileStatus::Completed => JobOutcome::Completed,
                ReconcileStatus::Cancelled => JobOutcome::Cancelled,
            },
            Err(e) => JobOutcome::Failed(e.to_string()),
        }
    }
}

/// Enqueues reconciliation jobs with the configured debounce.
#[derive(Clone)]
pub struct ReconcileTrigger {
    scheduler: Arc<Scheduler>,
    reconciler: Arc<IndexReconciler>,
    debounce: Duration,
}

impl ReconcileTrigger {
    pub fn new(
        scheduler: Arc<Scheduler>,
        reconciler: Arc<IndexReconciler>,
        debounce: Duration,
    ) -> Self {
        Self {
            scheduler,
            reconciler,
            debounce,
        }
    }

    pub fn fire(&self, project: ProjectId, mode: ReconcileMode) -> JobKey {
        let job = ReconcileJob::new(self.reconciler.clone(), project, mode);
        let key = job.key();
        self.scheduler.enqueue(Arc::new(job), self.debounce);
        key
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
