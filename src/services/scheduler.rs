//! Debounced background job scheduler.
//!
//! Each job is keyed by `(kind, project)`. Enqueueing a key that is already
//! pending replaces its job and pushes its deadline back, so a burst of
//! triggers collapses into a single run. A key never runs twice concurrently;
//! a trigger that arrives while its key is running waits for that run to end.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::models::ProjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Reconcile,
    Rebuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct JobKey {
    pub kind: JobKind,
    pub project: ProjectId,
}

impl JobKey {
    pub fn reconcile(project: ProjectId) -> Self {
        Self {
            kind: JobKind::Reconcile,
            project,
        }
    }

    pub fn rebuild(project: ProjectId) -> Self {
        Self {
            kind: JobKind::Rebuild,
            project,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            JobKind::Reconcile => "reconcile",
            JobKind::Rebuild => "rebuild",
        };
        write!(f, "{}:{}", kind, self.project)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }
}

/// How a job run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl From<&JobOutcome> for JobState {
    fn from(outcome: &JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed => JobState::Completed,
            JobOutcome::Cancelled => JobState::Cancelled,
            JobOutcome::Failed(_) => JobState::Failed,
        }
    }
}

/// Cooperative cancellation flag shared between the scheduler and a job.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress counters of a running job.
#[derive(Debug, Default)]
pub struct Progress {
    processed: AtomicU64,
    total: AtomicU64,
}

impl Progress {
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn advance(&self, units: u64) {
        self.processed.fetch_add(units, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// `(processed, total)`
    pub fn snapshot(&self) -> (u64, u64) {
        (self.processed(), self.total())
    }
}

/// Cancellation flag and progress sink handed to a running job.
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    pub cancel: CancellationFlag,
    pub progress: Arc<Progress>,
}

impl JobContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn key(&self) -> JobKey;

    async fn run(&self, ctx: JobContext) -> JobOutcome;
}

struct PendingJob {
    deadline: Instant,
    job: Arc<dyn Job>,
}

#[derive(Default)]
struct SchedulerState {
    pending: HashMap<JobKey, PendingJob>,
    running: HashMap<JobKey, JobContext>,
    finished: HashMap<JobKey, JobState>,
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    wake: Notify,
    finished: Notify,
    shutdown: AtomicBool,
}

pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Start a scheduler. Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let inner = Arc::new(SchedulerInner {
            state: Mutex::new(SchedulerState::default()),
            wake: Notify::new(),
            finished: Notify::new(),
            shutdown: AtomicBool::new(false),
        });
        let dispatcher = tokio::spawn(dispatch(inner.clone()));
        Self {
            inner,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Schedule `job` to run after `delay`, replacing any pending job with the same key.
    pub fn enqueue(&self, job: Arc<dyn Job>, delay: Duration) {
        if self.inner.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let key = job.key();
        let replaced = {
            let mut state = self.inner.state.lock();
            state
                .pending
                .insert(
                    key,
                    PendingJob {
                        deadline: Instant::now() + delay,
                        job,
                    },
                )
                .is_some()
        };
        if replaced {
            tracing::debug!(target: "scheduler", "debounced job {key}");
        } else {
            tracing::debug!(target: "scheduler", "enqueued job {key} in {delay:?}");
        }
        self.inner.wake.notify_one();
    }

    /// Drop a pending job or signal a running one. Returns whether anything was cancelled.
    pub fn cancel(&self, key: JobKey) -> bool {
        let mut state = self.inner.state.lock();
        let mut cancelled = false;
        if state.pending.remove(&key).is_some() {
            state.finished.insert(key, JobState::Cancelled);
            cancelled = true;
        }
        if let Some(ctx) = state.running.get(&key) {
            ctx.cancel.cancel();
            cancelled = true;
        }
        if cancelled {
            tracing::debug!(target: "scheduler", "cancelled job {key}");
        }
        cancelled
    }

    pub fn state(&self, key: JobKey) -> Option<JobState> {
        let state = self.inner.state.lock();
        if state.running.contains_key(&key) {
            Some(JobState::Running)
        } else if state.pending.contains_key(&key) {
            Some(JobState::Pending)
        } else {
            state.finished.get(&key).cloned()
        }
    }

    /// `(processed, total)` of a running job.
    pub fn progress(&self, key: JobKey) -> Option<(u64, u64)> {
        let state = self.inner.state.lock();
        state.running.get(&key).map(|ctx| ctx.progress.snapshot())
    }

    /// Wait until `key` is neither pending nor running, returning its last state.
    pub async fn wait_for(&self, key: JobKey) -> Option<JobState> {
        loop {
            let notified = self.inner.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.state(key) {
                Some(JobState::Pending) | Some(JobState::Running) => notified.await,
                other => return other,
            }
        }
    }

    /// Cancel everything and stop dispatching.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            let pending: Vec<JobKey> = state.pending.drain().map(|(k, _)| k).collect();
            for key in pending {
                state.finished.insert(key, JobState::Cancelled);
            }
            for ctx in state.running.values() {
                ctx.cancel.cancel();
            }
        }
        self.inner.wake.notify_one();
        self.inner.finished.notify_waiters();
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
        tracing::debug!(target: "scheduler", "scheduler shut down");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn dispatch(inner: Arc<SchedulerInner>) {
    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }

        let now = Instant::now();
        let mut due = Vec::new();
        let next_deadline = {
            let mut state = inner.state.lock();
            let ready: Vec<JobKey> = state
                .pending
                .iter()
                .filter(|(key, p)| p.deadline <= now && !state.running.contains_key(*key))
                .map(|(key, _)| *key)
                .collect();

            for key in ready {
                if let Some(pending) = state.pending.remove(&key) {
                    let ctx = JobContext::default();
                    state.running.insert(key, ctx.clone());
                    due.push((key, pending.job, ctx));
                }
            }

            state
                .pending
                .iter()
                .filter(|(key, _)| !state.running.contains_key(*key))
                .map(|(_, p)| p.deadline)
                .min()
        };

        for (key, job, ctx) in due {
            tokio::spawn(run_job(inner.clone(), key, job, ctx));
        }

        match next_deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = inner.wake.notified() => {}
                }
            }
            None => inner.wake.notified().await,
        }
    }
}

async fn run_job(inner: Arc<SchedulerInner>, key: JobKey, job: Arc<dyn Job>, ctx: JobContext) {
    tracing::debug!(target: "scheduler", "running job {key}");

    let task_ctx = ctx.clone();
    let outcome = match tokio::spawn(async move { job.run(task_ctx).await }).await {
        Ok(outcome) => outcome,
        Err(e) => JobOutcome::Failed(format!("job panicked: {e}")),
    };

    match &outcome {
        JobOutcome::Completed => tracing::debug!(target: "scheduler", "job {key} completed"),
        JobOutcome::Cancelled => tracing::info!(target: "scheduler", "job {key} cancelled"),
        JobOutcome::Failed(reason) => {
            tracing::warn!(target: "scheduler", "job {key} failed: {reason}")
        }
    }

    {
        let mut state = inner.state.lock();
        state.running.remove(&key);
        state.finished.insert(key, JobState::from(&outcome));
    }
    inner.wake.notify_one();
    inner.finished.notify_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingJob {
        key: JobKey,
        runs: Arc<AtomicUsize>,
        tag: usize,
        last_tag: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Job for CountingJob {
        fn key(&self) -> JobKey {
            self.key
        }

        async fn run(&self, _ctx: JobContext) -> JobOutcome {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.last_tag.store(self.tag, Ordering::SeqCst);
            JobOutcome::Completed
        }
    }

    /// Loops until cancelled, reporting progress.
    struct LoopingJob {
        key: JobKey,
    }

    #[async_trait]
    impl Job for LoopingJob {
        fn key(&self) -> JobKey {
            self.key
        }

        async fn run(&self, ctx: JobContext) -> JobOutcome {
            ctx.progress.set_total(1000);
            loop {
                if ctx.is_cancelled() {
                    return JobOutcome::Cancelled;
                }
                ctx.progress.advance(1);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    struct FailingJob;

    #[async_trait]
    impl Job for FailingJob {
        fn key(&self) -> JobKey {
            JobKey::rebuild(ProjectId(3))
        }

        async fn run(&self, _ctx: JobContext) -> JobOutcome {
            JobOutcome::Failed("boom".into())
        }
    }

    #[tokio::test]
    async fn test_burst_collapses_to_latest() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let last_tag = Arc::new(AtomicUsize::new(0));
        let key = JobKey::reconcile(ProjectId(1));

        for tag in 1..=5 {
            scheduler.enqueue(
                Arc::new(CountingJob {
                    key,
                    runs: runs.clone(),
                    tag,
                    last_tag: last_tag.clone(),
                }),
                Duration::from_millis(40),
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(scheduler.state(key), Some(JobState::Pending));

        assert_eq!(scheduler.wait_for(key).await, Some(JobState::Completed));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(last_tag.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_separately() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let last_tag = Arc::new(AtomicUsize::new(0));
        let keys = [
            JobKey::reconcile(ProjectId(1)),
            JobKey::reconcile(ProjectId(2)),
            JobKey::rebuild(ProjectId(1)),
        ];

        for key in keys {
            scheduler.enqueue(
                Arc::new(CountingJob {
                    key,
                    runs: runs.clone(),
                    tag: 0,
                    last_tag: last_tag.clone(),
                }),
                Duration::from_millis(10),
            );
        }
        for key in keys {
            scheduler.wait_for(key).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let key = JobKey::reconcile(ProjectId(1));
        scheduler.enqueue(
            Arc::new(CountingJob {
                key,
                runs: runs.clone(),
                tag: 0,
                last_tag: Arc::new(AtomicUsize::new(0)),
            }),
            Duration::from_millis(50),
        );

        assert!(scheduler.cancel(key));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.state(key), Some(JobState::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_running_job_reports_progress() {
        let scheduler = Scheduler::new();
        let key = JobKey::rebuild(ProjectId(7));
        scheduler.enqueue(Arc::new(LoopingJob { key }), Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(scheduler.state(key), Some(JobState::Running));
        let (processed, total) = scheduler.progress(key).unwrap();
        assert_eq!(total, 1000);
        assert!(processed > 0);

        assert!(scheduler.cancel(key));
        assert_eq!(scheduler.wait_for(key).await, Some(JobState::Cancelled));
        assert!(scheduler.progress(key).is_none());
    }

    #[tokio::test]
    async fn test_failed_job_state() {
        let scheduler = Scheduler::new();
        scheduler.enqueue(Arc::new(FailingJob), Duration::ZERO);
        assert_eq!(
            scheduler.wait_for(JobKey::rebuild(ProjectId(3))).await,
            Some(JobState::Failed)
        );
    }

    #[tokio::test]
    async fn test_unknown_key_has_no_state() {
        let scheduler = Scheduler::new();
        let key = JobKey::reconcile(ProjectId(42));
        assert_eq!(scheduler.state(key), None);
        assert!(!scheduler.cancel(key));
        assert_eq!(scheduler.wait_for(key).await, None);
    }

    #[tokio::test]
    async fn test_shutdown_drops_pending() {
        let scheduler = Scheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let key = JobKey::reconcile(ProjectId(1));
        scheduler.enqueue(
            Arc::new(CountingJob {
                key,
                runs: runs.clone(),
                tag: 0,
                last_tag: Arc::new(AtomicUsize::new(0)),
            }),
            Duration::from_millis(20),
        );

        scheduler.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.state(key), Some(JobState::Cancelled));
    }
}
