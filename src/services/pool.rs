//! Per-project index pool with exclusive leases and idle eviction.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use crate::error::IndexError;
use crate::models::{DocumentId, IndexConfig, IndexEntry, IndexHit, ProjectId};
use crate::services::vector_index::VectorIndex;

/// Timing knobs for the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// How long `borrow` waits for a concurrent lease to be released.
    pub borrow_wait: Duration,
    /// Unleased handles idle for longer than this are closed.
    pub idle_eviction_delay: Duration,
    /// Handles younger than this are never closed.
    pub min_idle_time: Duration,
}

impl PoolOptions {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            borrow_wait: config.borrow_wait_timeout(),
            idle_eviction_delay: config.idle_eviction_delay(),
            min_idle_time: config.min_idle_time(),
        }
    }
}

struct Slot {
    index: Option<VectorIndex>,
    last_used: Instant,
    opened_at: Instant,
}

impl Slot {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            index: None,
            last_used: now,
            opened_at: now,
        }
    }
}

struct PoolInner {
    projects_dir: PathBuf,
    options: PoolOptions,
    slots: Mutex<HashMap<ProjectId, Arc<AsyncMutex<Slot>>>>,
}

/// Owns at most one open index per project and hands it out one lease at a time.
#[derive(Clone)]
pub struct IndexPool {
    inner: Arc<PoolInner>,
}

/// Exclusive access to a project's index. Released on drop.
pub struct IndexLease {
    project: ProjectId,
    slot: OwnedMutexGuard<Slot>,
}

impl IndexPool {
    pub fn new(projects_dir: impl Into<PathBuf>, options: PoolOptions) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                projects_dir: projects_dir.into(),
                options,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(config.projects_dir(), PoolOptions::from_config(config))
    }

    pub fn projects_dir(&self) -> &Path {
        &self.inner.projects_dir
    }

    /// Storage directory of a project's index.
    pub fn index_dir(&self, project: ProjectId) -> PathBuf {
        self.inner.projects_dir.join(project.to_string())
    }

    fn slot(&self, project: ProjectId) -> Arc<AsyncMutex<Slot>> {
        self.inner
            .slots
            .lock()
            .entry(project)
            .or_insert_with(|| Arc::new(AsyncMutex::new(Slot::new())))
            .clone()
    }

    /// Lease a project's index, opening it on first use.
    ///
    /// Waits up to the configured borrow timeout while another lease is held.
    pub async fn borrow(&self, project: ProjectId) -> Result<IndexLease, IndexError> {
        let waited = self.inner.options.borrow_wait;
        let mut slot = tokio::time::timeout(waited, self.slot(project).lock_owned())
            .await
            .map_err(|_| IndexError::LeaseTimeout { project, waited })?;

        if slot.index.is_none() {
            let dir = self.index_dir(project);
            tracing::debug!(target: "pool", "opening index of project {project} at {}", dir.display());
            slot.index = Some(VectorIndex::open(&dir)?);
            slot.opened_at = Instant::now();
        }

        Ok(IndexLease { project, slot })
    }

    /// Close unleased handles that have been idle past the eviction delay.
    ///
    /// Returns the number of handles closed.
    pub fn evict_idle(&self) -> usize {
        let options = self.inner.options;
        let slots: Vec<_> = self
            .inner
            .slots
            .lock()
            .iter()
            .map(|(p, s)| (*p, s.clone()))
            .collect();

        let mut evicted = 0;
        for (project, slot) in slots {
            // A held lock means a live lease
            let Ok(mut slot) = slot.try_lock() else {
                continue;
            };
            if slot.index.is_none() {
                continue;
            }
            if slot.last_used.elapsed() >= options.idle_eviction_delay
                && slot.opened_at.elapsed() >= options.min_idle_time
            {
                slot.index = None;
                evicted += 1;
                tracing::debug!(target: "pool", "evicted idle index of project {project}");
            }
        }
        evicted
    }

    /// Run `evict_idle` every `interval` until the pool is dropped.
    pub fn spawn_eviction(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<PoolInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                IndexPool { inner }.evict_idle();
            }
        })
    }

    /// Close a project's index and delete its storage.
    ///
    /// Fails with `LeaseOutstanding` while the index is leased.
    pub fn clear_index(&self, project: ProjectId) -> Result<(), IndexError> {
        // Held throughout so no borrow can reopen the directory mid-removal
        let mut slots = self.inner.slots.lock();
        let slot = slots.get(&project).cloned();
        let guard = match &slot {
            Some(slot) => {
                let mut guard = slot
                    .try_lock()
                    .map_err(|_| IndexError::LeaseOutstanding(project))?;
                guard.index = None;
                Some(guard)
            }
            None => None,
        };

        let dir = self.index_dir(project);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            tracing::info!(target: "pool", "cleared index of project {project}");
        }

        drop(guard);
        // Borrowers waiting on the slot hold their own clones
        if slot.is_some_and(|slot| Arc::strong_count(&slot) == 2) {
            slots.remove(&project);
        }
        Ok(())
    }

    /// Number of projects the pool keeps a slot for.
    pub fn slot_count(&self) -> usize {
        self.inner.slots.lock().len()
    }

    /// Whether the project currently has an open handle. Leased handles count as open.
    pub fn is_open(&self, project: ProjectId) -> bool {
        let Some(slot) = self.inner.slots.lock().get(&project).cloned() else {
            return false;
        };
        match slot.try_lock() {
            Ok(guard) => guard.index.is_some(),
            Err(_) => true,
        }
    }

    pub fn open_projects(&self) -> Vec<ProjectId> {
        let projects: Vec<ProjectId> = self.inner.slots.lock().keys().copied().collect();
        let mut open: Vec<_> = projects.into_iter().filter(|p| self.is_open(*p)).collect();
        open.sort();
        open
    }
}

impl IndexLease {
    pub fn project(&self) -> ProjectId {
        self.project
    }

    pub fn index(&self) -> Result<&VectorIndex, IndexError> {
        self.slot.index.as_ref().ok_or(IndexError::Closed(self.project))
    }

    pub fn index_mut(&mut self) -> Result<&mut VectorIndex, IndexError> {
        self.slot
            .index
            .as_mut()
            .ok_or(IndexError::Closed(self.project))
    }

    pub fn len(&self) -> Result<usize, IndexError> {
        self.index()?.len()
    }

    pub fn is_empty(&self) -> Result<bool, IndexError> {
        self.index()?.is_empty()
    }

    pub fn document_ids(&self) -> Result<BTreeSet<DocumentId>, IndexError> {
        self.index()?.document_ids()
    }

    pub fn add_entries(&mut self, entries: &[IndexEntry]) -> Result<(), IndexError> {
        self.index_mut()?.add(entries)
    }

    pub fn delete_document(&mut self, document_id: DocumentId) -> Result<usize, IndexError> {
        self.index_mut()?.delete_document(document_id)
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>, IndexError> {
        self.index()?.search(query, k)
    }

    pub fn commit(&mut self) -> Result<(), IndexError> {
        self.index_mut()?.commit()
    }
}

impl Drop for IndexLease {
    fn drop(&mut self) {
        self.slot.last_used = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(wait_ms: u64, idle_ms: u64, min_idle_ms: u64) -> PoolOptions {
        PoolOptions {
            borrow_wait: Duration::from_millis(wait_ms),
            idle_eviction_delay: Duration::from_millis(idle_ms),
            min_idle_time: Duration::from_millis(min_idle_ms),
        }
    }

    fn entry(doc: i64) -> IndexEntry {
        IndexEntry {
            embedding: vec![1.0, 0.0],
            text: "text".into(),
            section: None,
            document_id: DocumentId(doc),
            begin: 0,
            end: 4,
        }
    }

    #[tokio::test]
    async fn test_borrow_creates_storage_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let pool = IndexPool::new(dir.path(), options(100, 1000, 0));
        let project = ProjectId(1);

        assert!(!pool.index_dir(project).exists());
        let lease = pool.borrow(project).await.unwrap();
        assert!(pool.index_dir(project).exists());
        assert!(lease.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_second_borrow_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let pool = IndexPool::new(dir.path(), options(50, 1000, 0));
        let project = ProjectId(1);

        let _held = pool.borrow(project).await.unwrap();
        let started = Instant::now();
        let err = pool.borrow(project).await.err().unwrap();

        assert!(matches!(err, IndexError::LeaseTimeout { .. }));
        assert!(started.elapsed() >= Duration::from_millis(50));

        // Other projects are unaffected
        assert!(pool.borrow(ProjectId(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_waiting_borrow_granted_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let pool = IndexPool::new(dir.path(), options(2000, 1000, 0));
        let project = ProjectId(1);

        let mut held = pool.borrow(project).await.unwrap();
        held.add_entries(&[entry(5)]).unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let lease = pool.borrow(project).await.unwrap();
                lease.len().unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_eviction_skips_leased_and_young_handles() {
        let dir = tempfile::tempdir().unwrap();
        let pool = IndexPool::new(dir.path(), options(100, 10, 200));
        let project = ProjectId(1);

        drop(pool.borrow(project).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Idle long enough, but not past min idle time
        assert_eq!(pool.evict_idle(), 0);
        assert!(pool.is_open(project));

        tokio::time::sleep(Duration::from_millis(200)).await;
        let lease = pool.borrow(project).await.unwrap();
        assert_eq!(pool.evict_idle(), 0);
        drop(lease);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(pool.evict_idle(), 1);
        assert!(!pool.is_open(project));
        assert!(pool.open_projects().is_empty());
    }

    #[tokio::test]
    async fn test_evicted_index_reopens_with_data() {
        let dir = tempfile::tempdir().unwrap();
        let pool = IndexPool::new(dir.path(), options(100, 0, 0));
        let project = ProjectId(4);

        {
            let mut lease = pool.borrow(project).await.unwrap();
            lease.add_entries(&[entry(1), entry(2)]).unwrap();
            lease.commit().unwrap();
        }
        assert_eq!(pool.evict_idle(), 1);

        let lease = pool.borrow(project).await.unwrap();
        assert_eq!(lease.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clear_refused_while_leased() {
        let dir = tempfile::tempdir().unwrap();
        let pool = IndexPool::new(dir.path(), options(100, 1000, 0));
        let project = ProjectId(1);

        let lease = pool.borrow(project).await.unwrap();
        assert!(matches!(
            pool.clear_index(project),
            Err(IndexError::LeaseOutstanding(_))
        ));

        drop(lease);
        pool.clear_index(project).unwrap();
        assert!(!pool.index_dir(project).exists());
        assert_eq!(pool.slot_count(), 0);

        // Clearing a project that was never opened is fine and leaves no slot
        pool.clear_index(ProjectId(99)).unwrap();
        assert_eq!(pool.slot_count(), 0);

        // The project can be used again after a clear
        let lease = pool.borrow(project).await.unwrap();
        assert!(lease.is_empty().unwrap());
        assert_eq!(pool.slot_count(), 1);
    }

    #[tokio::test]
    async fn test_background_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let pool = IndexPool::new(dir.path(), options(100, 0, 0));
        drop(pool.borrow(ProjectId(1)).await.unwrap());

        let handle = pool.spawn_eviction(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!pool.is_open(ProjectId(1)));
        handle.abort();
    }
}
