//! Store doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

use vista_core::models::{Job, JobAttemptError, NewJob, QueueName};
use vista_core::{StoreError, StoreResult};
use vista_db::{JobStore, MemoryJobStore};

/// In-memory job store with switchable faults.
pub(crate) struct FaultyJobStore {
    inner: MemoryJobStore,
    fail_enqueue: AtomicBool,
    failed_enqueues: AtomicUsize,
    stall_get: AtomicBool,
}

impl FaultyJobStore {
    pub(crate) fn new(inner: MemoryJobStore) -> Self {
        Self {
            inner,
            fail_enqueue: AtomicBool::new(false),
            failed_enqueues: AtomicUsize::new(0),
            stall_get: AtomicBool::new(false),
        }
    }

    /// The next enqueue fails with a connectivity error.
    pub(crate) fn fail_next_enqueue(&self) {
        self.fail_enqueue.store(true, Ordering::SeqCst);
    }

    pub(crate) fn failed_enqueues(&self) -> usize {
        self.failed_enqueues.load(Ordering::SeqCst)
    }

    /// Every `get` from now on never returns, like a hung database round-trip.
    pub(crate) fn stall_gets(&self) {
        self.stall_get.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for FaultyJobStore {
    async fn enqueue(&self, job: NewJob) -> StoreResult<Job> {
        if self.fail_enqueue.swap(false, Ordering::SeqCst) {
            self.failed_enqueues.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.enqueue(job).await
    }

    async fn claim(&self, queue: QueueName) -> StoreResult<Option<Job>> {
        self.inner.claim(queue).await
    }

    async fn complete(&self, id: Uuid, output: Option<serde_json::Value>) -> StoreResult<Job> {
        self.inner.complete(id, output).await
    }

    async fn retry(
        &self,
        id: Uuid,
        error: JobAttemptError,
        retry_at: DateTime<Utc>,
    ) -> StoreResult<Job> {
        self.inner.retry(id, error, retry_at).await
    }

    async fn cancel(&self, id: Uuid, error: JobAttemptError) -> StoreResult<Job> {
        self.inner.cancel(id, error).await
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        if self.stall_get.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.get(id).await
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        self.inner.delete(id).await
    }

    async fn reap_stale(&self, queue: QueueName, stale_before: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.reap_stale(queue, stale_before).await
    }

    async fn delete_finished_before(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.delete_finished_before(before).await
    }

    async fn listen(&self, queue: QueueName, tx: mpsc::Sender<()>) -> StoreResult<()> {
        self.inner.listen(queue, tx).await
    }
}
