use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use vista_core::models::{Job, JobAttemptError, JobState, NewJob, QueueName};
use vista_core::{StoreError, StoreResult};

use crate::traits::JobStore;

const REAPED_MESSAGE: &str = "job exceeded its timeout and was reaped";

#[derive(Default)]
struct JobTable {
    /// Insertion order doubles as the tie-breaker for equal `scheduled_at`.
    jobs: Vec<Job>,
    listeners: HashMap<QueueName, Vec<mpsc::Sender<()>>>,
}

impl JobTable {
    fn find_running(&mut self, id: Uuid) -> StoreResult<&mut Job> {
        self.jobs
            .iter_mut()
            .find(|job| job.id == id && job.state == JobState::Running)
            .ok_or_else(|| StoreError::NotFound(format!("job {} is not running", id)))
    }

    fn wake(&mut self, queue: QueueName) {
        if let Some(senders) = self.listeners.get_mut(&queue) {
            senders.retain(|tx| !tx.is_closed());
            for tx in senders.iter() {
                // A full channel already holds a pending wake-up.
                let _ = tx.try_send(());
            }
        }
    }
}

/// Move a running job to `retryable`, or to `discarded` when out of attempts.
fn fail_attempt(job: &mut Job, error: JobAttemptError, retry_at: DateTime<Utc>) {
    let now = Utc::now();
    job.errors.push(error);
    if job.attempt >= job.max_attempts {
        job.state = JobState::Discarded;
        job.finalized_at = Some(now);
    } else {
        job.state = JobState::Retryable;
        job.scheduled_at = retry_at;
        job.finalized_at = None;
    }
}

#[derive(Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<Mutex<JobTable>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every job, in insertion order.
    pub async fn all(&self) -> Vec<Job> {
        self.inner.lock().await.jobs.clone()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, job: NewJob) -> StoreResult<Job> {
        let now = Utc::now();
        let inserted = Job {
            id: Uuid::new_v4(),
            queue: job.queue,
            kind: job.kind,
            args: job.args,
            state: JobState::Available,
            attempt: 0,
            max_attempts: job.max_attempts,
            output: None,
            errors: Vec::new(),
            scheduled_at: job.scheduled_at,
            attempted_at: None,
            finalized_at: None,
            created_at: now,
        };

        let mut table = self.inner.lock().await;
        table.jobs.push(inserted.clone());
        table.wake(inserted.queue);

        tracing::debug!(
            job.id = %inserted.id,
            job.kind = %inserted.kind,
            job.queue = %inserted.queue,
            "Job enqueued"
        );

        Ok(inserted)
    }

    async fn claim(&self, queue: QueueName) -> StoreResult<Option<Job>> {
        let now = Utc::now();
        let mut table = self.inner.lock().await;

        // min_by_key keeps the first of equal keys, i.e. the oldest insert.
        let next = table
            .jobs
            .iter_mut()
            .filter(|job| job.queue == queue && job.state.is_claimable() && job.scheduled_at <= now)
            .min_by_key(|job| job.scheduled_at);

        let Some(job) = next else {
            return Ok(None);
        };

        job.state = JobState::Running;
        job.attempt += 1;
        job.attempted_at = Some(now);

        Ok(Some(job.clone()))
    }

    async fn complete(&self, id: Uuid, output: Option<serde_json::Value>) -> StoreResult<Job> {
        let mut table = self.inner.lock().await;
        let job = table.find_running(id)?;
        job.state = JobState::Completed;
        job.output = output;
        job.finalized_at = Some(Utc::now());
        Ok(job.clone())
    }

    async fn retry(
        &self,
        id: Uuid,
        error: JobAttemptError,
        retry_at: DateTime<Utc>,
    ) -> StoreResult<Job> {
        let mut table = self.inner.lock().await;
        let job = table.find_running(id)?;
        fail_attempt(job, error, retry_at);
        Ok(job.clone())
    }

    async fn cancel(&self, id: Uuid, error: JobAttemptError) -> StoreResult<Job> {
        let mut table = self.inner.lock().await;
        let job = table.find_running(id)?;
        job.errors.push(error);
        job.state = JobState::Cancelled;
        job.finalized_at = Some(Utc::now());
        Ok(job.clone())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        let table = self.inner.lock().await;
        Ok(table.jobs.iter().find(|job| job.id == id).cloned())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut table = self.inner.lock().await;
        let before = table.jobs.len();
        table.jobs.retain(|job| job.id != id);
        Ok(table.jobs.len() != before)
    }

    async fn reap_stale(&self, queue: QueueName, stale_before: DateTime<Utc>) -> StoreResult<u64> {
        let now = Utc::now();
        let mut table = self.inner.lock().await;
        let mut reaped = 0;

        for job in table.jobs.iter_mut().filter(|job| {
            job.queue == queue
                && job.state == JobState::Running
                && job.attempted_at.is_some_and(|at| at < stale_before)
        }) {
            let error = JobAttemptError {
                attempt: job.attempt,
                at: now,
                error: REAPED_MESSAGE.to_string(),
            };
            fail_attempt(job, error, now);
            reaped += 1;
        }

        if reaped > 0 {
            tracing::warn!(queue = %queue, reaped, "Reaped stale running jobs");
            table.wake(queue);
        }

        Ok(reaped)
    }

    async fn delete_finished_before(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut table = self.inner.lock().await;
        let count = table.jobs.len();
        table.jobs.retain(|job| {
            !(job.state.is_terminal() && job.finalized_at.is_some_and(|at| at < before))
        });
        Ok((count - table.jobs.len()) as u64)
    }

    async fn listen(&self, queue: QueueName, tx: mpsc::Sender<()>) -> StoreResult<()> {
        let mut table = self.inner.lock().await;
        table.listeners.entry(queue).or_default().push(tx);
        Ok(())
    }
}
