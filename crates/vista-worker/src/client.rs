//! Job submission and lookup.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use vista_core::models::{EnqueueOptions, Job, JobArgs, JobKind, NewJob, QueueName};
use vista_core::StoreResult;
use vista_db::JobStore;

/// Handle used by producers (watcher, pipeline stages, bridge, CLI) to submit
/// jobs and to consume them synchronously.
#[derive(Clone)]
pub struct JobClient {
    store: Arc<dyn JobStore>,
    default_max_attempts: i32,
}

impl JobClient {
    pub fn new(store: Arc<dyn JobStore>, default_max_attempts: i32) -> Self {
        Self {
            store,
            default_max_attempts: default_max_attempts.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Submit typed arguments. The queue defaults to the kind's queue.
    pub async fn enqueue<A: JobArgs>(&self, args: &A, opts: EnqueueOptions) -> StoreResult<Job> {
        let kind = A::kind();
        let queue = opts.queue.unwrap_or_else(|| kind.default_queue());
        let args = serde_json::to_value(args)?;
        self.enqueue_raw(queue, kind, args, opts).await
    }

    /// Submit an already serialized payload to an explicit queue.
    #[tracing::instrument(skip(self, args, opts), fields(job.queue = %queue, job.kind = %kind))]
    pub async fn enqueue_raw(
        &self,
        queue: QueueName,
        kind: JobKind,
        args: serde_json::Value,
        opts: EnqueueOptions,
    ) -> StoreResult<Job> {
        let job = self
            .store
            .enqueue(NewJob {
                queue,
                kind,
                args,
                max_attempts: opts
                    .max_attempts
                    .unwrap_or(self.default_max_attempts)
                    .max(1),
                scheduled_at: opts.scheduled_at.unwrap_or_else(Utc::now),
            })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to enqueue job");
                e
            })?;

        tracing::info!(job.id = %job.id, "Job enqueued");
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        self.store.get(id).await
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        self.store.delete(id).await
    }
}
