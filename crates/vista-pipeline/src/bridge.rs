//! Synchronous text embedding on top of the job queue.
//!
//! The text model runs wherever the `embedding` queue is hosted. A caller
//! enqueues an `embed_text` job and polls it until it reaches a terminal
//! state, its own cancellation token fires or the bridge-wide deadline
//! passes. Only a completed job is deleted; abandoned jobs are left to the
//! retention sweep.

use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vista_core::constants::VISION_SPACE;
use vista_core::models::{EnqueueOptions, Job, JobState, TextEmbedding, TextEmbeddingArgs};
use vista_core::{Config, StoreError};
use vista_worker::JobClient;

#[derive(Debug, Error)]
pub enum EmbeddingRequestError {
    /// The job used up its attempts. Carries the last worker error.
    #[error("embedding job discarded: {0}")]
    Discarded(String),

    /// The worker rejected the input.
    #[error("embedding job cancelled: {0}")]
    Cancelled(String),

    /// The caller's token fired before the job finished.
    #[error("embedding request cancelled by caller")]
    CallerCancelled,

    #[error("embedding request timed out after {0:?}")]
    TimedOut(Duration),

    /// The job row was deleted while waiting on it.
    #[error("embedding job {0} disappeared")]
    JobMissing(Uuid),

    #[error("embedding job returned invalid output: {0}")]
    InvalidOutput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl BridgeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.bridge_poll_interval(),
            max_wait: config.bridge_max_wait(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            max_wait: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct EmbeddingBridge {
    jobs: JobClient,
    config: BridgeConfig,
}

impl EmbeddingBridge {
    pub fn new(jobs: JobClient, config: BridgeConfig) -> Self {
        Self { jobs, config }
    }

    /// Embed `text` into the `vision` space, waiting for a worker to do it.
    #[tracing::instrument(skip(self, text, cancel), fields(job.id = tracing::field::Empty, text.len = text.len()))]
    pub async fn request_text_embedding(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<TextEmbedding, EmbeddingRequestError> {
        let args = TextEmbeddingArgs {
            text: text.to_string(),
            space: VISION_SPACE.to_string(),
        };
        let job = self.jobs.enqueue(&args, EnqueueOptions::default()).await?;
        tracing::Span::current().record("job.id", tracing::field::display(job.id));

        self.wait_for(job.id, cancel).await
    }

    async fn wait_for(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<TextEmbedding, EmbeddingRequestError> {
        let deadline = tokio::time::sleep_until(Instant::now() + self.config.max_wait);
        tokio::pin!(deadline);

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // The round-trip itself races the caller and the deadline.
            let poll = async {
                ticker.tick().await;
                self.jobs.get(job_id).await
            };

            let job = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!(job.id = %job_id, "Caller gave up on embedding job");
                    return Err(EmbeddingRequestError::CallerCancelled);
                }
                _ = &mut deadline => {
                    tracing::warn!(job.id = %job_id, max_wait = ?self.config.max_wait, "Embedding job did not finish in time");
                    return Err(EmbeddingRequestError::TimedOut(self.config.max_wait));
                }
                polled = poll => polled?.ok_or(EmbeddingRequestError::JobMissing(job_id))?,
            };

            tracing::trace!(job.id = %job_id, state = %job.state, "Polled embedding job");
            if let Some(outcome) = self.settle(job).await {
                return outcome;
            }
        }
    }

    /// Outcome for a terminal job, `None` while it is still pending.
    async fn settle(&self, job: Job) -> Option<Result<TextEmbedding, EmbeddingRequestError>> {
        let last_error = || job.last_error().unwrap_or("no error recorded").to_string();

        match job.state {
            JobState::Completed => {
                let outcome = match job.output_as::<TextEmbedding>() {
                    Some(Ok(embedding)) => Ok(embedding),
                    Some(Err(e)) => Err(EmbeddingRequestError::InvalidOutput(e.to_string())),
                    None => Err(EmbeddingRequestError::InvalidOutput(
                        "completed without output".to_string(),
                    )),
                };
                if let Err(e) = self.jobs.delete(job.id).await {
                    tracing::warn!(job.id = %job.id, error = %e, "Failed to delete consumed embedding job");
                }
                Some(outcome)
            }
            JobState::Discarded => Some(Err(EmbeddingRequestError::Discarded(last_error()))),
            JobState::Cancelled => Some(Err(EmbeddingRequestError::Cancelled(last_error()))),
            JobState::Available | JobState::Running | JobState::Retryable => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use vista_core::models::{JobAttemptError, QueueName};
    use vista_db::{JobStore, MemoryJobStore};

    use crate::test_support::FaultyJobStore;

    fn bridge(store: &MemoryJobStore, max_wait: Duration) -> EmbeddingBridge {
        EmbeddingBridge::new(
            JobClient::new(Arc::new(store.clone()), 1),
            BridgeConfig {
                poll_interval: Duration::from_millis(5),
                max_wait,
            },
        )
    }

    fn attempt_error(message: &str) -> JobAttemptError {
        JobAttemptError {
            attempt: 1,
            at: Utc::now(),
            error: message.to_string(),
        }
    }

    /// Claims the next embedding job and finishes it with `finish`.
    async fn serve_one<F, Fut>(store: MemoryJobStore, finish: F)
    where
        F: FnOnce(MemoryJobStore, Job) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        loop {
            if let Some(job) = store.claim(QueueName::Embedding).await.unwrap() {
                finish(store, job).await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    #[tokio::test]
    async fn test_completed_job_is_returned_and_deleted() {
        let store = MemoryJobStore::new();
        let server = tokio::spawn(serve_one(store.clone(), |store, job| async move {
            assert_eq!(job.args["text"], "red bicycle");
            assert_eq!(job.args["space"], "vision");
            let output = serde_json::json!({ "vector": [1.0, 0.0], "space": "vision" });
            store.complete(job.id, Some(output)).await.unwrap();
        }));

        let embedding = bridge(&store, Duration::from_secs(5))
            .request_text_embedding("red bicycle", &CancellationToken::new())
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(embedding.vector, vec![1.0, 0.0]);
        assert_eq!(embedding.space, "vision");
        assert!(store.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_discarded_job_reports_last_error() {
        let store = MemoryJobStore::new();
        let server = tokio::spawn(serve_one(store.clone(), |store, job| async move {
            store
                .retry(job.id, attempt_error("model server down"), Utc::now())
                .await
                .unwrap();
        }));

        let err = bridge(&store, Duration::from_secs(5))
            .request_text_embedding("red bicycle", &CancellationToken::new())
            .await
            .unwrap_err();
        server.await.unwrap();

        match err {
            EmbeddingRequestError::Discarded(message) => assert!(message.contains("model server down")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_job_reports_last_error() {
        let store = MemoryJobStore::new();
        let server = tokio::spawn(serve_one(store.clone(), |store, job| async move {
            store
                .cancel(job.id, attempt_error("text to embed is empty"))
                .await
                .unwrap();
        }));

        let err = bridge(&store, Duration::from_secs(5))
            .request_text_embedding(" ", &CancellationToken::new())
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, EmbeddingRequestError::Cancelled(m) if m.contains("empty")));
        // Failed jobs stay around for inspection.
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_leaves_job_untouched() {
        let store = MemoryJobStore::new();
        let err = bridge(&store, Duration::from_millis(30))
            .request_text_embedding("red bicycle", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EmbeddingRequestError::TimedOut(_)));
        let jobs = store.all().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state, JobState::Available);
    }

    #[tokio::test]
    async fn test_caller_cancellation_leaves_job_untouched() {
        let store = MemoryJobStore::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = bridge(&store, Duration::from_secs(5))
            .request_text_embedding("red bicycle", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, EmbeddingRequestError::CallerCancelled));
        assert_eq!(store.all().await[0].state, JobState::Available);
    }

    #[tokio::test]
    async fn test_deleted_job_is_reported_missing() {
        let store = MemoryJobStore::new();
        let server = tokio::spawn(serve_one(store.clone(), |store, job| async move {
            store.delete(job.id).await.unwrap();
        }));

        let err = bridge(&store, Duration::from_secs(5))
            .request_text_embedding("red bicycle", &CancellationToken::new())
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, EmbeddingRequestError::JobMissing(_)));
    }

    #[tokio::test]
    async fn test_malformed_output_is_invalid() {
        let store = MemoryJobStore::new();
        let server = tokio::spawn(serve_one(store.clone(), |store, job| async move {
            store
                .complete(job.id, Some(serde_json::json!({ "oops": true })))
                .await
                .unwrap();
        }));

        let err = bridge(&store, Duration::from_secs(5))
            .request_text_embedding("red bicycle", &CancellationToken::new())
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, EmbeddingRequestError::InvalidOutput(_)));
    }

    fn stalled_bridge(store: &MemoryJobStore, max_wait: Duration) -> EmbeddingBridge {
        let faulty = FaultyJobStore::new(store.clone());
        faulty.stall_gets();
        EmbeddingBridge::new(
            JobClient::new(Arc::new(faulty), 1),
            BridgeConfig {
                poll_interval: Duration::from_millis(5),
                max_wait,
            },
        )
    }

    #[tokio::test]
    async fn test_deadline_interrupts_hung_lookup() {
        let store = MemoryJobStore::new();
        let bridge = stalled_bridge(&store, Duration::from_millis(30));
        let cancel = CancellationToken::new();

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            bridge.request_text_embedding("red bicycle", &cancel),
        )
        .await
        .expect("lookup was not interrupted")
        .unwrap_err();
        assert!(matches!(err, EmbeddingRequestError::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_hung_lookup() {
        let store = MemoryJobStore::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let bridge = stalled_bridge(&store, Duration::from_secs(60));
        let err = tokio::time::timeout(
            Duration::from_secs(2),
            bridge.request_text_embedding("red bicycle", &cancel),
        )
        .await
        .expect("lookup was not interrupted")
        .unwrap_err();
        assert!(matches!(err, EmbeddingRequestError::CallerCancelled));
    }
}
