//! Queue runner: bounded worker pool, LISTEN/NOTIFY or polling, retry scheduling.
//!
//! Shutdown: cancelling the token passed to [`QueueRunner::run`] stops
//! claiming immediately. `run` then waits up to `shutdown_grace` for in-flight
//! jobs before returning. Jobs still running after that are left `running`
//! and are handed back to the queue by the stale-job reaper.

use anyhow::anyhow;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use vista_core::models::{Job, JobAttemptError, JobState, QueueName};
use vista_core::{JobDisposition, JobError, StoreResult};
use vista_db::JobStore;
use vista_infra::RateLimiter;

use crate::context::JobDispatcher;

/// Backoff before the next attempt after `attempt` failed:
/// `min(base * 2^(attempt - 1), max)`.
pub fn compute_retry_backoff(attempt: i32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).clamp(0, 30) as u32;
    base.saturating_mul(2_u32.pow(exponent)).min(max)
}

#[derive(Debug, Clone)]
pub struct QueueRunnerConfig {
    pub queue: QueueName,
    pub max_workers: usize,
    /// Handler deadline. Exceeding it counts as a retryable failure.
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub retry_base_delay: Duration,
    pub max_backoff: Duration,
    pub shutdown_grace: Duration,
}

impl QueueRunnerConfig {
    pub fn new(queue: QueueName) -> Self {
        Self {
            queue,
            max_workers: 4,
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(1),
            retry_base_delay: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

pub struct QueueRunner {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<dyn JobDispatcher>,
    rate_limiter: RateLimiter,
    config: QueueRunnerConfig,
    semaphore: Arc<Semaphore>,
    slot_freed: Notify,
}

impl QueueRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        rate_limiter: RateLimiter,
        config: QueueRunnerConfig,
    ) -> Arc<Self> {
        let max_workers = config.max_workers.max(1);
        Arc::new(Self {
            store,
            dispatcher,
            rate_limiter,
            semaphore: Arc::new(Semaphore::new(max_workers)),
            config: QueueRunnerConfig {
                max_workers,
                ..config
            },
            slot_freed: Notify::new(),
        })
    }

    pub fn queue(&self) -> QueueName {
        self.config.queue
    }

    /// Number of jobs currently executing.
    pub fn in_flight(&self) -> usize {
        self.config.max_workers - self.semaphore.available_permits()
    }

    /// Claim and execute jobs until `shutdown` is cancelled, then drain.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let queue = self.config.queue;

        // Wake-ups from the store. The channel closes if the store gives up
        // listening; polling covers that case.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        let listening = match self.store.listen(queue, notify_tx).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(queue = %queue, error = %e, "Job notifications unavailable, polling only");
                false
            }
        };

        tracing::info!(
            queue = %queue,
            max_workers = self.config.max_workers,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            timeout_secs = self.config.timeout.as_secs(),
            listen_notify = listening,
            "Queue runner started"
        );

        loop {
            self.claim_available(&shutdown).await;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(queue = %queue, "Queue runner shutting down");
                    break;
                }
                Some(()) = notify_rx.recv() => {}
                _ = self.slot_freed.notified() => {}
                _ = sleep(self.config.poll_interval) => {}
            }
        }

        self.drain().await;
        tracing::info!(queue = %queue, "Queue runner stopped");
    }

    /// Claim jobs while worker slots are free and spawn them.
    async fn claim_available(self: &Arc<Self>, shutdown: &CancellationToken) {
        while !shutdown.is_cancelled() {
            let permit = match self.semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::trace!(queue = %self.config.queue, "No workers available, skipping claim");
                    return;
                }
            };

            match self.store.claim(self.config.queue).await {
                Ok(Some(job)) => {
                    let runner = Arc::clone(self);
                    tokio::spawn(async move {
                        runner.execute(job).await;
                        // Free the slot before waking the claim loop.
                        drop(permit);
                        runner.slot_freed.notify_one();
                    });
                }
                Ok(None) => {
                    tracing::trace!(queue = %self.config.queue, "No jobs available in queue");
                    return;
                }
                Err(e) => {
                    tracing::error!(queue = %self.config.queue, error = %e, "Failed to claim job from queue");
                    return;
                }
            }
        }
    }

    #[tracing::instrument(skip(self, job), fields(job.id = %job.id, job.kind = %job.kind, job.queue = %job.queue, attempt = job.attempt))]
    async fn execute(&self, job: Job) {
        self.rate_limiter.acquire(&job.kind).await;

        let start = Instant::now();
        let result =
            match tokio::time::timeout(self.config.timeout, self.dispatcher.dispatch(&job)).await {
                Ok(result) => result,
                Err(_) => Err(JobError::retry(anyhow!(
                    "job timed out after {}s",
                    self.config.timeout.as_secs_f64()
                ))),
            };
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        if let Err(e) = self.record_outcome(&job, result, duration_ms).await {
            // The job stays `running`; the reaper will return it to the queue.
            tracing::error!(error = %e, "Failed to record job outcome");
        }
    }

    async fn record_outcome(
        &self,
        job: &Job,
        result: Result<Option<serde_json::Value>, JobError>,
        duration_ms: f64,
    ) -> StoreResult<()> {
        let err = match result {
            Ok(output) => {
                self.store.complete(job.id, output).await?;
                tracing::info!(duration_ms, "Job completed successfully");
                return Ok(());
            }
            Err(err) => err,
        };

        let attempt_error = JobAttemptError {
            attempt: job.attempt,
            at: Utc::now(),
            error: err.to_string(),
        };

        match err.disposition() {
            JobDisposition::Cancel => {
                self.store.cancel(job.id, attempt_error).await?;
                tracing::warn!(error = %err, duration_ms, "Job cancelled, will not retry");
            }
            JobDisposition::Retry => {
                let backoff = compute_retry_backoff(
                    job.attempt,
                    self.config.retry_base_delay,
                    self.config.max_backoff,
                );
                let retry_at = Utc::now() + chrono::Duration::milliseconds(backoff.as_millis() as i64);
                let updated = self.store.retry(job.id, attempt_error, retry_at).await?;

                if updated.state == JobState::Discarded {
                    tracing::error!(
                        error = %err,
                        max_attempts = job.max_attempts,
                        "Job discarded after exhausting its attempts"
                    );
                } else {
                    tracing::warn!(
                        error = %err,
                        max_attempts = job.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "Job failed, scheduled for retry"
                    );
                }
            }
        }

        Ok(())
    }

    /// Wait for in-flight jobs, up to the shutdown grace period.
    async fn drain(&self) {
        let in_flight = self.in_flight();
        if in_flight == 0 {
            return;
        }

        tracing::info!(
            queue = %self.config.queue,
            in_flight,
            grace_secs = self.config.shutdown_grace.as_secs(),
            "Waiting for in-flight jobs"
        );

        let all = self.config.max_workers as u32;
        match tokio::time::timeout(self.config.shutdown_grace, self.semaphore.acquire_many(all)).await
        {
            Ok(_) => tracing::info!(queue = %self.config.queue, "In-flight jobs finished"),
            Err(_) => tracing::warn!(
                queue = %self.config.queue,
                abandoned = self.in_flight(),
                "Shutdown grace period elapsed with jobs still running"
            ),
        }
    }
}
