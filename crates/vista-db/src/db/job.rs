use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use vista_core::models::{Job, JobAttemptError, NewJob, QueueName};
use vista_core::{StoreError, StoreResult};

use crate::db::transaction::TransactionGuard;
use crate::traits::JobStore;

const JOB_COLUMNS: &str = "id, queue, kind, args, state, attempt, max_attempts, output, errors, \
                           scheduled_at, attempted_at, finalized_at, created_at";

/// Delay before re-establishing a dropped LISTEN connection.
const LISTEN_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn not_running(id: Uuid) -> StoreError {
        StoreError::NotFound(format!("job {} is not running", id))
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[tracing::instrument(skip(self, job), fields(db.table = "vista_jobs", db.operation = "insert", job.kind = %job.kind, job.queue = %job.queue))]
    async fn enqueue(&self, job: NewJob) -> StoreResult<Job> {
        let mut tx = TransactionGuard::begin_labeled(&self.pool, "enqueue_job").await?;

        let inserted: Job = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            INSERT INTO vista_jobs (id, queue, kind, args, state, max_attempts, scheduled_at)
            VALUES ($1, $2, $3, $4, 'available', $5, $6)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(job.queue.as_str())
        .bind(job.kind.to_string())
        .bind(&job.args)
        .bind(job.max_attempts)
        .bind(job.scheduled_at)
        .fetch_one(&mut **tx)
        .await?;

        // Delivered on commit; runners fall back to polling if nobody listens.
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(job.queue.notify_channel())
            .bind(inserted.id.to_string())
            .execute(&mut **tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            job.id = %inserted.id,
            job.kind = %inserted.kind,
            job.queue = %inserted.queue,
            "Job enqueued"
        );

        Ok(inserted)
    }

    #[tracing::instrument(skip(self), fields(db.table = "vista_jobs", db.operation = "claim"))]
    async fn claim(&self, queue: QueueName) -> StoreResult<Option<Job>> {
        let mut tx = TransactionGuard::begin_labeled(&self.pool, "claim_job").await?;

        let next: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM vista_jobs
            WHERE queue = $1
                AND state IN ('available', 'retryable')
                AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC, created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(queue.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        let Some((id,)) = next else {
            tx.rollback().await?;
            return Ok(None);
        };

        let job: Job = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            UPDATE vista_jobs
            SET state = 'running',
                attempt = attempt + 1,
                attempted_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            job.id = %job.id,
            job.kind = %job.kind,
            attempt = job.attempt,
            "Job claimed"
        );

        Ok(Some(job))
    }

    #[tracing::instrument(skip(self, output), fields(db.table = "vista_jobs", db.operation = "complete"))]
    async fn complete(&self, id: Uuid, output: Option<serde_json::Value>) -> StoreResult<Job> {
        let job: Option<Job> = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            UPDATE vista_jobs
            SET state = 'completed',
                output = $2,
                finalized_at = NOW()
            WHERE id = $1 AND state = 'running'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(output)
        .fetch_optional(&self.pool)
        .await?;

        job.ok_or_else(|| Self::not_running(id))
    }

    #[tracing::instrument(skip(self, error), fields(db.table = "vista_jobs", db.operation = "retry"))]
    async fn retry(
        &self,
        id: Uuid,
        error: JobAttemptError,
        retry_at: DateTime<Utc>,
    ) -> StoreResult<Job> {
        let error = serde_json::to_value(&error)?;

        let job: Option<Job> = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            UPDATE vista_jobs
            SET state = CASE WHEN attempt >= max_attempts
                             THEN 'discarded'::job_state
                             ELSE 'retryable'::job_state END,
                scheduled_at = CASE WHEN attempt >= max_attempts THEN scheduled_at ELSE $3 END,
                finalized_at = CASE WHEN attempt >= max_attempts THEN NOW() ELSE NULL END,
                errors = errors || jsonb_build_array($2::jsonb)
            WHERE id = $1 AND state = 'running'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(error)
        .bind(retry_at)
        .fetch_optional(&self.pool)
        .await?;

        job.ok_or_else(|| Self::not_running(id))
    }

    #[tracing::instrument(skip(self, error), fields(db.table = "vista_jobs", db.operation = "cancel"))]
    async fn cancel(&self, id: Uuid, error: JobAttemptError) -> StoreResult<Job> {
        let error = serde_json::to_value(&error)?;

        let job: Option<Job> = sqlx::query_as::<Postgres, Job>(&format!(
            r#"
            UPDATE vista_jobs
            SET state = 'cancelled',
                finalized_at = NOW(),
                errors = errors || jsonb_build_array($2::jsonb)
            WHERE id = $1 AND state = 'running'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        job.ok_or_else(|| Self::not_running(id))
    }

    #[tracing::instrument(skip(self), fields(db.table = "vista_jobs", db.operation = "select"))]
    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        let job = sqlx::query_as::<Postgres, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM vista_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    #[tracing::instrument(skip(self), fields(db.table = "vista_jobs", db.operation = "delete"))]
    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM vista_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "vista_jobs", db.operation = "reap_stale"))]
    async fn reap_stale(&self, queue: QueueName, stale_before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE vista_jobs
            SET state = CASE WHEN attempt >= max_attempts
                             THEN 'discarded'::job_state
                             ELSE 'retryable'::job_state END,
                finalized_at = CASE WHEN attempt >= max_attempts THEN NOW() ELSE NULL END,
                scheduled_at = NOW(),
                errors = errors || jsonb_build_array(jsonb_build_object(
                    'attempt', attempt,
                    'at', NOW(),
                    'error', 'job exceeded its timeout and was reaped'
                ))
            WHERE queue = $1
                AND state = 'running'
                AND attempted_at < $2
            "#,
        )
        .bind(queue.as_str())
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::warn!(queue = %queue, reaped, "Reaped stale running jobs");
        }

        Ok(reaped)
    }

    #[tracing::instrument(skip(self), fields(db.table = "vista_jobs", db.operation = "cleanup"))]
    async fn delete_finished_before(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM vista_jobs
            WHERE state IN ('completed', 'discarded', 'cancelled')
                AND finalized_at < $1
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn listen(&self, queue: QueueName, tx: mpsc::Sender<()>) -> StoreResult<()> {
        let pool = self.pool.clone();
        let channel = queue.notify_channel();

        tokio::spawn(async move {
            loop {
                match sqlx::postgres::PgListener::connect_with(&pool).await {
                    Ok(mut listener) => {
                        if let Err(e) = listener.listen(&channel).await {
                            tracing::warn!(error = %e, channel = %channel, "LISTEN failed, will retry");
                            tokio::time::sleep(LISTEN_RECONNECT_DELAY).await;
                            continue;
                        }
                        tracing::debug!(channel = %channel, "Listening for job notifications");
                        while listener.recv().await.is_ok() {
                            if tx.send(()).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "PgListener connect failed, will retry");
                        tokio::time::sleep(LISTEN_RECONNECT_DELAY).await;
                    }
                }
                if tx.is_closed() {
                    return;
                }
            }
        });

        Ok(())
    }
}
