//! Process-level worker pool: one runner per hosted queue plus maintenance.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vista_core::models::QueueName;
use vista_core::Config;
use vista_db::JobStore;
use vista_infra::RateLimiter;

use crate::context::JobDispatcher;
use crate::maintenance::{run_maintenance, MaintenanceConfig};
use crate::queue::{QueueRunner, QueueRunnerConfig};

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub queues: Vec<QueueRunnerConfig>,
    pub maintenance: MaintenanceConfig,
}

impl WorkerPoolConfig {
    /// Runners for every queue listed in `WORKER_QUEUES`.
    pub fn from_config(config: &Config) -> Self {
        let queues: Vec<QueueRunnerConfig> = config
            .worker_queues()
            .iter()
            .map(|&queue| {
                let settings = config.queue_settings(queue);
                QueueRunnerConfig {
                    queue,
                    max_workers: settings.max_workers,
                    timeout: settings.timeout,
                    poll_interval: config.job_poll_interval(),
                    retry_base_delay: config.job_retry_base_delay(),
                    max_backoff: config.job_max_backoff(),
                    shutdown_grace: config.shutdown_grace(),
                }
            })
            .collect();

        let retention_days = config.job_retention_days();
        let maintenance = MaintenanceConfig {
            queues: queues.iter().map(|q| (q.queue, q.timeout)).collect(),
            reap_interval: Duration::from_secs(config.stale_job_reap_interval_secs()),
            grace_period: config.stale_job_grace_period(),
            retention: (retention_days > 0).then(|| chrono::Duration::days(retention_days)),
        };

        Self {
            queues,
            maintenance,
        }
    }
}

pub struct WorkerPool {
    worker_id: String,
    queues: Vec<QueueName>,
    shutdown: CancellationToken,
    runners: Vec<JoinHandle<()>>,
    maintenance: JoinHandle<()>,
}

impl WorkerPool {
    /// Spawn the runners and the maintenance loop. Must be called within a
    /// Tokio runtime.
    pub fn start(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<dyn JobDispatcher>,
        rate_limiter: RateLimiter,
        config: WorkerPoolConfig,
    ) -> Self {
        let worker_id = worker_id();
        let shutdown = CancellationToken::new();
        let queues: Vec<QueueName> = config.queues.iter().map(|q| q.queue).collect();

        tracing::info!(
            worker.id = %worker_id,
            queues = ?queues,
            "Starting worker pool"
        );

        let runners = config
            .queues
            .into_iter()
            .map(|queue_config| {
                let runner = QueueRunner::new(
                    store.clone(),
                    dispatcher.clone(),
                    rate_limiter.clone(),
                    queue_config,
                );
                tokio::spawn(runner.run(shutdown.child_token()))
            })
            .collect();

        let maintenance = tokio::spawn(run_maintenance(
            store,
            config.maintenance,
            shutdown.child_token(),
        ));

        Self {
            worker_id,
            queues,
            shutdown,
            runners,
            maintenance,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn queues(&self) -> &[QueueName] {
        &self.queues
    }

    /// Stop claiming and wait for every runner to drain its in-flight jobs
    /// (each bounded by its shutdown grace period).
    pub async fn shutdown(self) {
        tracing::info!(worker.id = %self.worker_id, "Initiating worker pool shutdown");
        self.shutdown.cancel();

        for handle in self.runners {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Queue runner task failed");
            }
        }
        if let Err(e) = self.maintenance.await {
            tracing::error!(error = %e, "Maintenance task failed");
        }

        tracing::info!(worker.id = %self.worker_id, "Worker pool stopped");
    }
}

fn worker_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}-{}", host, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vista_core::models::{EnqueueOptions, IndexMediaArgs, Job, JobState, ReindexAllArgs};
    use vista_core::JobError;
    use vista_db::MemoryJobStore;

    use crate::JobClient;

    struct Noop;

    #[async_trait]
    impl JobDispatcher for Noop {
        async fn dispatch(&self, _job: &Job) -> Result<Option<serde_json::Value>, JobError> {
            Ok(None)
        }
    }

    fn runner_config(queue: QueueName) -> QueueRunnerConfig {
        QueueRunnerConfig {
            poll_interval: Duration::from_millis(10),
            ..QueueRunnerConfig::new(queue)
        }
    }

    #[tokio::test]
    async fn test_pool_runs_only_hosted_queues() {
        let store = MemoryJobStore::new();
        let client = JobClient::new(Arc::new(store.clone()), 3);
        let config = WorkerPoolConfig {
            queues: vec![runner_config(QueueName::Index)],
            maintenance: MaintenanceConfig {
                queues: vec![(QueueName::Index, Duration::from_secs(60))],
                reap_interval: Duration::from_secs(60),
                grace_period: Duration::from_secs(60),
                retention: None,
            },
        };
        let pool = WorkerPool::start(
            Arc::new(store.clone()),
            Arc::new(Noop),
            RateLimiter::unlimited(),
            config,
        );
        assert_eq!(pool.queues(), &[QueueName::Index]);
        assert!(!pool.worker_id().is_empty());

        let hosted = client
            .enqueue(
                &IndexMediaArgs {
                    media_id: "abc123".into(),
                },
                EnqueueOptions::default(),
            )
            .await
            .unwrap();
        let unhosted = client
            .enqueue(&ReindexAllArgs {}, EnqueueOptions::default())
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let job = store.get(hosted.id).await.unwrap().unwrap();
                if job.state == JobState::Completed {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("hosted queue job did not complete");

        pool.shutdown().await;

        let unhosted = store.get(unhosted.id).await.unwrap().unwrap();
        assert_eq!(unhosted.state, JobState::Available);
    }
}
