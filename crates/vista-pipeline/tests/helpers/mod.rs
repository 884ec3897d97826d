//! Shared harness for the pipeline integration tests.
//!
//! Runs the real stage workers and worker pool against the in-memory stores,
//! a local filesystem storage in a temp dir, a scripted prober and
//! deterministic fake models.

#![allow(dead_code)]

pub mod fakes;
pub mod fixtures;

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use vista_core::models::{Job, JobKind, QueueName};
use vista_db::{
    MediaStore, MemoryJobStore, MemoryMediaStore, MemorySearchIndex, MemorySearchReconciler,
};
use vista_inference::InferenceRuntime;
use vista_infra::RateLimiter;
use vista_pipeline::{
    BridgeConfig, Pipeline, PipelineDispatcher, PipelineSettings, PipelineState,
};
use vista_storage::{LocalStorage, Storage};
use vista_worker::{
    JobClient, MaintenanceConfig, QueueRunnerConfig, WorkerPool, WorkerPoolConfig,
};

use fakes::{FakeProber, FakeText, FakeVision};

pub const MEDIA_BUCKET: &str = "media";
pub const PREVIEW_BUCKET: &str = "previews";

pub struct Harness {
    _dir: TempDir,
    pub storage: Arc<LocalStorage>,
    pub media: MemoryMediaStore,
    pub search: MemorySearchIndex,
    pub jobs: MemoryJobStore,
    pub prober: Arc<FakeProber>,
    pub state: Arc<PipelineState>,
    pub pipeline: Pipeline,
    pool: Option<WorkerPool>,
}

impl Harness {
    /// Harness with a prober that reports no media (images only).
    pub async fn start() -> Self {
        Self::with_prober(FakeProber::audio_only(180.0)).await
    }

    pub async fn with_prober(prober: FakeProber) -> Self {
        Self::build(prober, |media| Arc::new(media.clone())).await
    }

    /// Harness whose stage workers see the media store through `wrap`.
    /// Assertions on `media` still read the underlying store.
    pub async fn with_media_store(
        wrap: impl FnOnce(&MemoryMediaStore) -> Arc<dyn MediaStore>,
    ) -> Self {
        Self::build(FakeProber::audio_only(180.0), wrap).await
    }

    async fn build(
        prober: FakeProber,
        wrap: impl FnOnce(&MemoryMediaStore) -> Arc<dyn MediaStore>,
    ) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = Arc::new(LocalStorage::new(dir.path()).await.expect("local storage"));
        let media = MemoryMediaStore::new();
        let search = MemorySearchIndex::new();
        let jobs = MemoryJobStore::new();
        let prober = Arc::new(prober);

        let runtime = InferenceRuntime::from_models(Arc::new(FakeVision), Arc::new(FakeText));

        let state = Arc::new(PipelineState {
            media: wrap(&media),
            vectors: Arc::new(media.clone()),
            search: Arc::new(search.clone()),
            reconciler: Arc::new(MemorySearchReconciler::new(
                Arc::new(media.clone()),
                Arc::new(search.clone()),
            )),
            jobs: JobClient::new(Arc::new(jobs.clone()), 3),
            storage: storage.clone(),
            prober: prober.clone(),
            inference: Some(Arc::new(runtime)),
            settings: PipelineSettings {
                media_bucket: MEDIA_BUCKET.to_string(),
                preview_bucket: PREVIEW_BUCKET.to_string(),
                preview_offset_secs: 2.0,
            },
        });

        let pipeline = Pipeline::new(
            state.clone(),
            BridgeConfig {
                poll_interval: Duration::from_millis(10),
                max_wait: Duration::from_secs(10),
            },
        );

        let pool = WorkerPool::start(
            Arc::new(jobs.clone()),
            Arc::new(PipelineDispatcher::new(state.clone())),
            RateLimiter::unlimited(),
            pool_config(),
        );

        Self {
            _dir: dir,
            storage,
            media,
            search,
            jobs,
            prober,
            state,
            pipeline,
            pool: Some(pool),
        }
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    pub async fn put_media(&self, key: &str, data: Vec<u8>, content_type: &str) {
        self.storage
            .put(MEDIA_BUCKET, key, Bytes::from(data), content_type)
            .await
            .expect("store object");
    }

    /// Store an object and queue its analysis.
    pub async fn ingest(&self, key: &str, data: Vec<u8>, content_type: &str) -> Job {
        self.put_media(key, data, content_type).await;
        self.pipeline
            .enqueue_analyze(key, content_type)
            .await
            .expect("enqueue analyze")
    }

    /// Wait until every job is in a terminal state and return them all.
    pub async fn wait_idle(&self) -> Vec<Job> {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let jobs = self.jobs.all().await;
                if !jobs.is_empty() && jobs.iter().all(|j| j.is_terminal()) {
                    return jobs;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("pipeline did not settle")
    }

    pub async fn jobs_of(&self, kind: JobKind) -> Vec<Job> {
        self.jobs
            .all()
            .await
            .into_iter()
            .filter(|j| j.kind == kind)
            .collect()
    }

    pub async fn shutdown(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown().await;
        }
    }
}

fn pool_config() -> WorkerPoolConfig {
    let queues = QueueName::ALL
        .iter()
        .map(|&queue| QueueRunnerConfig {
            max_workers: 2,
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            retry_base_delay: Duration::ZERO,
            max_backoff: Duration::ZERO,
            shutdown_grace: Duration::from_secs(1),
            ..QueueRunnerConfig::new(queue)
        })
        .collect();

    WorkerPoolConfig {
        queues,
        maintenance: MaintenanceConfig {
            queues: Vec::new(),
            reap_interval: Duration::ZERO,
            grace_period: Duration::ZERO,
            retention: None,
        },
    }
}
