//! Wiring of the production pipeline from configuration.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;

use vista_core::Config;
use vista_db::{
    setup_database, PgJobStore, PgMediaStore, PgSearchIndex, PgSearchReconciler, PgVectorStore,
};
use vista_inference::InferenceRuntime;
use vista_processing::FfmpegProber;
use vista_storage::create_storage;
use vista_worker::JobClient;

use crate::state::{PipelineSettings, PipelineState};

/// Connect to Postgres (applying migrations), open object storage and build
/// the shared pipeline state.
///
/// The inference runtime is loaded only when `with_inference` is set, i.e.
/// when this process hosts the embedding queue.
pub async fn setup_pipeline(
    config: &Config,
    with_inference: bool,
) -> Result<(PgPool, Arc<PipelineState>)> {
    let pool = setup_database(config).await?;

    let storage = create_storage(config)
        .await
        .context("Failed to initialize object storage")?;
    tracing::info!(backend = ?storage.backend_type(), "Object storage initialized");

    let prober = FfmpegProber::new(config.ffprobe_path(), config.ffmpeg_path())
        .context("Invalid ffmpeg/ffprobe configuration")?;

    let inference = if with_inference {
        let runtime = InferenceRuntime::load(config)
            .await
            .context("Failed to load inference runtime")?;
        Some(Arc::new(runtime))
    } else {
        tracing::info!("Embedding queue not hosted, inference runtime not loaded");
        None
    };

    let jobs = JobClient::new(
        Arc::new(PgJobStore::new(pool.clone())),
        config.job_max_attempts(),
    );

    let state = PipelineState {
        media: Arc::new(PgMediaStore::new(pool.clone())),
        vectors: Arc::new(PgVectorStore::new(pool.clone())),
        search: Arc::new(PgSearchIndex::new(pool.clone())),
        reconciler: Arc::new(PgSearchReconciler::new(pool.clone())),
        jobs,
        storage,
        prober: Arc::new(prober),
        inference,
        settings: PipelineSettings::from_config(config),
    };

    Ok((pool, Arc::new(state)))
}
