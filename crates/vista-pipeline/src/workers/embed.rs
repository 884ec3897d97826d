use async_trait::async_trait;
use std::sync::Arc;

use vista_core::constants::VISION_SPACE;
use vista_core::models::{EmbedMediaArgs, Job};
use vista_core::vector::l2_normalize;
use vista_core::{JobError, StoreError};
use vista_inference::InferenceRuntime;
use vista_processing::preprocess;

use super::{
    decode_failure, inference_failure, parse_args, storage_failure, store_failure, JobHandler,
};
use crate::state::PipelineState;

/// `embed_media`: compute the vision embedding of an image (or a video
/// preview) and replace the media's vectors with it.
pub struct EmbedWorker;

pub(crate) fn runtime(state: &PipelineState) -> Result<&Arc<InferenceRuntime>, JobError> {
    // Another process hosting the embedding queue may have the models.
    state.inference.as_ref().ok_or_else(|| {
        JobError::retry(anyhow::anyhow!(
            "inference runtime is not loaded in this worker"
        ))
    })
}

#[async_trait]
impl JobHandler for EmbedWorker {
    #[tracing::instrument(skip(self, job, state), fields(job.id = %job.id, media.id = tracing::field::Empty))]
    async fn process(
        &self,
        job: &Job,
        state: &PipelineState,
    ) -> Result<Option<serde_json::Value>, JobError> {
        let args: EmbedMediaArgs = parse_args(job)?;
        tracing::Span::current().record("media.id", args.key.as_str());

        let runtime = runtime(state)?;

        if !state
            .media
            .exists(&args.key)
            .await
            .map_err(|e| store_failure(e, "checking media record"))?
        {
            tracing::info!(media.id = %args.key, "Media deleted before embedding, nothing to do");
            return Ok(None);
        }

        let data = state
            .storage
            .get(&args.bucket, &args.key)
            .await
            .map_err(|e| storage_failure(e, "downloading embedding source"))?;

        // Decoding and resizing are CPU bound.
        let size = runtime.input_size();
        let pixels = tokio::task::spawn_blocking(move || preprocess(&data, size))
            .await
            .map_err(|e| JobError::retry(anyhow::anyhow!("preprocessing task failed: {}", e)))?
            .map_err(|e| decode_failure(e, "preparing model input"))?;

        let model = runtime
            .vision()
            .await
            .map_err(|e| inference_failure(e, "acquiring vision model"))?;
        let mut vector = model
            .embed_image(&pixels)
            .await
            .map_err(|e| inference_failure(e, "embedding image"))?;
        l2_normalize(&mut vector);

        let dimensions = vector.len();
        match state
            .vectors
            .replace_vectors(&args.key, vec![(VISION_SPACE.to_string(), vector)])
            .await
        {
            Ok(()) => {
                tracing::info!(media.id = %args.key, dimensions, "Media embedded");
            }
            Err(StoreError::NotFound(_)) => {
                tracing::info!(media.id = %args.key, "Media deleted while embedding, vectors dropped");
            }
            Err(e) => return Err(store_failure(e, "storing vectors")),
        }

        Ok(None)
    }
}
