use async_trait::async_trait;

use vista_core::constants::VISION_SPACE;
use vista_core::models::{Job, TextEmbedding, TextEmbeddingArgs};
use vista_core::vector::l2_normalize;
use vista_core::JobError;

use super::embed::runtime;
use super::{inference_failure, parse_args, JobHandler};
use crate::state::PipelineState;

/// `embed_text`: embed a query string into a vector space shared with the
/// image embeddings. The result is returned as the job output and picked up
/// by the waiting bridge caller.
pub struct TextEmbeddingWorker;

#[async_trait]
impl JobHandler for TextEmbeddingWorker {
    #[tracing::instrument(skip(self, job, state), fields(job.id = %job.id))]
    async fn process(
        &self,
        job: &Job,
        state: &PipelineState,
    ) -> Result<Option<serde_json::Value>, JobError> {
        let args: TextEmbeddingArgs = parse_args(job)?;

        if args.text.trim().is_empty() {
            return Err(JobError::cancel(anyhow::anyhow!("text to embed is empty")));
        }
        if args.space != VISION_SPACE {
            return Err(JobError::cancel(anyhow::anyhow!(
                "unknown vector space {:?}",
                args.space
            )));
        }

        let model = runtime(state)?
            .text()
            .await
            .map_err(|e| inference_failure(e, "acquiring text model"))?;
        let mut vector = model
            .embed_text(&args.text)
            .await
            .map_err(|e| inference_failure(e, "embedding text"))?;
        l2_normalize(&mut vector);

        tracing::debug!(dimensions = vector.len(), "Text embedded");

        let output = TextEmbedding {
            vector,
            space: args.space,
        };
        let output = serde_json::to_value(&output)
            .map_err(|e| JobError::retry(anyhow::Error::new(e).context("encoding embedding")))?;

        Ok(Some(output))
    }
}
