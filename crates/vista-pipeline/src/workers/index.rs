use async_trait::async_trait;

use vista_core::models::{IndexMediaArgs, Job};
use vista_core::JobError;

use super::{parse_args, store_failure, JobHandler};
use crate::state::PipelineState;

/// `index_media`: bring the search document of a media in line with its
/// relational record.
pub struct IndexWorker;

#[async_trait]
impl JobHandler for IndexWorker {
    #[tracing::instrument(skip(self, job, state), fields(job.id = %job.id, media.id = tracing::field::Empty))]
    async fn process(
        &self,
        job: &Job,
        state: &PipelineState,
    ) -> Result<Option<serde_json::Value>, JobError> {
        let args: IndexMediaArgs = parse_args(job)?;
        tracing::Span::current().record("media.id", args.media_id.as_str());

        state
            .reconciler
            .reconcile(&args.media_id)
            .await
            .map_err(|e| store_failure(e, "reconciling search document"))?;

        Ok(None)
    }
}
