use async_trait::async_trait;

use vista_core::models::{EnqueueOptions, IndexMediaArgs, Job, ReindexAllArgs};
use vista_core::JobError;

use super::{parse_args, store_failure, JobHandler};
use crate::state::PipelineState;

const PAGE_SIZE: i64 = 500;

/// `reindex_all`: enqueue `index_media` for every media record, rebuilding
/// the search index from the relational store.
pub struct ReindexWorker;

#[async_trait]
impl JobHandler for ReindexWorker {
    #[tracing::instrument(skip(self, job, state), fields(job.id = %job.id))]
    async fn process(
        &self,
        job: &Job,
        state: &PipelineState,
    ) -> Result<Option<serde_json::Value>, JobError> {
        let _args: ReindexAllArgs = parse_args(job)?;

        let mut after: Option<String> = None;
        let mut enqueued = 0usize;

        loop {
            let ids = state
                .media
                .list_ids(after.as_deref(), PAGE_SIZE)
                .await
                .map_err(|e| store_failure(e, "listing media ids"))?;

            for id in &ids {
                state
                    .jobs
                    .enqueue(
                        &IndexMediaArgs {
                            media_id: id.clone(),
                        },
                        EnqueueOptions::default(),
                    )
                    .await
                    .map_err(|e| store_failure(e, "enqueueing index_media"))?;
            }
            enqueued += ids.len();

            if (ids.len() as i64) < PAGE_SIZE {
                break;
            }
            after = ids.last().cloned();
        }

        tracing::info!(enqueued, "Reindex scheduled");
        Ok(None)
    }
}
