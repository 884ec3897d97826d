use async_trait::async_trait;
use std::sync::Arc;

use vista_core::models::{Job, JobKind};
use vista_core::JobError;
use vista_worker::JobDispatcher;

use crate::state::PipelineState;
use crate::workers::{
    AnalyzeWorker, EmbedWorker, IndexWorker, JobHandler, ReindexWorker, TextEmbeddingWorker,
};

/// Routes claimed jobs to the stage worker for their kind.
#[derive(Clone)]
pub struct PipelineDispatcher {
    state: Arc<PipelineState>,
}

impl PipelineDispatcher {
    pub fn new(state: Arc<PipelineState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }
}

#[async_trait]
impl JobDispatcher for PipelineDispatcher {
    async fn dispatch(&self, job: &Job) -> Result<Option<serde_json::Value>, JobError> {
        let handler: &dyn JobHandler = match job.kind {
            JobKind::AnalyzeMedia => &AnalyzeWorker,
            JobKind::EmbedMedia => &EmbedWorker,
            JobKind::EmbedText => &TextEmbeddingWorker,
            JobKind::IndexMedia => &IndexWorker,
            JobKind::ReindexAll => &ReindexWorker,
        };
        handler.process(job, &self.state).await
    }
}
