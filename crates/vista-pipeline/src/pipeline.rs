//! Caller-facing entry points of the pipeline.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vista_core::constants::VISION_SPACE;
use vista_core::models::{
    AnalyzeMediaArgs, EnqueueOptions, Job, Media, ReindexAllArgs, TextEmbedding,
};
use vista_core::StoreResult;

use crate::bridge::{BridgeConfig, EmbeddingBridge, EmbeddingRequestError};
use crate::hooks::{MediaEditor, SearchIndexHook};
use crate::ranker::SimilarityRanker;
use crate::state::PipelineState;

/// Facade over the job client, the embedding bridge, the ranker and the
/// media editor, all sharing one [`PipelineState`].
#[derive(Clone)]
pub struct Pipeline {
    state: Arc<PipelineState>,
    bridge: EmbeddingBridge,
    ranker: SimilarityRanker,
    editor: MediaEditor,
}

impl Pipeline {
    pub fn new(state: Arc<PipelineState>, bridge: BridgeConfig) -> Self {
        let ranker = SimilarityRanker::new(state.media.clone(), state.vectors.clone());
        let editor = MediaEditor::new(state.media.clone(), state.jobs.clone())
            .with_hook(Arc::new(SearchIndexHook::new(state.reconciler.clone())));
        let bridge = EmbeddingBridge::new(state.jobs.clone(), bridge);

        Self {
            state,
            bridge,
            ranker,
            editor,
        }
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    /// Tag, date and deletion edits, kept consistent with the search index.
    pub fn editor(&self) -> &MediaEditor {
        &self.editor
    }

    pub fn ranker(&self) -> &SimilarityRanker {
        &self.ranker
    }

    /// Queue analysis of an object of the media bucket.
    pub async fn enqueue_analyze(&self, key: &str, content_type: &str) -> StoreResult<Job> {
        let args = AnalyzeMediaArgs {
            key: key.to_string(),
            content_type: content_type.to_string(),
        };
        self.state.jobs.enqueue(&args, EnqueueOptions::default()).await
    }

    pub async fn request_text_embedding(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<TextEmbedding, EmbeddingRequestError> {
        self.bridge.request_text_embedding(text, cancel).await
    }

    pub async fn rank_by_similarity(
        &self,
        space: &str,
        vector: &[f32],
        limit: i64,
        exclude_id: Option<&str>,
    ) -> StoreResult<Vec<Media>> {
        self.ranker
            .rank_by_similarity(space, vector, limit, exclude_id)
            .await
    }

    /// Media visually closest to `media_id`.
    pub async fn similar_to(&self, media_id: &str, limit: i64) -> StoreResult<Vec<Media>> {
        self.ranker.similar_to(media_id, VISION_SPACE, limit).await
    }

    /// Full-text search over tags, dates, kinds and formats, best match first.
    pub async fn search_text(&self, expression: &str, limit: i64) -> StoreResult<Vec<Media>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let ids = self.state.search.query(expression, limit).await?;
        self.ranker.fetch_in_order(&ids).await
    }

    /// Embed `text` and rank media of the vision space against it.
    pub async fn semantic_search(
        &self,
        text: &str,
        limit: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Media>, EmbeddingRequestError> {
        let embedding = self.bridge.request_text_embedding(text, cancel).await?;
        let media = self
            .ranker
            .rank_by_similarity(&embedding.space, &embedding.vector, limit, None)
            .await?;
        Ok(media)
    }

    /// Queue a rebuild of the whole search index.
    pub async fn reindex_all(&self) -> StoreResult<Job> {
        self.state
            .jobs
            .enqueue(&ReindexAllArgs {}, EnqueueOptions::default())
            .await
    }

    pub async fn job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        self.state.jobs.get(id).await
    }
}
