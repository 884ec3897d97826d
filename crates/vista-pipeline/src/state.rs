//! Shared pipeline state handed to every stage worker.

use std::sync::Arc;

use vista_core::constants::PREVIEW_OFFSET_SECS;
use vista_core::Config;
use vista_db::{MediaStore, SearchIndex, SearchReconciler, VectorStore};
use vista_inference::InferenceRuntime;
use vista_processing::Prober;
use vista_storage::Storage;
use vista_worker::JobClient;

/// Bucket layout and tool knobs used by the stages.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Bucket holding the original uploads.
    pub media_bucket: String,
    /// Bucket holding extracted video previews, keyed like the source object.
    pub preview_bucket: String,
    pub preview_offset_secs: f64,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            media_bucket: config.media_bucket().to_string(),
            preview_bucket: config.preview_bucket().to_string(),
            preview_offset_secs: config.preview_offset_secs(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            media_bucket: "media".to_string(),
            preview_bucket: "previews".to_string(),
            preview_offset_secs: PREVIEW_OFFSET_SECS,
        }
    }
}

/// Everything a stage needs: stores, object storage, tools and models.
///
/// `inference` is only present in processes that host the embedding queue.
#[derive(Clone)]
pub struct PipelineState {
    pub media: Arc<dyn MediaStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub search: Arc<dyn SearchIndex>,
    /// Serialized per media id; every index update goes through it.
    pub reconciler: Arc<dyn SearchReconciler>,
    pub jobs: JobClient,
    pub storage: Arc<dyn Storage>,
    pub prober: Arc<dyn Prober>,
    pub inference: Option<Arc<InferenceRuntime>>,
    pub settings: PipelineSettings,
}
