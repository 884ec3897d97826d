//! Process-wide holder of the loaded models

use std::sync::Arc;
use tokio::sync::RwLock;

use vista_core::Config;

use crate::error::InferenceError;
use crate::model::{TextModel, VisionModel};
use crate::remote::{RemoteModel, RemoteModelConfig};

struct Models {
    vision: Arc<dyn VisionModel>,
    text: Arc<dyn TextModel>,
}

/// Models loaded once per process and shared by every worker.
///
/// After [`InferenceRuntime::shutdown`] the accessors fail with
/// [`InferenceError::NotLoaded`], which workers treat as retryable so jobs
/// drain to a process that still has the models.
pub struct InferenceRuntime {
    models: RwLock<Option<Models>>,
    input_size: u32,
}

impl InferenceRuntime {
    /// Load from configuration: a [`RemoteModel`] at `INFERENCE_ENDPOINT`
    /// serving both the vision and the text model.
    pub async fn load(config: &Config) -> Result<Self, InferenceError> {
        let endpoint = config
            .inference_endpoint()
            .ok_or_else(|| InferenceError::Config("INFERENCE_ENDPOINT is not set".to_string()))?;

        let model = Arc::new(RemoteModel::new(RemoteModelConfig {
            endpoint: endpoint.to_string(),
            timeout: config.inference_timeout(),
            input_size: config.inference_input_size(),
        })?);

        if !model.health_check().await {
            // Jobs retry until the server comes up.
            tracing::warn!(endpoint = %endpoint, "Inference server not healthy at startup");
        }

        Ok(Self::from_models(model.clone(), model))
    }

    pub fn from_models(vision: Arc<dyn VisionModel>, text: Arc<dyn TextModel>) -> Self {
        let input_size = vision.input_size();
        tracing::info!(input_size, "Inference runtime loaded");
        Self {
            models: RwLock::new(Some(Models { vision, text })),
            input_size,
        }
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    pub async fn is_loaded(&self) -> bool {
        self.models.read().await.is_some()
    }

    pub async fn vision(&self) -> Result<Arc<dyn VisionModel>, InferenceError> {
        self.models
            .read()
            .await
            .as_ref()
            .map(|m| m.vision.clone())
            .ok_or(InferenceError::NotLoaded)
    }

    pub async fn text(&self) -> Result<Arc<dyn TextModel>, InferenceError> {
        self.models
            .read()
            .await
            .as_ref()
            .map(|m| m.text.clone())
            .ok_or(InferenceError::NotLoaded)
    }

    /// Release the models. In-flight calls keep their handles until done.
    pub async fn shutdown(&self) {
        if self.models.write().await.take().is_some() {
            tracing::info!("Inference runtime shut down");
        }
    }
}
