use async_trait::async_trait;

use crate::error::InferenceError;

/// Image embedding model.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Side length of the square input the model expects.
    fn input_size(&self) -> u32;

    /// Embed a `3 x input_size x input_size` CHW tensor with values in `[-1, 1]`.
    async fn embed_image(&self, pixels: &[f32]) -> Result<Vec<f32>, InferenceError>;
}

/// Text embedding model sharing the vision model's vector space.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferenceError>;
}
