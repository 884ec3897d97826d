//! HTTP inference server client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::InferenceError;
use crate::model::{TextModel, VisionModel};

#[derive(Debug, Clone)]
pub struct RemoteModelConfig {
    /// Base URL, e.g. `http://inference:8000`.
    pub endpoint: String,
    pub timeout: Duration,
    pub input_size: u32,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    input_size: u32,
    pixels: &'a [f32],
}

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(alias = "detail")]
    error: String,
}

/// Client for an inference server exposing `POST /embed/image` and
/// `POST /embed/text`.
#[derive(Clone)]
pub struct RemoteModel {
    client: Client,
    endpoint: String,
    input_size: u32,
}

impl RemoteModel {
    pub fn new(config: RemoteModelConfig) -> Result<Self, InferenceError> {
        if config.input_size == 0 {
            return Err(InferenceError::Config("input size must be positive".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InferenceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            endpoint = %config.endpoint,
            input_size = config.input_size,
            "Initializing remote inference model"
        );

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            input_size: config.input_size,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Vec<f32>, InferenceError> {
        let start = std::time::Instant::now();
        let response = self.client.post(self.url(path)).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.text().await {
                Ok(text) => serde_json::from_str::<ErrorResponse>(&text)
                    .map(|e| e.error)
                    .unwrap_or(text),
                Err(e) => e.to_string(),
            };
            tracing::warn!(path = %path, status = status.as_u16(), message = %message, "Inference request rejected");
            return Err(InferenceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbeddingResponse = response.json().await?;
        if body.embedding.is_empty() {
            return Err(InferenceError::InvalidResponse("empty embedding".to_string()));
        }

        tracing::debug!(
            path = %path,
            dimensions = body.embedding.len(),
            duration_ms = start.elapsed().as_millis(),
            "Inference request completed"
        );

        Ok(body.embedding)
    }

    /// `GET /health`; any 2xx answer counts as healthy.
    pub async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.url("/health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "Inference health check failed");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Inference server unreachable");
                false
            }
        }
    }
}

#[async_trait]
impl VisionModel for RemoteModel {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    async fn embed_image(&self, pixels: &[f32]) -> Result<Vec<f32>, InferenceError> {
        let expected = 3 * (self.input_size as usize).pow(2);
        if pixels.len() != expected {
            return Err(InferenceError::InvalidInput(format!(
                "expected {} values, got {}",
                expected,
                pixels.len()
            )));
        }

        self.post(
            "/embed/image",
            &ImageRequest {
                input_size: self.input_size,
                pixels,
            },
        )
        .await
    }
}

#[async_trait]
impl TextModel for RemoteModel {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        if text.trim().is_empty() {
            return Err(InferenceError::InvalidInput("empty text".to_string()));
        }
        self.post("/embed/text", &TextRequest { text }).await
    }
}
