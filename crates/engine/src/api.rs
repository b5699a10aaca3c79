//! REST client for the inference server.
//!
//! Wraps the server's model management and generation endpoints using
//! [`reqwest`].

use async_trait::async_trait;
use imagen_core::catalog::{LoraSpec, ModelSpec};
use imagen_core::params::LoraWeight;
use serde::Serialize;

use crate::cache::ModelBackend;
use crate::contract::{EngineError, EngineReference, EngineRequest};

/// HTTP client for a single inference server.
#[derive(Clone)]
pub struct EngineApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body of `POST /generate`.
#[derive(Debug, Serialize)]
struct GeneratePayload<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    steps: u32,
    guidance_scale: f32,
    seed: Option<u64>,
    width: u32,
    height: u32,
    references: &'a [EngineReference],
    reference_strength: Option<f32>,
}

impl<'a> From<&'a EngineRequest> for GeneratePayload<'a> {
    fn from(req: &'a EngineRequest) -> Self {
        Self {
            prompt: &req.prompt,
            negative_prompt: &req.negative_prompt,
            steps: req.steps,
            guidance_scale: req.guidance_scale,
            seed: req.seed,
            width: req.width,
            height: req.height,
            references: &req.references,
            reference_strength: req.reference_strength(),
        }
    }
}

impl EngineApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://host:7860`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// `GET /health`; succeeds once the server accepts work.
    pub async fn health(&self) -> Result<(), EngineError> {
        let response = self
            .client
            .get(format!("{}/health", self.api_url))
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// `POST /generate`; returns the encoded image.
    pub async fn generate(&self, request: &EngineRequest) -> Result<Vec<u8>, EngineError> {
        let response = self
            .client
            .post(format!("{}/generate", self.api_url))
            .json(&GeneratePayload::from(request))
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<(), EngineError> {
        let response = self
            .client
            .post(format!("{}{path}", self.api_url))
            .json(&body)
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// Map non-2xx responses to [`EngineError::Api`] with the body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), EngineError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ModelBackend for EngineApi {
    async fn load_model(&self, model: &ModelSpec) -> Result<(), EngineError> {
        self.post_json(
            "/models/load",
            serde_json::json!({
                "id": model.id,
                "source": model.source,
                "checkpoint": model.checkpoint,
                "vae": model.vae,
            }),
        )
        .await
    }

    async fn load_adapter(&self, lora: &LoraSpec) -> Result<(), EngineError> {
        self.post_json(
            "/adapters/load",
            serde_json::json!({
                "id": lora.id,
                "source": lora.source,
            }),
        )
        .await
    }

    async fn activate_adapters(&self, adapters: &[LoraWeight]) -> Result<(), EngineError> {
        self.post_json(
            "/adapters/activate",
            serde_json::json!({ "adapters": adapters }),
        )
        .await
    }

    async fn unload_adapters(&self) -> Result<(), EngineError> {
        self.post_json("/adapters/unload", serde_json::json!({})).await
    }
}
