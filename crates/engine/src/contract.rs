//! The call contract between the worker and the generation engine.

use std::path::PathBuf;

use async_trait::async_trait;
use imagen_core::params::LoraWeight;
use serde::Serialize;

/// A reference image and its influence weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineReference {
    pub path: PathBuf,
    pub strength: f32,
}

/// Fully resolved generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
    pub loras: Vec<LoraWeight>,
    pub steps: u32,
    pub guidance_scale: f32,
    pub seed: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub references: Vec<EngineReference>,
}

impl EngineRequest {
    /// Effective style-transfer strength: the mean of all reference
    /// strengths, or `None` without references.
    pub fn reference_strength(&self) -> Option<f32> {
        if self.references.is_empty() {
            return None;
        }
        let sum: f32 = self.references.iter().map(|r| r.strength).sum();
        Some(sum / self.references.len() as f32)
    }
}

/// Errors from the engine.  The worker treats all of them as transient.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("Engine API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Any other engine-side failure, as an opaque message.
    #[error("{0}")]
    Failed(String),
}

/// Produces image bytes from a resolved request.
///
/// Must be deterministic for a fixed seed.  Implementations serialize
/// their own internal state; the worker calls one request at a time.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    async fn generate(&self, request: &EngineRequest) -> Result<Vec<u8>, EngineError>;
}
