//! Generation request parameters.
//!
//! These travel inside the job payload and are echoed back verbatim as
//! result metadata, so every field round-trips through serde.

use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::error::CoreError;
use crate::references::ReferenceRequest;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default denoising step count.
pub const DEFAULT_STEPS: u32 = 30;

/// Default classifier-free guidance scale.
pub const DEFAULT_GUIDANCE_SCALE: f32 = 7.5;

/// Default LoRA weight when a request names an adapter without one.
pub const DEFAULT_LORA_WEIGHT: f32 = 0.8;

/// Output edge length requested from the engine.
pub const OUTPUT_IMAGE_SIZE: u32 = 1024;

const MAX_STEPS: u32 = 150;
const MAX_GUIDANCE_SCALE: f32 = 30.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A LoRA adapter and the weight to apply it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraWeight {
    pub name: String,
    #[serde(default = "default_lora_weight")]
    pub weight: f32,
}

impl LoraWeight {
    pub fn new(name: impl Into<String>, weight: f32) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

/// Parameters of one generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub loras: Vec<LoraWeight>,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Strength of the legacy single reference image; 0 disables it.
    #[serde(default)]
    pub ip_strength: f32,
    #[serde(default)]
    pub references: Vec<ReferenceRequest>,
}

impl GenerationParams {
    /// Parameters with every optional field at its default.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            model: default_model(),
            loras: Vec::new(),
            steps: DEFAULT_STEPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            seed: None,
            ip_strength: 0.0,
            references: Vec::new(),
        }
    }

    /// The request's negative prompt, or the model's catalog default.
    pub fn effective_negative_prompt(&self) -> String {
        match self.negative_prompt.as_deref() {
            Some(neg) if !neg.trim().is_empty() => neg.to_string(),
            _ => catalog::default_negative_prompt(&self.model).to_string(),
        }
    }

    /// Reject parameters the worker can never satisfy.
    ///
    /// Checked at submission so that malformed jobs never occupy a queue
    /// slot.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation("Prompt must not be empty".into()));
        }
        let Some(model) = catalog::model(&self.model) else {
            return Err(CoreError::Validation(format!(
                "Unknown model '{}'",
                self.model
            )));
        };
        if self.steps == 0 || self.steps > MAX_STEPS {
            return Err(CoreError::Validation(format!(
                "steps must be between 1 and {MAX_STEPS}"
            )));
        }
        if !(0.0..=MAX_GUIDANCE_SCALE).contains(&self.guidance_scale) {
            return Err(CoreError::Validation(format!(
                "guidance_scale must be between 0 and {MAX_GUIDANCE_SCALE}"
            )));
        }
        if !(0.0..=1.0).contains(&self.ip_strength) {
            return Err(CoreError::Validation(
                "ip_strength must be between 0 and 1".into(),
            ));
        }
        if self.ip_strength > 0.0 && !self.references.is_empty() {
            return Err(CoreError::Validation(
                "ip_strength cannot be combined with references".into(),
            ));
        }
        for lora in &self.loras {
            if !model.supports_lora(&lora.name) {
                return Err(CoreError::Validation(format!(
                    "LoRA '{}' is not supported by model '{}'",
                    lora.name, model.id
                )));
            }
        }
        for reference in &self.references {
            if !(0.0..=1.0).contains(&reference.strength) {
                return Err(CoreError::Validation(format!(
                    "Reference strength for '{}' must be between 0 and 1",
                    reference.entity
                )));
            }
            if reference.types.is_empty() {
                return Err(CoreError::Validation(format!(
                    "Reference '{}' must name at least one subtype",
                    reference.entity
                )));
            }
        }
        Ok(())
    }
}

fn default_model() -> String {
    catalog::DEFAULT_MODEL.to_string()
}

fn default_steps() -> u32 {
    DEFAULT_STEPS
}

fn default_guidance_scale() -> f32 {
    DEFAULT_GUIDANCE_SCALE
}

fn default_lora_weight() -> f32 {
    DEFAULT_LORA_WEIGHT
}
