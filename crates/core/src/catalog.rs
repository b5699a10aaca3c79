//! Static catalog of base models and LoRA adapters known to the engine.

use serde::Serialize;

use crate::params::LoraWeight;

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: &str = "sdxl";

/// Negative prompt used when neither the request nor the model supplies one.
pub const FALLBACK_NEGATIVE_PROMPT: &str = "low quality, blurry, distorted";

/// A base diffusion model.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Hub repository or local path of the weights.
    pub source: &'static str,
    /// Optional single-file checkpoint inside `source`.
    pub checkpoint: Option<&'static str>,
    pub vae: Option<&'static str>,
    pub default_negative_prompt: &'static str,
    /// Empty means every known LoRA is accepted.
    pub supported_loras: &'static [&'static str],
}

/// A LoRA adapter.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LoraSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub source: &'static str,
    pub default_weight: f32,
    pub trigger_words: &'static [&'static str],
}

static MODELS: &[ModelSpec] = &[
    ModelSpec {
        id: "sdxl",
        name: "Stable Diffusion XL",
        description: "General purpose SDXL base model",
        source: "stabilityai/stable-diffusion-xl-base-1.0",
        checkpoint: None,
        vae: Some("madebyollin/sdxl-vae-fp16-fix"),
        default_negative_prompt: "low quality, blurry, distorted, ugly, bad anatomy",
        supported_loras: &[],
    },
    ModelSpec {
        id: "pony",
        name: "Pony Diffusion V6 XL",
        description: "SDXL fine-tune for stylised characters",
        source: "LyliaEngine/Pony_Diffusion_V6_XL",
        checkpoint: Some("ponyDiffusionV6XL_v6StartWithThisOne.safetensors"),
        vae: Some("madebyollin/sdxl-vae-fp16-fix"),
        default_negative_prompt: "low quality, bad anatomy, worst quality, low res",
        supported_loras: &["anime-style", "character-detail", "civitai-618068"],
    },
];

static LORAS: &[LoraSpec] = &[
    LoraSpec {
        id: "anime-style",
        name: "Anime Detailer XL",
        source: "Linaqruf/anime-detailer-xl-lora",
        default_weight: 0.75,
        trigger_words: &["anime style", "detailed"],
    },
    LoraSpec {
        id: "character-detail",
        name: "Character Detail XL",
        source: "Lykon/character-detail-lora-xl",
        default_weight: 0.6,
        trigger_words: &[],
    },
    LoraSpec {
        id: "civitai-618068",
        name: "Civitai 618068",
        source: "./models/loras/civitai/civitai_618068",
        default_weight: 0.8,
        trigger_words: &[],
    },
];

pub fn models() -> &'static [ModelSpec] {
    MODELS
}

pub fn loras() -> &'static [LoraSpec] {
    LORAS
}

pub fn model(id: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().find(|m| m.id == id)
}

pub fn lora(id: &str) -> Option<&'static LoraSpec> {
    LORAS.iter().find(|l| l.id == id)
}

impl ModelSpec {
    pub fn supports_lora(&self, lora_id: &str) -> bool {
        self.supported_loras.is_empty() || self.supported_loras.contains(&lora_id)
    }
}

/// Negative prompt for `model_id` when the request leaves it empty.
pub fn default_negative_prompt(model_id: &str) -> &'static str {
    model(model_id)
        .map(|m| m.default_negative_prompt)
        .unwrap_or(FALLBACK_NEGATIVE_PROMPT)
}

/// Trigger words of the requested LoRAs, in request order.  Unknown LoRAs
/// contribute nothing.
pub fn trigger_words(loras: &[LoraWeight]) -> Vec<&'static str> {
    loras
        .iter()
        .filter_map(|l| lora(&l.name))
        .flat_map(|spec| spec.trigger_words.iter().copied())
        .collect()
}
