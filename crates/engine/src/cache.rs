//! Tracks which base model and adapters the engine currently holds.
//!
//! The engine can host one base model at a time.  Switching models drops
//! every adapter; loading the model that is already loaded does nothing.
//! [`ModelCache::ensure_loaded`] and [`ModelCache::set_adapters`] are the
//! only mutators, and the cache is only ever used behind the engine's
//! mutex.

use std::collections::HashSet;

use async_trait::async_trait;
use imagen_core::catalog::{self, LoraSpec, ModelSpec};
use imagen_core::params::LoraWeight;

use crate::contract::EngineError;

/// Low-level operations the cache drives on the engine.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn load_model(&self, model: &ModelSpec) -> Result<(), EngineError>;
    async fn load_adapter(&self, lora: &LoraSpec) -> Result<(), EngineError>;
    async fn activate_adapters(&self, adapters: &[LoraWeight]) -> Result<(), EngineError>;
    async fn unload_adapters(&self) -> Result<(), EngineError>;
}

#[derive(Debug, Default)]
pub struct ModelCache {
    current_model: Option<String>,
    loaded_adapters: HashSet<String>,
    active_adapters: Vec<LoraWeight>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_model(&self) -> Option<&str> {
        self.current_model.as_deref()
    }

    pub fn active_adapters(&self) -> &[LoraWeight] {
        &self.active_adapters
    }

    /// Load `model_id` unless it is already loaded.
    ///
    /// Returns `true` when a load actually happened.
    pub async fn ensure_loaded<B>(&mut self, backend: &B, model_id: &str) -> Result<bool, EngineError>
    where
        B: ModelBackend + ?Sized,
    {
        if self.current_model.as_deref() == Some(model_id) {
            return Ok(false);
        }

        let spec =
            catalog::model(model_id).ok_or_else(|| EngineError::UnknownModel(model_id.to_string()))?;

        tracing::info!(model = %model_id, previous = ?self.current_model, "Loading base model");
        // Forget the old state first so a failed load never looks loaded.
        self.current_model = None;
        self.loaded_adapters.clear();
        self.active_adapters.clear();

        backend.load_model(spec).await?;
        self.current_model = Some(model_id.to_string());
        Ok(true)
    }

    /// Make exactly `requested` the active adapter set on the current
    /// model.
    ///
    /// Unknown adapters, adapters the model does not support and adapters
    /// that fail to load are skipped with a warning.  Returns the adapters
    /// actually applied.
    pub async fn set_adapters<B>(
        &mut self,
        backend: &B,
        requested: &[LoraWeight],
    ) -> Result<Vec<LoraWeight>, EngineError>
    where
        B: ModelBackend + ?Sized,
    {
        let Some(model) = self.current_model.as_deref().and_then(catalog::model) else {
            return Err(EngineError::Failed(
                "No base model loaded; cannot set adapters".to_string(),
            ));
        };

        let mut applied = Vec::with_capacity(requested.len());
        for lora in requested {
            let Some(spec) = catalog::lora(&lora.name) else {
                tracing::warn!(lora = %lora.name, "Unknown LoRA, skipping");
                continue;
            };
            if !model.supports_lora(spec.id) {
                tracing::warn!(lora = %lora.name, model = %model.id, "LoRA not supported by model, skipping");
                continue;
            }
            if !self.loaded_adapters.contains(spec.id) {
                if let Err(e) = backend.load_adapter(spec).await {
                    tracing::warn!(lora = %lora.name, error = %e, "LoRA failed to load, skipping");
                    continue;
                }
                self.loaded_adapters.insert(spec.id.to_string());
            }
            applied.push(lora.clone());
        }

        if applied == self.active_adapters {
            return Ok(applied);
        }

        if applied.is_empty() {
            backend.unload_adapters().await?;
        } else {
            backend.activate_adapters(&applied).await?;
        }
        self.active_adapters = applied.clone();
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        broken_adapters: Vec<&'static str>,
    }

    impl RecordingBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ModelBackend for RecordingBackend {
        async fn load_model(&self, model: &ModelSpec) -> Result<(), EngineError> {
            self.record(format!("model:{}", model.id));
            Ok(())
        }

        async fn load_adapter(&self, lora: &LoraSpec) -> Result<(), EngineError> {
            if self.broken_adapters.contains(&lora.id) {
                return Err(EngineError::Failed("weights missing".into()));
            }
            self.record(format!("adapter:{}", lora.id));
            Ok(())
        }

        async fn activate_adapters(&self, adapters: &[LoraWeight]) -> Result<(), EngineError> {
            let names: Vec<&str> = adapters.iter().map(|a| a.name.as_str()).collect();
            self.record(format!("activate:{}", names.join(",")));
            Ok(())
        }

        async fn unload_adapters(&self) -> Result<(), EngineError> {
            self.record("unload".into());
            Ok(())
        }
    }

    // -- ensure_loaded ----------------------------------------------------

    #[tokio::test]
    async fn loading_same_model_twice_is_noop() {
        let backend = RecordingBackend::default();
        let mut cache = ModelCache::new();

        assert!(cache.ensure_loaded(&backend, "sdxl").await.unwrap());
        assert!(!cache.ensure_loaded(&backend, "sdxl").await.unwrap());
        assert_eq!(backend.calls(), vec!["model:sdxl"]);
        assert_eq!(cache.current_model(), Some("sdxl"));
    }

    #[tokio::test]
    async fn unknown_model_is_rejected() {
        let backend = RecordingBackend::default();
        let mut cache = ModelCache::new();
        assert_matches!(
            cache.ensure_loaded(&backend, "midjourney").await,
            Err(EngineError::UnknownModel(_))
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn switching_models_evicts_adapters() {
        let backend = RecordingBackend::default();
        let mut cache = ModelCache::new();
        cache.ensure_loaded(&backend, "pony").await.unwrap();
        cache
            .set_adapters(&backend, &[LoraWeight::new("anime-style", 0.75)])
            .await
            .unwrap();
        assert_eq!(cache.active_adapters().len(), 1);

        cache.ensure_loaded(&backend, "sdxl").await.unwrap();
        assert!(cache.active_adapters().is_empty());

        // Same adapter on the new model must be loaded again.
        cache
            .set_adapters(&backend, &[LoraWeight::new("anime-style", 0.75)])
            .await
            .unwrap();
        let loads = backend
            .calls()
            .iter()
            .filter(|c| *c == "adapter:anime-style")
            .count();
        assert_eq!(loads, 2);
    }

    // -- set_adapters -----------------------------------------------------

    #[tokio::test]
    async fn adapters_load_once_and_skip_bad_ones() {
        let backend = RecordingBackend {
            broken_adapters: vec!["character-detail"],
            ..Default::default()
        };
        let mut cache = ModelCache::new();
        cache.ensure_loaded(&backend, "pony").await.unwrap();

        let requested = vec![
            LoraWeight::new("anime-style", 0.75),
            LoraWeight::new("character-detail", 0.6),
            LoraWeight::new("not-a-lora", 1.0),
        ];
        let applied = cache.set_adapters(&backend, &requested).await.unwrap();
        assert_eq!(applied, vec![LoraWeight::new("anime-style", 0.75)]);

        // Identical request: nothing new reaches the backend.
        let before = backend.calls().len();
        cache.set_adapters(&backend, &requested).await.unwrap();
        assert_eq!(backend.calls().len(), before);
    }

    #[tokio::test]
    async fn clearing_adapters_unloads() {
        let backend = RecordingBackend::default();
        let mut cache = ModelCache::new();
        cache.ensure_loaded(&backend, "sdxl").await.unwrap();
        cache
            .set_adapters(&backend, &[LoraWeight::new("character-detail", 0.6)])
            .await
            .unwrap();
        cache.set_adapters(&backend, &[]).await.unwrap();

        assert_eq!(backend.calls().last().map(String::as_str), Some("unload"));
        assert!(cache.active_adapters().is_empty());
    }

    #[tokio::test]
    async fn adapters_need_a_model() {
        let backend = RecordingBackend::default();
        let mut cache = ModelCache::new();
        assert!(cache.set_adapters(&backend, &[]).await.is_err());
    }
}
