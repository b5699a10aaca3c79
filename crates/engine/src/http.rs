use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::api::EngineApi;
use crate::cache::ModelCache;
use crate::contract::{EngineError, EngineRequest, GenerationEngine};

/// [`GenerationEngine`] backed by a remote inference server.
///
/// Holds the server's model cache behind a mutex so load, adapter setup
/// and generation for one request run without interleaving.
pub struct HttpEngine {
    api: EngineApi,
    cache: Mutex<ModelCache>,
}

impl HttpEngine {
    pub fn new(api: EngineApi) -> Self {
        Self {
            api,
            cache: Mutex::new(ModelCache::new()),
        }
    }

    pub fn api(&self) -> &EngineApi {
        &self.api
    }

    /// Currently loaded base model, if any.
    pub async fn current_model(&self) -> Option<String> {
        self.cache.lock().await.current_model().map(str::to_string)
    }
}

#[async_trait]
impl GenerationEngine for HttpEngine {
    async fn generate(&self, request: &EngineRequest) -> Result<Vec<u8>, EngineError> {
        let mut cache = self.cache.lock().await;

        cache.ensure_loaded(&self.api, &request.model).await?;
        let applied = cache.set_adapters(&self.api, &request.loras).await?;

        tracing::info!(
            model = %request.model,
            adapters = applied.len(),
            references = request.references.len(),
            steps = request.steps,
            "Running generation",
        );
        self.api.generate(request).await
    }
}
