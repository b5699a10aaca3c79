//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use imagen_core::imaging::encode_png;
use imagen_core::retry::RetryPolicy;
use imagen_engine::{EngineError, EngineRequest, GenerationEngine};
use imagen_queue::backend::ResultBackend;
use imagen_queue::broker::Broker;
use imagen_queue::client::LifecycleClient;
use imagen_queue::submit::{AdmissionController, Submitter};
use imagen_store::ReferenceStore;
use imagen_worker::commands::Console;
use imagen_worker::handler::TaskHandler;
use imagen_worker::runner::WorkerRunner;
use tempfile::TempDir;
use tokio::time::Instant;

pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([30, 160, 90]));
    encode_png(&img).expect("encode sample png")
}

// ---------------------------------------------------------------------------
// Engines
// ---------------------------------------------------------------------------

/// Returns a small PNG and records every request.
#[derive(Default)]
pub struct FakeEngine {
    pub requests: Mutex<Vec<EngineRequest>>,
}

impl FakeEngine {
    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationEngine for FakeEngine {
    async fn generate(&self, request: &EngineRequest) -> Result<Vec<u8>, EngineError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(sample_png(8, 8))
    }
}

/// Always fails, recording when it was called.
#[derive(Default)]
pub struct FailingEngine {
    pub calls: Mutex<Vec<Instant>>,
}

impl FailingEngine {
    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationEngine for FailingEngine {
    async fn generate(&self, _request: &EngineRequest) -> Result<Vec<u8>, EngineError> {
        self.calls.lock().unwrap().push(Instant::now());
        Err(EngineError::Failed("CUDA out of memory".into()))
    }
}

/// Sleeps longer than any test timeout.
pub struct SlowEngine(pub Duration);

#[async_trait]
impl GenerationEngine for SlowEngine {
    async fn generate(&self, _request: &EngineRequest) -> Result<Vec<u8>, EngineError> {
        tokio::time::sleep(self.0).await;
        Ok(sample_png(8, 8))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A broker, store and client rooted in a temporary data directory.
pub struct Harness {
    pub dir: TempDir,
    pub store: ReferenceStore,
    pub broker: Arc<Broker>,
    pub submitter: Arc<Submitter>,
    pub client: LifecycleClient,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ReferenceStore::open(dir.path().join("reference")).expect("open store");
        let backend = Arc::new(ResultBackend::default());
        let broker = Arc::new(Broker::new("test-worker", Arc::clone(&backend)));
        let admission = AdmissionController::new(broker.clone(), 100);
        let submitter = Arc::new(Submitter::new(Arc::clone(&broker), admission));
        Self {
            dir,
            store,
            broker,
            submitter,
            client: LifecycleClient::new(backend),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.dir.path().join("outputs")
    }

    pub fn console(&self) -> Console {
        Console::new(
            Arc::clone(&self.submitter),
            self.client.clone(),
            self.store.clone(),
        )
    }

    pub fn runner(&self, handler: Arc<dyn TaskHandler>, policy: RetryPolicy) -> WorkerRunner {
        WorkerRunner::new(Arc::clone(&self.broker), handler, policy)
    }

    /// Character entity `electra` with a `front` image.
    pub fn seed_character(&self) {
        self.store
            .create_entity("electra", "character", Some("Lead character"))
            .unwrap();
        self.store
            .upload_image("electra", "front", &sample_png(200, 100), "electra.png")
            .unwrap();
    }
}
