//! Generation job handler.
//!
//! One attempt runs: resolve references, build the prompt, call the
//! engine, write the artifact.  Reference problems are permanent; engine
//! and filesystem failures are transient.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use imagen_core::catalog;
use imagen_core::naming::{artifact_filename, public_url, short_suffix};
use imagen_core::params::{GenerationParams, OUTPUT_IMAGE_SIZE};
use imagen_core::progress::JobPhase;
use imagen_core::prompt::{apply_background_hint, merge_trigger_words};
use imagen_core::references::ReferenceCategory;
use imagen_core::retry::ExecutionError;
use imagen_engine::{EngineReference, EngineRequest, GenerationEngine};
use imagen_queue::job::{Job, QueueName, TaskPayload};
use imagen_queue::state::{GenerationMetadata, GenerationResult, ReferenceEcho, TaskOutput};
use imagen_store::{ReferenceStore, ResolvedReference};

use crate::handler::{ProgressReporter, TaskHandler};

pub struct GenerationHandler {
    store: ReferenceStore,
    engine: Arc<dyn GenerationEngine>,
    data_dir: PathBuf,
    outputs_dir: PathBuf,
    legacy_reference: Option<PathBuf>,
}

impl GenerationHandler {
    pub fn new(
        store: ReferenceStore,
        engine: Arc<dyn GenerationEngine>,
        data_dir: impl Into<PathBuf>,
        outputs_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            engine,
            data_dir: data_dir.into(),
            outputs_dir: outputs_dir.into(),
            legacy_reference: None,
        }
    }

    /// Image used for jobs that set `ip_strength` without references.
    pub fn with_legacy_reference(mut self, path: impl Into<PathBuf>) -> Self {
        self.legacy_reference = Some(path.into());
        self
    }

    async fn resolve(&self, params: &GenerationParams) -> Result<Vec<ResolvedReference>, ExecutionError> {
        if params.references.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.store.clone();
        let requests = params.references.clone();
        tokio::task::spawn_blocking(move || store.resolve_references(&requests))
            .await
            .map_err(|e| ExecutionError::Transient(format!("Reference resolution task failed: {e}")))?
            .map_err(|e| ExecutionError::Permanent(e.to_string()))
    }

    async fn legacy_reference(&self, strength: f32) -> Option<EngineReference> {
        let path = self.legacy_reference.as_ref()?;
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Some(EngineReference {
                path: path.clone(),
                strength,
            })
        } else {
            tracing::warn!(path = %path.display(), "Legacy reference image missing, generating without it");
            None
        }
    }

    /// Assemble the engine request from the job parameters and resolved
    /// references.
    async fn build_request(
        &self,
        params: &GenerationParams,
        resolved: &[ResolvedReference],
    ) -> EngineRequest {
        let triggers = catalog::trigger_words(&params.loras);
        let mut prompt = merge_trigger_words(&params.prompt, &triggers);
        let mut negative_prompt = params.effective_negative_prompt();

        if resolved.iter().any(|r| r.category == ReferenceCategory::Character) {
            (prompt, negative_prompt) = apply_background_hint(&prompt, &negative_prompt);
        }

        let mut references: Vec<EngineReference> = resolved
            .iter()
            .map(|r| EngineReference {
                path: r.path.clone(),
                strength: r.strength,
            })
            .collect();
        if references.is_empty() && params.ip_strength > 0.0 {
            references.extend(self.legacy_reference(params.ip_strength).await);
        }

        EngineRequest {
            prompt,
            negative_prompt,
            model: params.model.clone(),
            loras: params.loras.clone(),
            steps: params.steps,
            guidance_scale: params.guidance_scale,
            seed: params.seed,
            width: OUTPUT_IMAGE_SIZE,
            height: OUTPUT_IMAGE_SIZE,
            references,
        }
    }

    async fn save(&self, model: &str, bytes: &[u8]) -> Result<(String, PathBuf), ExecutionError> {
        tokio::fs::create_dir_all(&self.outputs_dir)
            .await
            .map_err(|e| io_failure(&self.outputs_dir, e))?;

        let filename = artifact_filename(model, &chrono::Utc::now(), &short_suffix());
        let path = self.outputs_dir.join(&filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_failure(&path, e))?;
        Ok((filename, path))
    }

    fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.data_dir)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

fn io_failure(path: &Path, e: std::io::Error) -> ExecutionError {
    ExecutionError::Transient(format!("I/O error at {}: {e}", path.display()))
}

#[async_trait]
impl TaskHandler for GenerationHandler {
    fn queue(&self) -> QueueName {
        QueueName::Generation
    }

    async fn execute(
        &self,
        job: &Job,
        progress: &ProgressReporter,
    ) -> Result<TaskOutput, ExecutionError> {
        let TaskPayload::Generate(params) = &job.payload else {
            return Err(ExecutionError::Permanent(
                "Generation queue received a non-generation payload".into(),
            ));
        };

        progress.report(JobPhase::Initialisation).await;
        let resolved = self.resolve(params).await?;
        let request = self.build_request(params, &resolved).await;

        progress.report(JobPhase::Generation).await;
        let bytes = self
            .engine
            .generate(&request)
            .await
            .map_err(|e| ExecutionError::Transient(format!("Generation engine failed: {e}")))?;

        progress.report(JobPhase::Saving).await;
        let (filename, path) = self.save(&params.model, &bytes).await?;
        progress.report(JobPhase::Done).await;

        tracing::info!(
            job_id = %job.id,
            filename = %filename,
            references = request.references.len(),
            "Image generated",
        );

        Ok(TaskOutput::Generation(GenerationResult {
            status: "success".into(),
            url: public_url(&filename),
            path: self.relative_path(&path),
            filename,
            metadata: GenerationMetadata {
                model: request.model,
                prompt: request.prompt,
                negative_prompt: request.negative_prompt,
                loras: request.loras,
                steps: request.steps,
                guidance_scale: request.guidance_scale,
                seed: request.seed,
                ip_strength: params.ip_strength,
                references: request
                    .references
                    .into_iter()
                    .map(|r| ReferenceEcho {
                        path: r.path,
                        strength: r.strength,
                    })
                    .collect(),
            },
        }))
    }
}
