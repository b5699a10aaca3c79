//! JSON-lines command console.
//!
//! Each input line is one command object tagged by `op`; each produces one
//! JSON response line.  Failures use the envelope
//! `{"error": {"code", "message", "retryable"}}`.

use std::path::PathBuf;
use std::sync::Arc;

use imagen_core::catalog;
use imagen_core::error::CoreError;
use imagen_core::params::GenerationParams;
use imagen_core::references::ReferenceCategory;
use imagen_queue::client::LifecycleClient;
use imagen_queue::submit::Submitter;
use imagen_store::{ReferenceStore, StoreError};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// One console command.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Generate(GenerationParams),
    Status {
        job_id: String,
    },
    /// Block until the job settles.
    Wait {
        job_id: String,
    },
    CreateEntity {
        name: String,
        category: String,
        #[serde(default)]
        description: Option<String>,
    },
    /// Upload the image file at `path`.
    UploadImage {
        entity: String,
        subtype: String,
        path: PathBuf,
    },
    DeleteEntity {
        name: String,
    },
    DeleteImage {
        entity: String,
        subtype: String,
    },
    ListEntities {
        #[serde(default)]
        category: Option<String>,
    },
    GetEntity {
        name: String,
    },
    ListModels,
}

/// Error envelope for a failed command.
pub fn error_envelope(err: &CoreError) -> Value {
    json!({
        "error": {
            "code": err.code(),
            "message": err.to_string(),
            "retryable": err.is_retryable(),
        }
    })
}

#[derive(Clone)]
pub struct Console {
    submitter: Arc<Submitter>,
    client: LifecycleClient,
    store: ReferenceStore,
}

impl Console {
    pub fn new(submitter: Arc<Submitter>, client: LifecycleClient, store: ReferenceStore) -> Self {
        Self {
            submitter,
            client,
            store,
        }
    }

    /// Read commands from `input` until `cancel` fires.
    ///
    /// Each command runs in its own task, so a long `wait` neither blocks
    /// later commands nor shutdown.  Responses go to `output` in completion
    /// order.  End of input stops reading but keeps serving in-flight
    /// commands; commands still running at cancellation are aborted.
    pub async fn serve<R>(
        &self,
        input: R,
        output: mpsc::Sender<Value>,
        cancel: CancellationToken,
    ) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut tasks = JoinSet::new();
        let mut input_open = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                line = lines.next_line(), if input_open => match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        let console = self.clone();
                        let output = output.clone();
                        tasks.spawn(async move {
                            let response = console.handle_line(&line).await;
                            // Receiver gone means we are shutting down.
                            let _ = output.send(response).await;
                        });
                    }
                    None => {
                        tracing::info!("Command input closed; running until shutdown");
                        input_open = false;
                    }
                },
            }
        }

        tasks.shutdown().await;
        Ok(())
    }

    /// Parse and run one input line, always producing a response.
    pub async fn handle_line(&self, line: &str) -> Value {
        let command: Command = match serde_json::from_str(line) {
            Ok(c) => c,
            Err(e) => {
                return error_envelope(&CoreError::Validation(format!("Malformed command: {e}")))
            }
        };

        match self.dispatch(command).await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(code = e.code(), error = %e, "Command failed");
                error_envelope(&e)
            }
        }
    }

    pub async fn dispatch(&self, command: Command) -> Result<Value, CoreError> {
        match command {
            Command::Generate(params) => {
                let submission = self.submitter.submit_generation(params).await?;
                Ok(json!(submission))
            }
            Command::Status { job_id } => {
                let status = self.client.status(&job_id).await;
                Ok(json!({ "job_id": job_id, "status": status }))
            }
            Command::Wait { job_id } => {
                let status = self.client.wait_for_terminal(&job_id).await;
                Ok(json!({ "job_id": job_id, "status": status }))
            }
            Command::CreateEntity {
                name,
                category,
                description,
            } => {
                let entity = self
                    .blocking(move |store| {
                        store.create_entity(&name, &category, description.as_deref())
                    })
                    .await?;
                Ok(json!(entity))
            }
            Command::UploadImage {
                entity,
                subtype,
                path,
            } => self.upload(entity, subtype, path).await,
            Command::DeleteEntity { name } => {
                let images_removed = self.blocking(move |store| store.delete_entity(&name)).await?;
                Ok(json!({ "images_removed": images_removed }))
            }
            Command::DeleteImage { entity, subtype } => {
                self.blocking(move |store| store.delete_image(&entity, &subtype))
                    .await?;
                Ok(json!({ "deleted": true }))
            }
            Command::ListEntities { category } => {
                let category = category
                    .as_deref()
                    .map(str::parse::<ReferenceCategory>)
                    .transpose()?;
                let entities = self
                    .blocking(move |store| Ok(store.list_entities(category)))
                    .await?;
                Ok(json!({ "entities": entities }))
            }
            Command::GetEntity { name } => {
                let entity = self
                    .blocking({
                        let name = name.clone();
                        move |store: &ReferenceStore| Ok(store.get_entity(&name))
                    })
                    .await?
                    .ok_or_else(|| CoreError::not_found("Entity", name))?;
                Ok(json!(entity))
            }
            Command::ListModels => Ok(json!({
                "default": catalog::DEFAULT_MODEL,
                "models": catalog::models(),
                "loras": catalog::loras(),
            })),
        }
    }

    async fn upload(&self, entity: String, subtype: String, path: PathBuf) -> Result<Value, CoreError> {
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::not_found("File", path.display().to_string()),
            _ => CoreError::Internal(format!("Failed to read {}: {e}", path.display())),
        })?;
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let image = self
            .blocking({
                let (entity, subtype) = (entity.clone(), subtype.clone());
                move |store: &ReferenceStore| {
                    store.upload_image(&entity, &subtype, &bytes, &original_name)
                }
            })
            .await?;

        let validation_job_id = self.submitter.submit_validation(&entity, &subtype).await?;
        Ok(json!({ "image": image, "validation_job_id": validation_job_id }))
    }

    /// Run a store operation on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, CoreError>
    where
        T: Send + 'static,
        F: FnOnce(&ReferenceStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| CoreError::Internal(format!("Store task failed: {e}")))?
            .map_err(StoreError::into_core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_by_op() {
        let cmd: Command =
            serde_json::from_str(r#"{"op": "generate", "prompt": "a fox", "steps": 20}"#).unwrap();
        match cmd {
            Command::Generate(p) => {
                assert_eq!(p.prompt, "a fox");
                assert_eq!(p.steps, 20);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cmd: Command = serde_json::from_str(r#"{"op": "list_models"}"#).unwrap();
        assert!(matches!(cmd, Command::ListModels));
    }

    #[test]
    fn envelope_carries_code_and_retryability() {
        let env = error_envelope(&CoreError::Capacity {
            pending: 100,
            limit: 100,
        });
        assert_eq!(env["error"]["code"], "QUEUE_FULL");
        assert_eq!(env["error"]["retryable"], true);
    }
}
