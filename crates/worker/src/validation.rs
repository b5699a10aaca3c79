//! Reference readiness check.
//!
//! Confirms an uploaded image is present and decodes, then sets its
//! validated flag.  Runs on its own queue and never touches the engine.

use async_trait::async_trait;
use imagen_core::error::CoreError;
use imagen_core::imaging::probe_image;
use imagen_core::retry::ExecutionError;
use imagen_queue::job::{Job, QueueName, TaskPayload};
use imagen_queue::state::{TaskOutput, ValidationResult};
use imagen_store::ReferenceStore;

use crate::handler::{ProgressReporter, TaskHandler};

pub struct ValidationHandler {
    store: ReferenceStore,
}

impl ValidationHandler {
    pub fn new(store: ReferenceStore) -> Self {
        Self { store }
    }
}

/// Blocking body of one validation attempt.
///
/// An entity or subtype deleted before the check settles with
/// `validated: false`, the same as one deleted during it.  Every other
/// failure is transient: the image may still be mid-upload.
fn validate(store: &ReferenceStore, entity: &str, subtype: &str) -> Result<bool, ExecutionError> {
    let path = match store.image_path(entity, subtype) {
        Ok(path) => path,
        Err(CoreError::NotFound { .. }) => {
            tracing::debug!(entity = %entity, subtype = %subtype, "Reference image deleted before validation");
            return Ok(false);
        }
        Err(e) => return Err(ExecutionError::Transient(e.to_string())),
    };

    let (width, height) = probe_image(&path).map_err(|e| {
        ExecutionError::Transient(format!("Reference image {} unreadable: {e}", path.display()))
    })?;
    tracing::debug!(entity = %entity, subtype = %subtype, width, height, "Reference image decoded");

    store
        .mark_validated(entity, subtype)
        .map_err(|e| ExecutionError::Transient(e.to_string()))
}

#[async_trait]
impl TaskHandler for ValidationHandler {
    fn queue(&self) -> QueueName {
        QueueName::Validation
    }

    async fn execute(
        &self,
        job: &Job,
        _progress: &ProgressReporter,
    ) -> Result<TaskOutput, ExecutionError> {
        let TaskPayload::ValidateReference { entity, subtype } = &job.payload else {
            return Err(ExecutionError::Permanent(
                "Validation queue received a non-validation payload".into(),
            ));
        };

        let store = self.store.clone();
        let (e, s) = (entity.clone(), subtype.clone());
        let validated = tokio::task::spawn_blocking(move || validate(&store, &e, &s))
            .await
            .map_err(|e| ExecutionError::Transient(format!("Validation task failed: {e}")))??;

        Ok(TaskOutput::Validation(ValidationResult {
            status: "success".into(),
            entity: entity.clone(),
            subtype: subtype.clone(),
            validated,
        }))
    }
}
