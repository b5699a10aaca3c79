//! Submission side: admission control and enqueueing.

use std::sync::Arc;

use async_trait::async_trait;
use imagen_core::admission::{admit, AdmissionDecision, WorkerTasks, DEFAULT_MAX_QUEUE_SIZE};
use imagen_core::error::CoreError;
use imagen_core::params::GenerationParams;
use imagen_core::types::JobId;
use serde::Serialize;

use crate::broker::Broker;
use crate::job::{Job, TaskPayload};

/// Read-only view of the broker's per-worker task lists.
#[async_trait]
pub trait QueueInspector: Send + Sync {
    /// Worker -> ids of jobs currently executing.
    async fn active(&self) -> Result<WorkerTasks, CoreError>;

    /// Worker -> ids of jobs accepted but not yet executing.
    async fn scheduled(&self) -> Result<WorkerTasks, CoreError>;
}

// ---------------------------------------------------------------------------
// AdmissionController
// ---------------------------------------------------------------------------

/// Rejects new generation work once the backlog reaches the ceiling.
///
/// Introspection failures fail closed with a retryable
/// [`CoreError::Unavailable`].
pub struct AdmissionController {
    inspector: Arc<dyn QueueInspector>,
    max_queue_size: usize,
}

impl AdmissionController {
    pub fn new(inspector: Arc<dyn QueueInspector>, max_queue_size: usize) -> Self {
        Self {
            inspector,
            max_queue_size,
        }
    }

    pub fn with_default_limit(inspector: Arc<dyn QueueInspector>) -> Self {
        Self::new(inspector, DEFAULT_MAX_QUEUE_SIZE)
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Return the estimated queue position for one more job.
    pub async fn check(&self) -> Result<usize, CoreError> {
        let active = self.inspector.active().await.map_err(fail_closed)?;
        let scheduled = self.inspector.scheduled().await.map_err(fail_closed)?;

        match admit(&active, &scheduled, self.max_queue_size) {
            AdmissionDecision::Accept { position } => Ok(position),
            AdmissionDecision::Reject { pending, limit } => {
                tracing::warn!(pending, limit, "Generation queue saturated, rejecting job");
                Err(CoreError::Capacity { pending, limit })
            }
        }
    }
}

fn fail_closed(err: CoreError) -> CoreError {
    tracing::error!(error = %err, "Queue introspection failed");
    match err {
        CoreError::Unavailable(_) => err,
        other => CoreError::Unavailable(format!("Queue introspection failed: {other}")),
    }
}

// ---------------------------------------------------------------------------
// Submitter
// ---------------------------------------------------------------------------

/// Accepted generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub job_id: JobId,
    /// Estimated 1-based position at admission time.
    pub position: usize,
}

/// Producer-facing entry point.
pub struct Submitter {
    broker: Arc<Broker>,
    admission: AdmissionController,
}

impl Submitter {
    pub fn new(broker: Arc<Broker>, admission: AdmissionController) -> Self {
        Self { broker, admission }
    }

    /// Validate, admit and enqueue a generation job.
    pub async fn submit_generation(
        &self,
        params: GenerationParams,
    ) -> Result<Submission, CoreError> {
        params.validate()?;
        let position = self.admission.check().await?;

        let job_id = self
            .broker
            .enqueue(Job::new(TaskPayload::Generate(params)))
            .await?;

        tracing::info!(job_id = %job_id, position, "Generation job accepted");
        Ok(Submission { job_id, position })
    }

    /// Enqueue a readiness check for an uploaded reference image.
    ///
    /// Not subject to admission control.
    pub async fn submit_validation(
        &self,
        entity: &str,
        subtype: &str,
    ) -> Result<JobId, CoreError> {
        self.broker
            .enqueue(Job::new(TaskPayload::ValidateReference {
                entity: entity.to_string(),
                subtype: subtype.to_string(),
            }))
            .await
    }
}
