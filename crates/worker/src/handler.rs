//! The seam between the runner and the work itself.

use std::sync::Arc;

use async_trait::async_trait;
use imagen_core::progress::JobPhase;
use imagen_core::retry::ExecutionError;
use imagen_core::types::JobId;
use imagen_queue::backend::ResultBackend;
use imagen_queue::job::{Job, QueueName};
use imagen_queue::state::{JobState, TaskOutput};

/// Executes one kind of job.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Queue this handler consumes.
    fn queue(&self) -> QueueName;

    /// Run one attempt of `job`.
    ///
    /// Errors must be classified: permanent ones settle the job at once,
    /// transient ones go through the queue's retry policy.
    async fn execute(
        &self,
        job: &Job,
        progress: &ProgressReporter,
    ) -> Result<TaskOutput, ExecutionError>;
}

/// Publishes `PROGRESS` snapshots for the job being executed.
pub struct ProgressReporter {
    backend: Arc<ResultBackend>,
    job_id: JobId,
}

impl ProgressReporter {
    pub fn new(backend: Arc<ResultBackend>, job_id: JobId) -> Self {
        Self { backend, job_id }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Record that the job entered `phase`.  A rejected snapshot is logged,
    /// never fatal to the job.
    pub async fn report(&self, phase: JobPhase) {
        if let Err(e) = self
            .backend
            .publish(&self.job_id, JobState::progress(phase))
            .await
        {
            tracing::warn!(job_id = %self.job_id, error = %e, "Progress update rejected");
        }
    }
}
