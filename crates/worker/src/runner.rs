//! Single-slot job runner.
//!
//! Pulls one job at a time from its queue, enforces the wall-clock limit,
//! and turns the handler's outcome into a terminal state or a delayed
//! retry.  Shutdown is only observed between jobs; a running job is never
//! interrupted.

use std::sync::Arc;
use std::time::Duration;

use imagen_core::retry::{ExecutionError, RetryDecision, RetryPolicy};
use imagen_queue::broker::Broker;
use imagen_queue::job::Job;
use imagen_queue::state::JobState;
use tokio_util::sync::CancellationToken;

use crate::handler::{ProgressReporter, TaskHandler};

/// Default hard limit for one attempt.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);

pub struct WorkerRunner {
    broker: Arc<Broker>,
    handler: Arc<dyn TaskHandler>,
    policy: RetryPolicy,
    job_timeout: Duration,
}

impl WorkerRunner {
    pub fn new(broker: Arc<Broker>, handler: Arc<dyn TaskHandler>, policy: RetryPolicy) -> Self {
        Self {
            broker,
            handler,
            policy,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let queue = self.handler.queue();
        tracing::info!(
            queue = %queue,
            max_retries = self.policy.max_retries,
            timeout_secs = self.job_timeout.as_secs(),
            "Worker runner started",
        );

        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(queue = %queue, "Worker runner shutting down");
                    break;
                }
                job = self.broker.reserve(queue) => job,
            };
            self.process(job).await;
        }
    }

    /// Execute one reserved job and settle or reschedule it.
    pub async fn process(&self, job: Job) {
        let queue = job.queue();
        let backend = Arc::clone(self.broker.backend());
        let reporter = ProgressReporter::new(Arc::clone(&backend), job.id.clone());

        tracing::info!(job_id = %job.id, queue = %queue, attempt = job.retries + 1, "Job started");

        let outcome = match tokio::time::timeout(
            self.job_timeout,
            self.handler.execute(&job, &reporter),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ExecutionError::Transient(format!(
                "Job exceeded the {}s time limit",
                self.job_timeout.as_secs_f32()
            ))),
        };

        match outcome {
            Ok(result) => {
                if let Err(e) = backend.publish(&job.id, JobState::Success { result }).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to record job success");
                }
                self.broker.ack(queue, &job.id).await;
                tracing::info!(job_id = %job.id, queue = %queue, "Job succeeded");
            }
            Err(err) => match self.policy.decide(&err, job.retries) {
                RetryDecision::Retry { attempt, after } => {
                    tracing::warn!(
                        job_id = %job.id,
                        queue = %queue,
                        retry = attempt,
                        max_retries = self.policy.max_retries,
                        error = %err,
                        "Job failed, retrying",
                    );
                    let mut job = job;
                    job.retries = attempt;
                    self.broker.schedule_retry(job, after).await;
                }
                RetryDecision::Settle => {
                    tracing::error!(
                        job_id = %job.id,
                        queue = %queue,
                        code = err.code(),
                        retries = job.retries,
                        error = %err,
                        "Job failed",
                    );
                    let state = JobState::Failure {
                        error: err.to_string(),
                    };
                    if let Err(e) = backend.publish(&job.id, state).await {
                        tracing::error!(job_id = %job.id, error = %e, "Failed to record job failure");
                    }
                    self.broker.ack(queue, &job.id).await;
                }
            },
        }
    }
}
