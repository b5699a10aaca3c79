//! Read side: job id -> caller-facing status.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use crate::backend::ResultBackend;
use crate::state::JobStatus;

/// Polling and waiting over the result backend.
#[derive(Clone)]
pub struct LifecycleClient {
    backend: Arc<ResultBackend>,
}

impl LifecycleClient {
    pub fn new(backend: Arc<ResultBackend>) -> Self {
        Self { backend }
    }

    /// Current status of `job_id`.
    ///
    /// An id the backend never recorded, or whose result has expired, is
    /// [`JobStatus::NotFound`]; a recorded but unstarted job is
    /// [`JobStatus::Queued`].
    pub async fn status(&self, job_id: &str) -> JobStatus {
        self.backend.latest(job_id).await.into()
    }

    /// Wait until `job_id` settles and return its terminal status.
    ///
    /// Returns immediately with [`JobStatus::NotFound`] for unknown ids.
    pub async fn wait_for_terminal(&self, job_id: &str) -> JobStatus {
        // Subscribe before the first read so no update slips between them.
        let mut updates = self.backend.subscribe();

        let current = self.status(job_id).await;
        if current.is_terminal() || current == JobStatus::NotFound {
            return current;
        }

        loop {
            match updates.recv().await {
                Ok(update) if update.job_id == job_id && update.state.is_terminal() => {
                    return JobStatus::from(Some(update.state));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(job_id = %job_id, skipped, "Status waiter lagged, re-reading");
                    let current = self.status(job_id).await;
                    if current.is_terminal() || current == JobStatus::NotFound {
                        return current;
                    }
                }
                Err(RecvError::Closed) => return self.status(job_id).await,
            }
        }
    }
}
