//! Result backend: per-job state history with bounded retention.
//!
//! The worker pushes state snapshots; readers see the latest one.  Every
//! accepted snapshot is also broadcast so waiters can react without
//! polling.  Settled jobs expire `ttl` after they reach a terminal state
//! and then read as unknown.

use std::collections::HashMap;
use std::time::Duration;

use imagen_core::error::CoreError;
use imagen_core::types::JobId;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::state::JobState;

/// Default retention window for settled jobs.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(3600);

/// Default interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Buffer capacity for the update channel.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// A state snapshot accepted by the backend.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub job_id: JobId,
    pub state: JobState,
}

#[derive(Debug)]
struct JobRecord {
    history: Vec<JobState>,
    settled_at: Option<Instant>,
}

impl JobRecord {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.settled_at.is_some_and(|at| at.elapsed() >= ttl)
    }
}

/// In-memory result store shared by the broker, the worker and readers.
pub struct ResultBackend {
    records: RwLock<HashMap<JobId, JobRecord>>,
    ttl: Duration,
    updates: broadcast::Sender<JobUpdate>,
}

impl Default for ResultBackend {
    fn default() -> Self {
        Self::new(DEFAULT_RESULT_TTL)
    }
}

impl ResultBackend {
    pub fn new(ttl: Duration) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            records: RwLock::new(HashMap::new()),
            ttl,
            updates,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Append a state snapshot for `job_id`.
    ///
    /// A job's history must start with `QUEUED` and follow the state
    /// machine; anything else is a [`CoreError::Conflict`].
    pub async fn publish(&self, job_id: &str, state: JobState) -> Result<(), CoreError> {
        {
            let mut records = self.records.write().await;

            if records.get(job_id).is_some_and(|r| r.is_expired(self.ttl)) {
                records.remove(job_id);
            }

            match records.get_mut(job_id) {
                None if state == JobState::Queued => {
                    records.insert(
                        job_id.to_string(),
                        JobRecord {
                            history: vec![JobState::Queued],
                            settled_at: None,
                        },
                    );
                }
                None => {
                    return Err(CoreError::Conflict(format!(
                        "Job {job_id} has no recorded state; cannot move to {}",
                        state.label()
                    )));
                }
                Some(record) => {
                    if let Some(current) = record.history.last() {
                        if !current.can_transition_to(&state) {
                            return Err(CoreError::Conflict(format!(
                                "Job {job_id} cannot move from {} to {}",
                                current.label(),
                                state.label()
                            )));
                        }
                    }
                    if state.is_terminal() {
                        record.settled_at = Some(Instant::now());
                    }
                    record.history.push(state.clone());
                }
            }
        }

        tracing::debug!(job_id = %job_id, state = state.label(), "Job state recorded");
        // No subscribers is fine.
        let _ = self.updates.send(JobUpdate {
            job_id: job_id.to_string(),
            state,
        });
        Ok(())
    }

    /// Latest state, or `None` for unknown or expired jobs.
    pub async fn latest(&self, job_id: &str) -> Option<JobState> {
        let records = self.records.read().await;
        records
            .get(job_id)
            .filter(|r| !r.is_expired(self.ttl))
            .and_then(|r| r.history.last().cloned())
    }

    /// Full state history, oldest first.  Empty for unknown or expired jobs.
    pub async fn history(&self, job_id: &str) -> Vec<JobState> {
        let records = self.records.read().await;
        records
            .get(job_id)
            .filter(|r| !r.is_expired(self.ttl))
            .map(|r| r.history.clone())
            .unwrap_or_default()
    }

    /// Drop every expired record, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !r.is_expired(self.ttl));
        before - records.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobUpdate> {
        self.updates.subscribe()
    }

    /// Periodically purge expired records until cancelled.
    pub async fn run_sweeper(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            ttl_secs = self.ttl.as_secs(),
            "Result sweeper started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Result sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let purged = self.purge_expired().await;
                    if purged > 0 {
                        tracing::info!(purged, "Expired job results purged");
                    }
                }
            }
        }
    }
}
