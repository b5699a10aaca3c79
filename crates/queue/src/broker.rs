//! In-process broker with one single-slot queue per [`QueueName`].
//!
//! A queue hands its consumer at most one job at a time: [`Broker::reserve`]
//! blocks while a job is active and only returns the next one after the
//! previous is acked or rescheduled.  Retries wait in a delayed set until
//! their eta and are then promoted back to the front of the ready list.
//!
//! For admission purposes everything accepted but not executing (ready or
//! delayed) is reported as "scheduled", keyed by the consumer's name.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use imagen_core::admission::WorkerTasks;
use imagen_core::error::CoreError;
use imagen_core::types::JobId;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::backend::ResultBackend;
use crate::job::{Job, QueueName};
use crate::state::JobState;
use crate::submit::QueueInspector;

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Job>,
    delayed: Vec<(Instant, Job)>,
    active: Option<Job>,
}

impl QueueState {
    /// Move every delayed job whose eta has passed to the ready list.
    /// Retries go to the front so they keep their place.
    fn promote_due(&mut self, now: Instant) {
        let mut due: Vec<(Instant, Job)> = Vec::new();
        let mut i = 0;
        while i < self.delayed.len() {
            if self.delayed[i].0 <= now {
                due.push(self.delayed.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|(eta, _)| *eta);
        for (_, job) in due.into_iter().rev() {
            self.ready.push_front(job);
        }
    }

    fn next_eta(&self) -> Option<Instant> {
        self.delayed.iter().map(|(eta, _)| *eta).min()
    }

    fn waiting_ids(&self) -> Vec<String> {
        self.ready
            .iter()
            .chain(self.delayed.iter().map(|(_, job)| job))
            .map(|job| job.id.clone())
            .collect()
    }
}

struct QueueSlot {
    consumer: String,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl QueueSlot {
    fn new(consumer: String) -> Self {
        Self {
            consumer,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }
}

/// Multi-producer, single-consumer job broker.
pub struct Broker {
    backend: Arc<ResultBackend>,
    generation: QueueSlot,
    validation: QueueSlot,
}

impl Broker {
    /// Create a broker whose queues are consumed by `worker_name`.
    pub fn new(worker_name: &str, backend: Arc<ResultBackend>) -> Self {
        Self {
            backend,
            generation: QueueSlot::new(format!("{worker_name}@{}", QueueName::Generation)),
            validation: QueueSlot::new(format!("{worker_name}@{}", QueueName::Validation)),
        }
    }

    pub fn backend(&self) -> &Arc<ResultBackend> {
        &self.backend
    }

    fn slot(&self, queue: QueueName) -> &QueueSlot {
        match queue {
            QueueName::Generation => &self.generation,
            QueueName::Validation => &self.validation,
        }
    }

    /// Record the job as `QUEUED` and append it to its queue.
    pub async fn enqueue(&self, job: Job) -> Result<JobId, CoreError> {
        let queue = job.queue();
        let job_id = job.id.clone();
        self.backend.publish(&job_id, JobState::Queued).await?;

        let slot = self.slot(queue);
        slot.state.lock().await.ready.push_back(job);
        slot.notify.notify_one();

        tracing::info!(job_id = %job_id, queue = %queue, "Job enqueued");
        Ok(job_id)
    }

    /// Wait for the next job on `queue` and mark it active.
    ///
    /// Never returns while another job on the same queue is active.
    /// Cancel-safe: dropping the future never loses a job.
    pub async fn reserve(&self, queue: QueueName) -> Job {
        let slot = self.slot(queue);
        loop {
            let wake_at = {
                let mut state = slot.state.lock().await;
                state.promote_due(Instant::now());
                if state.active.is_none() {
                    if let Some(job) = state.ready.pop_front() {
                        state.active = Some(job.clone());
                        return job;
                    }
                }
                state.next_eta()
            };

            match wake_at {
                Some(at) => {
                    tokio::select! {
                        _ = slot.notify.notified() => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => slot.notify.notified().await,
            }
        }
    }

    /// Release the slot held by `job_id`.
    pub async fn ack(&self, queue: QueueName, job_id: &str) {
        let slot = self.slot(queue);
        let mut state = slot.state.lock().await;
        if state.active.as_ref().is_some_and(|j| j.id == job_id) {
            state.active = None;
            drop(state);
            slot.notify.notify_one();
        } else {
            tracing::warn!(job_id = %job_id, queue = %queue, "Ack for a job that is not active");
        }
    }

    /// Release the slot and re-deliver `job` once `after` has elapsed.
    pub async fn schedule_retry(&self, job: Job, after: Duration) {
        let queue = job.queue();
        let slot = self.slot(queue);
        let mut state = slot.state.lock().await;
        if state.active.as_ref().is_some_and(|j| j.id == job.id) {
            state.active = None;
        }
        tracing::info!(
            job_id = %job.id,
            queue = %queue,
            retries = job.retries,
            delay_ms = after.as_millis() as u64,
            "Job scheduled for retry",
        );
        state.delayed.push((Instant::now() + after, job));
        drop(state);
        slot.notify.notify_one();
    }

    /// Jobs on `queue` that are ready, delayed or active.
    pub async fn depth(&self, queue: QueueName) -> usize {
        let state = self.slot(queue).state.lock().await;
        state.ready.len() + state.delayed.len() + usize::from(state.active.is_some())
    }

    /// `(active, scheduled)` introspection for one queue.
    pub async fn inspect(&self, queue: QueueName) -> (WorkerTasks, WorkerTasks) {
        let slot = self.slot(queue);
        let state = slot.state.lock().await;

        let mut active = WorkerTasks::new();
        if let Some(job) = &state.active {
            active.insert(slot.consumer.clone(), vec![job.id.clone()]);
        }
        let mut scheduled = WorkerTasks::new();
        let waiting = state.waiting_ids();
        if !waiting.is_empty() {
            scheduled.insert(slot.consumer.clone(), waiting);
        }
        (active, scheduled)
    }
}

/// Admission inspects the generation queue only; validation jobs never
/// touch the accelerator.
#[async_trait]
impl QueueInspector for Broker {
    async fn active(&self) -> Result<WorkerTasks, CoreError> {
        Ok(self.inspect(QueueName::Generation).await.0)
    }

    async fn scheduled(&self) -> Result<WorkerTasks, CoreError> {
        Ok(self.inspect(QueueName::Generation).await.1)
    }
}
