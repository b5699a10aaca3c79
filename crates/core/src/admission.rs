//! Queue admission arithmetic.
//!
//! The broker exposes two introspection views, each keyed by worker
//! identity: tasks currently executing ("active") and tasks accepted but
//! not yet executing ("scheduled").  Admission sums them into a single
//! pending count and compares it against the configured ceiling.

use std::collections::{HashMap, HashSet};

use crate::error::CoreError;

/// Default ceiling on pending generation jobs.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Worker identity -> task ids, as reported by queue introspection.
pub type WorkerTasks = HashMap<String, Vec<String>>;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The job may be enqueued; `position` is the 1-based estimate.
    Accept { position: usize },
    /// The queue is saturated.
    Reject { pending: usize, limit: usize },
}

impl AdmissionDecision {
    /// Convert a rejection into [`CoreError::Capacity`], returning the
    /// estimated position on acceptance.
    pub fn into_result(self) -> Result<usize, CoreError> {
        match self {
            Self::Accept { position } => Ok(position),
            Self::Reject { pending, limit } => Err(CoreError::Capacity { pending, limit }),
        }
    }
}

/// Total pending work across every known worker.
///
/// For each worker present in either view, the distinct task ids across
/// its active and scheduled lists are counted once.
pub fn count_pending(active: &WorkerTasks, scheduled: &WorkerTasks) -> usize {
    let workers: HashSet<&String> = active.keys().chain(scheduled.keys()).collect();

    workers
        .into_iter()
        .map(|worker| {
            let tasks: HashSet<&str> = active
                .get(worker)
                .into_iter()
                .chain(scheduled.get(worker))
                .flatten()
                .map(String::as_str)
                .collect();
            tasks.len()
        })
        .sum()
}

/// Decide whether one more job fits under `max_queue_size`.
pub fn admit(
    active: &WorkerTasks,
    scheduled: &WorkerTasks,
    max_queue_size: usize,
) -> AdmissionDecision {
    let pending = count_pending(active, scheduled);
    if pending >= max_queue_size {
        AdmissionDecision::Reject {
            pending,
            limit: max_queue_size,
        }
    } else {
        AdmissionDecision::Accept {
            position: pending + 1,
        }
    }
}
