//! Jobs as they travel through the broker.

use std::fmt;

use imagen_core::params::GenerationParams;
use imagen_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};

/// Named queue; each has its own single execution slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Accelerator-bound image generation.
    Generation,
    /// Reference image readiness checks.
    Validation,
}

impl QueueName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generation => "generation",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work carried by a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    Generate(GenerationParams),
    ValidateReference { entity: String, subtype: String },
}

impl TaskPayload {
    /// Queue this payload is routed to.
    pub fn queue(&self) -> QueueName {
        match self {
            Self::Generate(_) => QueueName::Generation,
            Self::ValidateReference { .. } => QueueName::Validation,
        }
    }
}

/// One unit of queued work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub payload: TaskPayload,
    /// Retries already consumed; 0 on the first attempt.
    pub retries: u32,
    pub enqueued_at: Timestamp,
}

impl Job {
    /// A fresh job with a random UUID v4 id.
    pub fn new(payload: TaskPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            retries: 0,
            enqueued_at: chrono::Utc::now(),
        }
    }

    pub fn queue(&self) -> QueueName {
        self.payload.queue()
    }
}
