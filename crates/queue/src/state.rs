//! Job state machine and result payloads.
//!
//! ```text
//! QUEUED -> PROGRESS(phase)* -> SUCCESS | FAILURE
//! ```
//!
//! Terminal states are final and nothing re-enters `QUEUED`.  A job being
//! retried stays in `PROGRESS`; its phases restart at `initialisation`.

use std::path::PathBuf;

use imagen_core::params::LoraWeight;
use imagen_core::progress::{JobPhase, ProgressPayload};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Worker-side state
// ---------------------------------------------------------------------------

/// State recorded by the worker for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Progress { meta: ProgressPayload },
    Success { result: TaskOutput },
    Failure { error: String },
}

impl JobState {
    pub fn progress(phase: JobPhase) -> Self {
        Self::Progress { meta: phase.into() }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failure { .. })
    }

    /// Whether `next` may follow `self` in a job's history.
    pub fn can_transition_to(&self, next: &JobState) -> bool {
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (_, Self::Queued) => false,
            (Self::Queued | Self::Progress { .. }, _) => true,
            _ => false,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Progress { .. } => "PROGRESS",
            Self::Success { .. } => "SUCCESS",
            Self::Failure { .. } => "FAILURE",
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Successful output of either task type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskOutput {
    Generation(GenerationResult),
    Validation(ValidationResult),
}

/// Result of a generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub status: String,
    pub filename: String,
    /// Artifact path relative to the data directory.
    pub path: String,
    /// Public retrieval path.
    pub url: String,
    pub metadata: GenerationMetadata,
}

/// Parameters the artifact was actually generated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub model: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub loras: Vec<LoraWeight>,
    pub steps: u32,
    pub guidance_scale: f32,
    pub seed: Option<u64>,
    pub ip_strength: f32,
    pub references: Vec<ReferenceEcho>,
}

/// A reference image that conditioned the generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEcho {
    pub path: PathBuf,
    pub strength: f32,
}

/// Result of a reference validation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: String,
    pub entity: String,
    pub subtype: String,
    /// False when the image was deleted before validation finished.
    pub validated: bool,
}

// ---------------------------------------------------------------------------
// Caller-facing status
// ---------------------------------------------------------------------------

/// What a polling caller sees for a job id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// Never submitted, or settled longer ago than the retention window.
    NotFound,
    Queued,
    InProgress { phase: JobPhase, progress: u8 },
    Succeeded { result: TaskOutput },
    Failed { error: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

impl From<Option<JobState>> for JobStatus {
    fn from(state: Option<JobState>) -> Self {
        match state {
            None => Self::NotFound,
            Some(JobState::Queued) => Self::Queued,
            Some(JobState::Progress { meta }) => Self::InProgress {
                phase: meta.phase,
                progress: meta.progress,
            },
            Some(JobState::Success { result }) => Self::Succeeded { result },
            Some(JobState::Failure { error }) => Self::Failed { error },
        }
    }
}
