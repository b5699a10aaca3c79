//! Progress phases reported while a generation job runs.

use serde::{Deserialize, Serialize};

/// Phase of an executing job, in the order they are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Initialisation,
    Generation,
    Saving,
    Done,
}

impl JobPhase {
    /// Completion hint attached to the phase.
    pub fn percent(self) -> u8 {
        match self {
            Self::Initialisation => 0,
            Self::Generation => 10,
            Self::Saving => 90,
            Self::Done => 100,
        }
    }
}

/// Free-form progress payload `{phase, progress}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub phase: JobPhase,
    pub progress: u8,
}

impl From<JobPhase> for ProgressPayload {
    fn from(phase: JobPhase) -> Self {
        Self {
            phase,
            progress: phase.percent(),
        }
    }
}
