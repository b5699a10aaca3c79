//! Retry policy for queued jobs.
//!
//! Handlers classify every failure as [`ExecutionError::Transient`] or
//! [`ExecutionError::Permanent`]; the runner asks the queue's
//! [`RetryPolicy`] what to do next.  Nothing here sleeps; the policy only
//! decides.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Retries granted to a generation job after its first attempt.
pub const GENERATION_MAX_RETRIES: u32 = 3;

/// Fixed delay between generation attempts.
pub const GENERATION_RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// Retries granted to a reference validation job.
pub const VALIDATION_MAX_RETRIES: u32 = 1;

/// Fixed delay before retrying a validation job.
pub const VALIDATION_RETRY_BACKOFF: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Execution errors
// ---------------------------------------------------------------------------

/// Failure raised by a job handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// May succeed on a later attempt (engine failure, timeout, I/O).
    #[error("{0}")]
    Transient(String),

    /// Retrying cannot help (bad references, malformed payload).
    #[error("{0}")]
    Permanent(String),
}

impl ExecutionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Stable code used in logs and failure records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transient(_) => "TRANSIENT_EXECUTION_FAILURE",
            Self::Permanent(_) => "PERMANENT_EXECUTION_FAILURE",
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What the runner should do with a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-run after `after`; `attempt` is the 1-based retry number.
    Retry { attempt: u32, after: Duration },
    /// Give up and record the failure.
    Settle,
}

/// Bounded, fixed-backoff retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    pub retryable: fn(&ExecutionError) -> bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
            retryable: ExecutionError::is_transient,
        }
    }

    /// Policy for the generation queue.
    pub fn generation() -> Self {
        Self::new(GENERATION_MAX_RETRIES, GENERATION_RETRY_BACKOFF)
    }

    /// Policy for the validation queue.
    pub fn validation() -> Self {
        Self::new(VALIDATION_MAX_RETRIES, VALIDATION_RETRY_BACKOFF)
    }

    /// Delay before the given 1-based retry.  Constant for this policy.
    pub fn backoff_for(&self, _attempt: u32) -> Duration {
        self.backoff
    }

    /// Decide the fate of a job that failed with `err` after
    /// `retries_so_far` earlier retries.
    pub fn decide(&self, err: &ExecutionError, retries_so_far: u32) -> RetryDecision {
        if !(self.retryable)(err) || retries_so_far >= self.max_retries {
            return RetryDecision::Settle;
        }
        let attempt = retries_so_far + 1;
        RetryDecision::Retry {
            attempt,
            after: self.backoff_for(attempt),
        }
    }
}
