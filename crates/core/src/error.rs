/// Domain error shared by the store, the admission controller and the
/// submission path.
///
/// Each variant maps to one member of the platform error taxonomy; callers
/// at the outer surface translate [`code`](Self::code) into their own
/// response format.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Generation queue is saturated: {pending}/{limit} jobs pending")]
    Capacity { pending: usize, limit: usize },

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "INVALID_PARAMETERS",
            Self::Conflict(_) => "CONFLICT",
            Self::Capacity { .. } => "QUEUE_FULL",
            Self::Unavailable(_) => "UPSTREAM_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Capacity { .. } | Self::Unavailable(_))
    }
}
