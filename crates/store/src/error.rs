use std::path::PathBuf;

use imagen_core::error::CoreError;

/// Errors raised by the reference store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode reference document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to encode reference image: {0}")]
    Image(#[from] image::ImageError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Collapse into the shared taxonomy; infrastructure failures become
    /// [`CoreError::Internal`].
    pub fn into_core(self) -> CoreError {
        match self {
            Self::Core(e) => e,
            other => CoreError::Internal(other.to_string()),
        }
    }
}
