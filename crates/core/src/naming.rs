//! Artifact file naming.

use crate::types::Timestamp;

/// URL prefix under which generated artifacts are served.
pub const PUBLIC_OUTPUTS_PREFIX: &str = "/outputs";

/// `{model}_{YYYYmmdd_HHMMSS}_{suffix}.png`, with hyphens in the model id
/// replaced by underscores.
pub fn artifact_filename(model: &str, at: &Timestamp, suffix: &str) -> String {
    format!(
        "{}_{}_{}.png",
        model.replace('-', "_"),
        at.format("%Y%m%d_%H%M%S"),
        suffix
    )
}

/// Eight random hex characters.
pub fn short_suffix() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Public retrieval path for an artifact.
pub fn public_url(filename: &str) -> String {
    format!("{PUBLIC_OUTPUTS_PREFIX}/{filename}")
}
