//! Reference entity categories, subtype rules, and upload validation.
//!
//! The category → allowed-subtype table is fixed at compile time.  An
//! entity's category never changes after creation, so the table is the
//! single authority on which subtypes may be attached to it.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Largest accepted upload, in bytes (10 MiB).
pub const MAX_REFERENCE_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Edge length of the square every reference image is normalized to.
pub const REFERENCE_IMAGE_SIZE: u32 = 1024;

/// Accepted file extensions (lowercase, without the dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Subtype used when a reference request does not name any.
pub const DEFAULT_REFERENCE_SUBTYPE: &str = "front";

/// Default style-transfer strength for a reference request.
pub const DEFAULT_REFERENCE_STRENGTH: f32 = 0.6;

/// Maximum length of an entity name.
const MAX_ENTITY_NAME_LEN: usize = 64;

const CHARACTER_SUBTYPES: &[&str] = &["front", "side", "back", "full_body", "detail"];
const SCENE_SUBTYPES: &[&str] = &["main", "variant"];

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Kind of reference entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceCategory {
    Character,
    Background,
    Pose,
}

impl ReferenceCategory {
    /// Every category, in display order.
    pub const ALL: [ReferenceCategory; 3] = [Self::Character, Self::Background, Self::Pose];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Background => "background",
            Self::Pose => "pose",
        }
    }

    /// Subtypes that may be attached to an entity of this category.
    pub fn allowed_subtypes(self) -> &'static [&'static str] {
        match self {
            Self::Character => CHARACTER_SUBTYPES,
            Self::Background | Self::Pose => SCENE_SUBTYPES,
        }
    }

    /// Directory (under the reference root) holding entities of this category.
    pub fn storage_dir(self) -> &'static str {
        match self {
            Self::Character => "characters",
            Self::Background => "backgrounds",
            Self::Pose => "poses",
        }
    }

    /// Reject subtypes outside [`allowed_subtypes`](Self::allowed_subtypes).
    pub fn validate_subtype(self, subtype: &str) -> Result<(), CoreError> {
        let allowed = self.allowed_subtypes();
        if allowed.contains(&subtype) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "Invalid subtype '{subtype}' for category '{self}'. Must be one of: {}",
                allowed.join(", ")
            )))
        }
    }
}

impl fmt::Display for ReferenceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|c| c.as_str()).collect();
                CoreError::Validation(format!(
                    "Invalid category '{s}'. Must be one of: {}",
                    names.join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Reference requests
// ---------------------------------------------------------------------------

/// A caller's request to condition a generation on stored references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRequest {
    /// Entity name, e.g. `electra` or `kitchen`.
    pub entity: String,
    /// Subtypes to use; one resolved reference per entry.
    #[serde(default = "default_subtypes")]
    pub types: Vec<String>,
    /// Style-transfer strength in `0.0..=1.0`.
    #[serde(default = "default_strength")]
    pub strength: f32,
}

impl ReferenceRequest {
    pub fn new(entity: impl Into<String>, types: &[&str], strength: f32) -> Self {
        Self {
            entity: entity.into(),
            types: types.iter().map(|t| t.to_string()).collect(),
            strength,
        }
    }
}

fn default_subtypes() -> Vec<String> {
    vec![DEFAULT_REFERENCE_SUBTYPE.to_string()]
}

fn default_strength() -> f32 {
    DEFAULT_REFERENCE_STRENGTH
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate an entity name.
///
/// Names double as directory names, so only ASCII alphanumerics, hyphen
/// and underscore are accepted, up to `MAX_ENTITY_NAME_LEN` characters.
pub fn validate_entity_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Entity name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_ENTITY_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Entity name must not exceed {MAX_ENTITY_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::Validation(
            "Entity name may only contain alphanumeric, hyphen, or underscore characters"
                .to_string(),
        ));
    }
    Ok(())
}

/// Reject uploads larger than [`MAX_REFERENCE_IMAGE_BYTES`].
pub fn validate_upload_size(len: usize) -> Result<(), CoreError> {
    if len > MAX_REFERENCE_IMAGE_BYTES {
        return Err(CoreError::Validation(format!(
            "File too large ({} MiB). Max {} MiB",
            len / (1024 * 1024),
            MAX_REFERENCE_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Check the extension of the uploaded file name against
/// [`ALLOWED_EXTENSIONS`]. Returns the lowercased extension.
pub fn validate_extension(original_filename: &str) -> Result<String, CoreError> {
    let ext = Path::new(original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(CoreError::Validation(format!(
            "Unsupported format '.{ext}'. Must be one of: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )))
    }
}

/// Stored file name for a subtype's normalized image.
pub fn image_filename(subtype: &str) -> String {
    format!("{subtype}.png")
}

/// Stored file name for a subtype's cached derived artifact.
pub fn derived_artifact_filename(subtype: &str) -> String {
    format!("{subtype}.embedding")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
