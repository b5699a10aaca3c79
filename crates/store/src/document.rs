//! Serialized shape of `metadata.json`.

use imagen_core::references::ReferenceCategory;
use imagen_core::types::Timestamp;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Current schema version written to new documents.
pub const DOCUMENT_VERSION: u32 = 1;

/// Root of the reference document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Insertion-ordered, keyed by entity name.
    #[serde(default)]
    pub entities: IndexMap<String, ReferenceEntity>,
}

impl Default for ReferenceDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            entities: IndexMap::new(),
        }
    }
}

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

/// A named, categorized collection of reference images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntity {
    pub category: ReferenceCategory,
    #[serde(default)]
    pub description: String,
    pub created_at: Timestamp,
    /// Subtype -> image, in upload order.
    #[serde(default)]
    pub references: IndexMap<String, ReferenceImage>,
}

impl ReferenceEntity {
    /// True only when at least one image exists and every image is validated.
    pub fn all_validated(&self) -> bool {
        !self.references.is_empty() && self.references.values().all(|r| r.validated)
    }

    pub fn summary(&self) -> EntitySummary {
        EntitySummary {
            category: self.category,
            description: self.description.clone(),
            reference_count: self.references.len(),
            subtypes: self.references.keys().cloned().collect(),
            all_validated: self.all_validated(),
        }
    }
}

/// One normalized image attached to an entity subtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceImage {
    pub filename: String,
    pub original_name: String,
    pub width: u32,
    pub height: u32,
    pub uploaded_at: Timestamp,
    #[serde(rename = "embedding_cached", default)]
    pub validated: bool,
}

/// Listing entry returned by `list_entities`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySummary {
    pub category: ReferenceCategory,
    pub description: String,
    pub reference_count: usize,
    pub subtypes: Vec<String>,
    pub all_validated: bool,
}
