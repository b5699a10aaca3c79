//! `imagen-store` -- the reference asset store.
//!
//! Reference entities and their normalized images live on disk under a
//! single root directory.  A JSON document (`metadata.json`) indexes them;
//! every mutation rewrites that document atomically under an advisory lock
//! so concurrent writers in any process serialize.

pub mod document;
pub mod error;
pub mod file;
pub mod store;

pub use document::{EntitySummary, ReferenceDocument, ReferenceEntity, ReferenceImage};
pub use error::StoreError;
pub use store::{ReferenceStore, ResolvedReference};
