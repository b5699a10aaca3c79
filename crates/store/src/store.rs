//! Reference entity CRUD and resolution.
//!
//! All methods are blocking.  Async callers run them on
//! `tokio::task::spawn_blocking`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use imagen_core::error::CoreError;
use imagen_core::imaging;
use imagen_core::references::{
    derived_artifact_filename, image_filename, validate_entity_name, validate_extension,
    validate_upload_size, ReferenceCategory, ReferenceRequest, REFERENCE_IMAGE_SIZE,
};
use indexmap::IndexMap;
use serde::Serialize;

use crate::document::{EntitySummary, ReferenceDocument, ReferenceEntity, ReferenceImage};
use crate::error::StoreError;
use crate::file::DocumentFile;

/// A reference request expanded to one concrete image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedReference {
    pub path: PathBuf,
    pub strength: f32,
    /// Cached derived artifact, when one has been computed.
    pub cached_artifact: Option<PathBuf>,
    pub category: ReferenceCategory,
}

/// Process-wide handle to the reference store rooted at one directory.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    root: PathBuf,
    file: DocumentFile,
}

impl ReferenceStore {
    /// Open (creating if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        let file = DocumentFile::new(&root);
        Ok(Self { root, file })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A consistent copy of the whole document as it is on disk now.
    pub fn snapshot(&self) -> ReferenceDocument {
        self.file.load()
    }

    fn entity_dir(&self, category: ReferenceCategory, name: &str) -> PathBuf {
        self.root.join(category.storage_dir()).join(name)
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Create an empty entity and its storage directory.
    pub fn create_entity(
        &self,
        name: &str,
        category: &str,
        description: Option<&str>,
    ) -> Result<ReferenceEntity, StoreError> {
        let category: ReferenceCategory = category.parse()?;
        validate_entity_name(name)?;

        let entity = self.file.update(|doc| {
            if doc.entities.contains_key(name) {
                return Err(CoreError::Conflict(format!("Entity '{name}' already exists")).into());
            }

            let dir = self.entity_dir(category, name);
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

            let entity = ReferenceEntity {
                category,
                description: description.unwrap_or_default().to_string(),
                created_at: chrono::Utc::now(),
                references: IndexMap::new(),
            };
            doc.entities.insert(name.to_string(), entity.clone());
            Ok(entity)
        })?;

        tracing::info!(entity = %name, category = %category, "Reference entity created");
        Ok(entity)
    }

    /// Remove an entity and every file under its directory.
    ///
    /// Returns the number of images the entity held.
    pub fn delete_entity(&self, name: &str) -> Result<usize, StoreError> {
        let removed = self.file.update(|doc| {
            let entity = doc
                .entities
                .shift_remove(name)
                .ok_or_else(|| CoreError::not_found("Entity", name))?;

            let dir = self.entity_dir(entity.category, name);
            remove_dir_if_present(&dir)?;
            Ok(entity.references.len())
        })?;

        tracing::info!(entity = %name, images_removed = removed, "Reference entity deleted");
        Ok(removed)
    }

    /// All entities, optionally restricted to one category.
    pub fn list_entities(
        &self,
        category: Option<ReferenceCategory>,
    ) -> IndexMap<String, EntitySummary> {
        self.snapshot()
            .entities
            .iter()
            .filter(|(_, e)| category.map_or(true, |c| e.category == c))
            .map(|(name, e)| (name.clone(), e.summary()))
            .collect()
    }

    pub fn get_entity(&self, name: &str) -> Option<ReferenceEntity> {
        self.snapshot().entities.shift_remove(name)
    }

    // -----------------------------------------------------------------------
    // Images
    // -----------------------------------------------------------------------

    /// Normalize and store an image for `subtype`, replacing any previous
    /// one and invalidating its cached artifact.
    pub fn upload_image(
        &self,
        entity_name: &str,
        subtype: &str,
        bytes: &[u8],
        original_filename: &str,
    ) -> Result<ReferenceImage, StoreError> {
        let category = self
            .snapshot()
            .entities
            .get(entity_name)
            .map(|e| e.category)
            .ok_or_else(|| CoreError::not_found("Entity", entity_name))?;
        category.validate_subtype(subtype)?;
        validate_upload_size(bytes.len())?;
        validate_extension(original_filename)?;

        // Decode and resample outside the lock.
        let normalized = imaging::normalize_reference(bytes, REFERENCE_IMAGE_SIZE)?;
        let png = imaging::encode_png(&normalized)?;

        let image = self.store_normalized(
            entity_name,
            subtype,
            &png,
            (normalized.width(), normalized.height()),
            original_filename,
        )?;

        tracing::info!(
            entity = %entity_name,
            subtype = %subtype,
            original = %original_filename,
            "Reference image uploaded"
        );
        Ok(image)
    }

    /// Write an already-normalized PNG and record it, all under the lock.
    fn store_normalized(
        &self,
        entity_name: &str,
        subtype: &str,
        png: &[u8],
        (width, height): (u32, u32),
        original_filename: &str,
    ) -> Result<ReferenceImage, StoreError> {
        self.file.update(|doc| {
            // The entity may have been deleted, or recreated under another
            // category, while we were resampling.
            let entity = doc
                .entities
                .get_mut(entity_name)
                .ok_or_else(|| CoreError::not_found("Entity", entity_name))?;
            entity.category.validate_subtype(subtype)?;

            let dir = self.entity_dir(entity.category, entity_name);
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

            let filename = image_filename(subtype);
            let path = dir.join(&filename);
            fs::write(&path, png).map_err(|e| StoreError::io(&path, e))?;
            remove_file_if_present(&dir.join(derived_artifact_filename(subtype)))?;

            let image = ReferenceImage {
                filename,
                original_name: original_filename.to_string(),
                width,
                height,
                uploaded_at: chrono::Utc::now(),
                validated: false,
            };
            entity.references.insert(subtype.to_string(), image.clone());
            Ok(image)
        })
    }

    /// Remove one subtype's image, its cached artifact and its record.
    pub fn delete_image(&self, entity_name: &str, subtype: &str) -> Result<(), StoreError> {
        self.file.update(|doc| {
            let entity = doc
                .entities
                .get_mut(entity_name)
                .ok_or_else(|| CoreError::not_found("Entity", entity_name))?;
            let image = entity.references.shift_remove(subtype).ok_or_else(|| {
                CoreError::not_found("Reference subtype", format!("{entity_name}/{subtype}"))
            })?;

            let dir = self.entity_dir(entity.category, entity_name);
            remove_file_if_present(&dir.join(&image.filename))?;
            remove_file_if_present(&dir.join(derived_artifact_filename(subtype)))?;
            Ok(())
        })?;

        tracing::info!(entity = %entity_name, subtype = %subtype, "Reference image deleted");
        Ok(())
    }

    /// Path of the stored image for `(entity, subtype)`.
    pub fn image_path(&self, entity_name: &str, subtype: &str) -> Result<PathBuf, CoreError> {
        let doc = self.snapshot();
        let entity = doc
            .entities
            .get(entity_name)
            .ok_or_else(|| CoreError::not_found("Entity", entity_name))?;
        let image = entity.references.get(subtype).ok_or_else(|| {
            CoreError::not_found("Reference subtype", format!("{entity_name}/{subtype}"))
        })?;
        Ok(self.entity_dir(entity.category, entity_name).join(&image.filename))
    }

    /// Flag an image as validated.
    ///
    /// Returns `false` without writing when the entity or subtype no longer
    /// exists; a validation job racing a delete is not an error.
    pub fn mark_validated(&self, entity_name: &str, subtype: &str) -> Result<bool, StoreError> {
        let marked = self.file.update(|doc| {
            let image = doc
                .entities
                .get_mut(entity_name)
                .and_then(|e| e.references.get_mut(subtype));
            Ok(match image {
                Some(image) => {
                    image.validated = true;
                    true
                }
                None => false,
            })
        })?;

        if marked {
            tracing::info!(entity = %entity_name, subtype = %subtype, "Reference image validated");
        } else {
            tracing::debug!(entity = %entity_name, subtype = %subtype, "Validated image no longer exists");
        }
        Ok(marked)
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Expand reference requests to concrete image paths.
    ///
    /// One record per requested subtype, in request order.  Any unknown
    /// entity or subtype, or a missing backing file, fails the whole call.
    pub fn resolve_references(
        &self,
        requests: &[ReferenceRequest],
    ) -> Result<Vec<ResolvedReference>, CoreError> {
        let doc = self.snapshot();
        let mut resolved = Vec::new();

        for request in requests {
            let entity = doc
                .entities
                .get(&request.entity)
                .ok_or_else(|| CoreError::not_found("Reference entity", &request.entity))?;
            let dir = self.entity_dir(entity.category, &request.entity);

            for subtype in &request.types {
                let image = entity.references.get(subtype).ok_or_else(|| {
                    CoreError::not_found(
                        "Reference subtype",
                        format!("{}/{subtype}", request.entity),
                    )
                })?;

                let path = dir.join(&image.filename);
                if !path.is_file() {
                    return Err(CoreError::not_found(
                        "Reference file",
                        path.display().to_string(),
                    ));
                }

                let artifact = dir.join(derived_artifact_filename(subtype));
                resolved.push(ResolvedReference {
                    path,
                    strength: request.strength,
                    cached_artifact: artifact.is_file().then_some(artifact),
                    category: entity.category,
                });
            }
        }

        Ok(resolved)
    }
}

fn remove_file_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

fn remove_dir_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}
