//! Integration tests for the reference store against a temporary root.

use std::sync::Arc;
use std::thread;

use assert_matches::assert_matches;
use image::{Rgb, RgbImage};
use imagen_core::error::CoreError;
use imagen_core::imaging::encode_png;
use imagen_core::references::{ReferenceCategory, ReferenceRequest, MAX_REFERENCE_IMAGE_BYTES};
use imagen_store::{ReferenceStore, StoreError};
use tempfile::TempDir;

fn open_store() -> (TempDir, ReferenceStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ReferenceStore::open(dir.path().join("reference")).expect("open store");
    (dir, store)
}

fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([120, 40, 200]));
    encode_png(&img).expect("encode sample")
}

// ---------------------------------------------------------------------------
// Test: create_entity
// ---------------------------------------------------------------------------

#[test]
fn create_entity_makes_directory_and_record() {
    let (_dir, store) = open_store();

    let entity = store
        .create_entity("electra", "character", Some("Lead"))
        .unwrap();
    assert_eq!(entity.category, ReferenceCategory::Character);
    assert_eq!(entity.description, "Lead");
    assert!(store.root().join("characters/electra").is_dir());
    assert!(store.root().join("metadata.json").is_file());
    assert!(store.get_entity("electra").is_some());
}

#[test]
fn create_entity_rejects_unknown_category() {
    let (_dir, store) = open_store();
    assert_matches!(
        store.create_entity("car", "vehicle", None),
        Err(StoreError::Core(CoreError::Validation(_)))
    );
    assert!(store.get_entity("car").is_none());
}

#[test]
fn create_entity_rejects_duplicate_name() {
    let (_dir, store) = open_store();
    store.create_entity("kitchen", "background", None).unwrap();
    assert_matches!(
        store.create_entity("kitchen", "pose", None),
        Err(StoreError::Core(CoreError::Conflict(_)))
    );
    // Category stays what it was.
    assert_eq!(
        store.get_entity("kitchen").unwrap().category,
        ReferenceCategory::Background
    );
}

// ---------------------------------------------------------------------------
// Test: upload_image
// ---------------------------------------------------------------------------

#[test]
fn upload_normalizes_to_square_png() {
    let (_dir, store) = open_store();
    store.create_entity("electra", "character", None).unwrap();

    let image = store
        .upload_image("electra", "front", &sample_png(2000, 1000), "electra.PNG")
        .unwrap();
    assert_eq!((image.width, image.height), (1024, 1024));
    assert_eq!(image.filename, "front.png");
    assert!(!image.validated);

    let path = store.image_path("electra", "front").unwrap();
    let stored = image::open(&path).unwrap();
    assert_eq!((stored.width(), stored.height()), (1024, 1024));
}

#[test]
fn upload_rejects_subtype_outside_category() {
    let (_dir, store) = open_store();
    store.create_entity("electra", "character", None).unwrap();
    assert_matches!(
        store.upload_image("electra", "main", &sample_png(8, 8), "a.png"),
        Err(StoreError::Core(CoreError::Validation(_)))
    );
}

#[test]
fn upload_rejects_missing_entity_size_and_format() {
    let (_dir, store) = open_store();
    assert_matches!(
        store.upload_image("ghost", "front", &sample_png(8, 8), "a.png"),
        Err(StoreError::Core(CoreError::NotFound { .. }))
    );

    store.create_entity("electra", "character", None).unwrap();
    let too_big = vec![0u8; MAX_REFERENCE_IMAGE_BYTES + 1];
    assert_matches!(
        store.upload_image("electra", "front", &too_big, "a.png"),
        Err(StoreError::Core(CoreError::Validation(_)))
    );
    assert_matches!(
        store.upload_image("electra", "front", &sample_png(8, 8), "a.gif"),
        Err(StoreError::Core(CoreError::Validation(_)))
    );
    assert_matches!(
        store.upload_image("electra", "front", b"not an image", "a.jpg"),
        Err(StoreError::Core(CoreError::Validation(_)))
    );
    assert!(store.get_entity("electra").unwrap().references.is_empty());
}

#[test]
fn reupload_resets_flag_and_drops_cached_artifact() {
    let (_dir, store) = open_store();
    store.create_entity("electra", "character", None).unwrap();
    store
        .upload_image("electra", "front", &sample_png(64, 64), "a.png")
        .unwrap();
    assert!(store.mark_validated("electra", "front").unwrap());

    let artifact = store.root().join("characters/electra/front.embedding");
    std::fs::write(&artifact, b"cached").unwrap();

    store
        .upload_image("electra", "front", &sample_png(32, 48), "b.webp.png")
        .unwrap();

    let entity = store.get_entity("electra").unwrap();
    assert_eq!(entity.references.len(), 1);
    assert!(!entity.references["front"].validated);
    assert_eq!(entity.references["front"].original_name, "b.webp.png");
    assert!(!artifact.exists());
}

// ---------------------------------------------------------------------------
// Test: delete_image / delete_entity
// ---------------------------------------------------------------------------

#[test]
fn delete_image_removes_file_artifact_and_record() {
    let (_dir, store) = open_store();
    store.create_entity("kitchen", "background", None).unwrap();
    store
        .upload_image("kitchen", "main", &sample_png(16, 16), "k.jpg")
        .unwrap();
    let path = store.image_path("kitchen", "main").unwrap();
    let artifact = path.with_file_name("main.embedding");
    std::fs::write(&artifact, b"cached").unwrap();

    store.delete_image("kitchen", "main").unwrap();
    assert!(!path.exists());
    assert!(!artifact.exists());
    assert!(store.get_entity("kitchen").unwrap().references.is_empty());

    assert_matches!(
        store.delete_image("kitchen", "main"),
        Err(StoreError::Core(CoreError::NotFound { .. }))
    );
}

#[test]
fn delete_entity_reports_image_count() {
    let (_dir, store) = open_store();
    store.create_entity("electra", "character", None).unwrap();
    for subtype in ["front", "side", "back"] {
        store
            .upload_image("electra", subtype, &sample_png(16, 16), "x.png")
            .unwrap();
    }

    assert_eq!(store.delete_entity("electra").unwrap(), 3);
    assert!(!store.root().join("characters/electra").exists());
    assert!(store.get_entity("electra").is_none());
    assert_matches!(
        store.delete_entity("electra"),
        Err(StoreError::Core(CoreError::NotFound { .. }))
    );
}

// ---------------------------------------------------------------------------
// Test: list_entities
// ---------------------------------------------------------------------------

#[test]
fn list_filters_by_category_and_reports_validation() {
    let (_dir, store) = open_store();
    store.create_entity("electra", "character", None).unwrap();
    store.create_entity("kitchen", "background", None).unwrap();
    store.create_entity("sitting", "pose", None).unwrap();
    store
        .upload_image("electra", "front", &sample_png(16, 16), "x.png")
        .unwrap();

    let all = store.list_entities(None);
    assert_eq!(
        all.keys().collect::<Vec<_>>(),
        vec!["electra", "kitchen", "sitting"]
    );
    assert!(!all["electra"].all_validated);
    assert!(!all["kitchen"].all_validated, "empty entity is never validated");

    store.mark_validated("electra", "front").unwrap();
    let characters = store.list_entities(Some(ReferenceCategory::Character));
    assert_eq!(characters.len(), 1);
    assert_eq!(characters["electra"].subtypes, vec!["front".to_string()]);
    assert_eq!(characters["electra"].reference_count, 1);
    assert!(characters["electra"].all_validated);
}

#[test]
fn mark_validated_on_missing_image_is_a_noop() {
    let (_dir, store) = open_store();
    assert!(!store.mark_validated("ghost", "front").unwrap());
    assert!(!store.root().join("metadata.json").exists());
}

// ---------------------------------------------------------------------------
// Test: resolve_references
// ---------------------------------------------------------------------------

#[test]
fn upload_then_resolve_round_trips() {
    let (_dir, store) = open_store();
    store.create_entity("electra", "character", None).unwrap();
    store
        .upload_image("electra", "front", &sample_png(64, 64), "a.png")
        .unwrap();
    store
        .upload_image("electra", "side", &sample_png(64, 64), "b.png")
        .unwrap();

    let requests = vec![ReferenceRequest::new("electra", &["front", "side"], 0.7)];
    let resolved = store.resolve_references(&requests).unwrap();
    assert_eq!(resolved.len(), 2);
    for r in &resolved {
        assert!(r.path.is_file());
        assert!((r.strength - 0.7).abs() < f32::EPSILON);
        assert_eq!(r.category, ReferenceCategory::Character);
        assert!(r.cached_artifact.is_none());
    }

    // No intervening mutation: identical result.
    assert_eq!(store.resolve_references(&requests).unwrap(), resolved);
}

#[test]
fn resolve_reports_cached_artifact() {
    let (_dir, store) = open_store();
    store.create_entity("kitchen", "background", None).unwrap();
    store
        .upload_image("kitchen", "main", &sample_png(64, 64), "a.png")
        .unwrap();
    let artifact = store.root().join("backgrounds/kitchen/main.embedding");
    std::fs::write(&artifact, b"cached").unwrap();

    let resolved = store
        .resolve_references(&[ReferenceRequest::new("kitchen", &["main"], 0.5)])
        .unwrap();
    assert_eq!(resolved[0].cached_artifact.as_deref(), Some(artifact.as_path()));
}

#[test]
fn resolve_is_all_or_nothing() {
    let (_dir, store) = open_store();
    store.create_entity("electra", "character", None).unwrap();
    store
        .upload_image("electra", "front", &sample_png(64, 64), "a.png")
        .unwrap();

    let unknown_entity = vec![
        ReferenceRequest::new("electra", &["front"], 0.6),
        ReferenceRequest::new("ghost", &["front"], 0.6),
    ];
    assert_matches!(
        store.resolve_references(&unknown_entity),
        Err(CoreError::NotFound { .. })
    );

    let unknown_subtype = vec![ReferenceRequest::new("electra", &["front", "back"], 0.6)];
    assert_matches!(
        store.resolve_references(&unknown_subtype),
        Err(CoreError::NotFound { .. })
    );

    std::fs::remove_file(store.image_path("electra", "front").unwrap()).unwrap();
    assert_matches!(
        store.resolve_references(&[ReferenceRequest::new("electra", &["front"], 0.6)]),
        Err(CoreError::NotFound { entity: "Reference file", .. })
    );
}

// ---------------------------------------------------------------------------
// Test: concurrency and fail-soft reads
// ---------------------------------------------------------------------------

#[test]
fn concurrent_writers_do_not_lose_updates() {
    let (_dir, store) = open_store();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..5 {
                    store
                        .create_entity(&format!("pose_{t}_{i}"), "pose", None)
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.list_entities(None).len(), 40);
}

#[test]
fn corrupt_document_reads_as_empty() {
    let (_dir, store) = open_store();
    store.create_entity("electra", "character", None).unwrap();
    std::fs::write(store.root().join("metadata.json"), b"{ truncated").unwrap();

    assert!(store.list_entities(None).is_empty());
    assert!(store.get_entity("electra").is_none());

    // A write after corruption starts from an empty document.
    store.create_entity("kitchen", "background", None).unwrap();
    assert_eq!(store.list_entities(None).len(), 1);
}
