//! Integration tests for `AnnotationRepo` over the in-memory store.

use std::sync::Arc;

use assert_matches::assert_matches;
use cantor_core::annotation::AnnotationTool;
use cantor_core::compression::{decompress, optimize};
use cantor_core::error::CoreError;
use cantor_db::models::annotation::{Annotation, CreateAnnotation, UpdateAnnotation};
use cantor_db::repositories::{AnnotationRepo, RepoError};
use cantor_db::store::{MemoryStore, Store};
use serde_json::json;

fn repo() -> (AnnotationRepo, Arc<MemoryStore<Annotation>>) {
    let store = Arc::new(MemoryStore::<Annotation>::new());
    (AnnotationRepo::new(store.clone()), store)
}

fn input(song_id: &str, profile_id: &str) -> CreateAnnotation {
    CreateAnnotation {
        song_id: song_id.to_string(),
        profile_id: profile_id.to_string(),
        svg_path: "M 0 0 L 10 10".to_string(),
        tool: "pen".to_string(),
        ..Default::default()
    }
}

/// A long, repetitive stroke that compresses well.
fn long_path() -> String {
    let mut path = String::from("M 0 0");
    for i in 0..200 {
        path.push_str(&format!(" L {} {}", i % 10, i % 7));
    }
    path
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_assigns_defaults() {
    let (repo, _) = repo();
    let created = repo.create(input("song-1", "p1")).await.unwrap();

    assert_eq!(created.version, 1);
    assert_eq!(created.color, "#000000");
    assert!(created.visible);
    assert_eq!(created.tool, AnnotationTool::Pen);
    assert!(created.deleted_at.is_none());
    assert_eq!(created.created_at, created.updated_at);
    assert!(created.checksum.is_some());
}

#[tokio::test]
async fn create_with_laser_tool_rejected_and_nothing_persisted() {
    let (repo, store) = repo();
    let mut bad = input("song-1", "p1");
    bad.tool = "laser".to_string();

    let err = repo.create(bad).await.unwrap_err();
    assert_matches!(err, RepoError::Core(CoreError::Validation(_)));

    let rows = store.find_all(&Default::default()).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn create_requires_song_profile_and_path() {
    let (repo, _) = repo();

    let mut missing_song = input("", "p1");
    missing_song.song_id = "  ".to_string();
    let mut missing_path = input("song-1", "p1");
    missing_path.svg_path = String::new();

    for bad in [missing_song, input("song-1", ""), missing_path] {
        let err = repo.create(bad).await.unwrap_err();
        assert_matches!(err, RepoError::Core(CoreError::Validation(_)));
    }
}

#[tokio::test]
async fn create_rejects_out_of_range_opacity() {
    let (repo, _) = repo();
    let mut bad = input("song-1", "p1");
    bad.opacity = Some(1.5);
    assert_matches!(
        repo.create(bad).await,
        Err(RepoError::Core(CoreError::Validation(_)))
    );
}

#[tokio::test]
async fn create_serializes_metadata_to_text() {
    let (repo, _) = repo();
    let mut with_meta = input("song-1", "p1");
    with_meta.metadata = Some(json!({"layer": 2}));

    let created = repo.create(with_meta).await.unwrap();
    assert_eq!(created.metadata.as_deref(), Some(r#"{"layer":2}"#));
}

#[tokio::test]
async fn long_paths_are_stored_compressed() {
    let (repo, _) = repo();
    let mut stroke = input("song-1", "p1");
    stroke.svg_path = long_path();

    let created = repo.create(stroke).await.unwrap();
    assert!(created.compressed_size.is_some());
    assert!(created.svg_path.len() < long_path().len());
    assert_eq!(decompress(&created.svg_path), optimize(&long_path()));
}

#[tokio::test]
async fn compression_can_be_disabled() {
    let store = Arc::new(MemoryStore::<Annotation>::new());
    let repo = AnnotationRepo::new(store).with_compression(false);
    let mut stroke = input("song-1", "p1");
    stroke.svg_path = long_path();

    let created = repo.create(stroke).await.unwrap();
    assert!(created.compressed_size.is_none());
    assert_eq!(created.svg_path, optimize(&long_path()));
}

// ---------------------------------------------------------------------------
// create_bulk
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bulk_create_inserts_all() {
    let (repo, _) = repo();
    let created = repo
        .create_bulk(vec![input("song-1", "p1"), input("song-1", "p2")])
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(repo.find_by_song("song-1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn bulk_create_with_one_invalid_item_persists_nothing() {
    let (repo, _) = repo();
    let mut bad = input("song-1", "p2");
    bad.tool = "laser".to_string();

    let err = repo
        .create_bulk(vec![input("song-1", "p1"), bad])
        .await
        .unwrap_err();
    assert_matches!(err, RepoError::Core(CoreError::Validation(ref msg)) if msg.starts_with("annotations[1]"));
    assert!(repo.find_by_song("song-1").await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn find_by_song_returns_oldest_first() {
    let (repo, _) = repo();
    let first = repo.create(input("song-1", "p1")).await.unwrap();
    let second = repo.create(input("song-1", "p2")).await.unwrap();
    repo.create(input("song-2", "p1")).await.unwrap();

    let ids: Vec<_> = repo
        .find_by_song("song-1")
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[tokio::test]
async fn find_by_song_and_profile_filters_author() {
    let (repo, _) = repo();
    repo.create(input("song-1", "p1")).await.unwrap();
    repo.create(input("song-1", "p2")).await.unwrap();

    let rows = repo.find_by_song_and_profile("song-1", "p2").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].profile_id, "p2");
}

#[tokio::test]
async fn find_by_id_missing_is_not_found() {
    let (repo, _) = repo();
    let err = repo.find_by_id(uuid::Uuid::new_v4()).await.unwrap_err();
    assert_matches!(err, RepoError::Core(CoreError::NotFound { entity: "annotation", .. }));
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_bumps_version_and_applies_only_given_fields() {
    let (repo, _) = repo();
    let created = repo.create(input("song-1", "p1")).await.unwrap();

    let updated = repo
        .update(
            created.id,
            UpdateAnnotation {
                color: Some("#ff0000".to_string()),
                tool: Some("highlighter".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.version, 2);
    assert_eq!(updated.color, "#ff0000");
    assert_eq!(updated.tool, AnnotationTool::Highlighter);
    assert_eq!(updated.svg_path, created.svg_path);
    assert!(updated.updated_at >= created.updated_at);

    let again = repo
        .update(created.id, UpdateAnnotation::default())
        .await
        .unwrap();
    assert_eq!(again.version, 3);
}

#[tokio::test]
async fn update_revalidates_tool() {
    let (repo, _) = repo();
    let created = repo.create(input("song-1", "p1")).await.unwrap();

    let err = repo
        .update(
            created.id,
            UpdateAnnotation {
                tool: Some("laser".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, RepoError::Core(CoreError::Validation(_)));
    assert_eq!(repo.find_by_id(created.id).await.unwrap().version, 1);
}

#[tokio::test]
async fn update_replacing_path_refreshes_checksum() {
    let (repo, _) = repo();
    let created = repo.create(input("song-1", "p1")).await.unwrap();

    let updated = repo
        .update(
            created.id,
            UpdateAnnotation {
                svg_path: Some("M 5 5 L 6 6".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.svg_path, "M 5 5 L 6 6");
    assert_ne!(updated.checksum, created.checksum);
}

#[tokio::test]
async fn update_of_deleted_row_is_not_found() {
    let (repo, _) = repo();
    let created = repo.create(input("song-1", "p1")).await.unwrap();
    repo.soft_delete(created.id).await.unwrap();

    let err = repo
        .update(created.id, UpdateAnnotation::default())
        .await
        .unwrap_err();
    assert_matches!(err, RepoError::Core(CoreError::NotFound { .. }));
}

// ---------------------------------------------------------------------------
// soft delete / restore
// ---------------------------------------------------------------------------

#[tokio::test]
async fn soft_deleted_rows_are_invisible() {
    let (repo, _) = repo();
    let created = repo.create(input("song-1", "p1")).await.unwrap();

    repo.soft_delete(created.id).await.unwrap();

    assert!(repo.find_by_song("song-1").await.unwrap().is_empty());
    assert_matches!(
        repo.find_by_id(created.id).await,
        Err(RepoError::Core(CoreError::NotFound { .. }))
    );
    assert_matches!(
        repo.soft_delete(created.id).await,
        Err(RepoError::Core(CoreError::NotFound { .. }))
    );
}

#[tokio::test]
async fn delete_by_profile_and_song_counts_only_that_song() {
    let (repo, _) = repo();
    for _ in 0..3 {
        repo.create(input("song-1", "p1")).await.unwrap();
    }
    let other_song = repo.create(input("song-2", "p1")).await.unwrap();
    let other_author = repo.create(input("song-1", "p2")).await.unwrap();

    let affected = repo.delete_by_profile_and_song("p1", "song-1").await.unwrap();
    assert_eq!(affected, 3);

    assert_eq!(repo.find_by_id(other_song.id).await.unwrap().song_id, "song-2");
    let remaining = repo.find_by_song("song-1").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, other_author.id);

    // Already deleted rows are not counted again.
    assert_eq!(
        repo.delete_by_profile_and_song("p1", "song-1").await.unwrap(),
        0
    );
}

#[tokio::test]
async fn restore_brings_back_soft_deleted_row() {
    let (repo, _) = repo();
    let created = repo.create(input("song-1", "p1")).await.unwrap();
    repo.soft_delete(created.id).await.unwrap();

    let restored = repo.restore(created.id).await.unwrap();
    assert!(restored.deleted_at.is_none());
    assert_eq!(repo.find_by_song("song-1").await.unwrap().len(), 1);

    // A live row has nothing to restore.
    assert_matches!(
        repo.restore(created.id).await,
        Err(RepoError::Core(CoreError::NotFound { .. }))
    );
}
