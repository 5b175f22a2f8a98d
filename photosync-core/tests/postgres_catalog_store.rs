//! Integration tests exercising the reconciliation engine against a real
//! PostgreSQL backend, complementing the in-memory-store tests in
//! `src/engine.rs`. Each test gets its own freshly migrated database from
//! `#[sqlx::test]`, matching this repo's existing `sqlx::test` convention.

use chrono::{TimeZone, Utc};
use photosync_core::store::postgres::PostgresStore;
use photosync_core::{CatalogSession, CatalogStore, FileEvent, FileEventKind, ReconciliationEngine};
use sqlx::PgPool;
use std::fs;

fn write_file(dir: &std::path::Path, category: &str, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let category_dir = dir.join(category);
    fs::create_dir_all(&category_dir).unwrap();
    let path = category_dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

#[sqlx::test]
async fn full_sync_inserts_a_new_file_against_postgres(pool: PgPool) {
    let store = PostgresStore::from_pool(pool);
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "cars", "IMG_20230615_sunset.jpg", b"fake-jpeg-bytes");

    let engine = ReconciliationEngine::new(dir.path().to_path_buf());
    let stats = engine.full_sync(&store).await.unwrap();

    assert_eq!(stats.scanned, 1);
    assert_eq!(stats.added, 1);

    let mut session = store.begin().await.unwrap();
    let resolved = fs::canonicalize(dir.path().join("cars/IMG_20230615_sunset.jpg")).unwrap();
    let row = session
        .get_by_path(&resolved.to_string_lossy())
        .await
        .unwrap()
        .expect("row exists");
    assert_eq!(row.category, "cars");
    assert_eq!(row.title, "Sunset");
    session.commit().await.unwrap();
}

#[sqlx::test]
async fn unique_constraint_on_file_path_is_enforced(pool: PgPool) {
    let store = PostgresStore::from_pool(pool);
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "cars", "a.jpg", b"a");
    let resolved = fs::canonicalize(&path).unwrap().to_string_lossy().into_owned();

    let metadata = photosync_core::ImageMetadata {
        file_size: 1,
        width: None,
        height: None,
        file_modified_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    };
    let photo = photosync_core::Photo::new(
        resolved,
        "a.jpg".to_string(),
        "cars".to_string(),
        "A".to_string(),
        &metadata,
        Utc::now(),
    );

    let mut session = store.begin().await.unwrap();
    session.insert(&photo).await.unwrap();
    session.commit().await.unwrap();

    let mut session = store.begin().await.unwrap();
    let mut duplicate = photo.clone();
    duplicate.id = photosync_core::types::new_photo_id();
    let result = session.insert(&duplicate).await;
    assert!(result.is_err());
    let _ = session.rollback().await;
}

#[sqlx::test]
async fn deleted_event_removes_the_row(pool: PgPool) {
    let store = PostgresStore::from_pool(pool);
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "cars", "gone.jpg", b"a");

    let engine = ReconciliationEngine::new(dir.path().to_path_buf());
    engine.full_sync(&store).await.unwrap();

    let event = FileEvent::new(FileEventKind::Deleted, path, "cars".to_string());
    let outcome = engine.apply(&store, &event).await.unwrap();
    assert_eq!(outcome.removed, 1);

    let stats = engine.full_sync(&store).await.unwrap();
    assert_eq!(stats.scanned, 0);
    assert_eq!(stats.removed, 0);
}
