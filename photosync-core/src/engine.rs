//! Reconciliation Engine (C3): the rules that bring the catalog into
//! agreement with the filesystem, either for a single [`FileEvent`] batch or
//! for a full two-level directory walk.

use crate::error::{Result, SyncError};
use crate::extractor;
use crate::store::{CatalogSession, CatalogStore};
use crate::title::title_from_filename;
use crate::types::{is_supported_extension, FileEvent, FileEventKind, Photo, SyncStats};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Per-event-kind tallies from one `apply`/`apply_batch` call, used to feed
/// the health surface's rolling "today" counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EventBatchOutcome {
    pub processed: u64,
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
    pub errors: u64,
}

enum ApplyResult {
    Inserted,
    Updated,
    Deleted,
    NoOp,
}

/// Reconciles a configured storage root against a catalog store.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    root: PathBuf,
}

impl ReconciliationEngine {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Applies a single event inside its own transaction.
    pub async fn apply<S: CatalogStore>(
        &self,
        store: &S,
        event: &FileEvent,
    ) -> Result<EventBatchOutcome> {
        self.apply_batch(store, std::slice::from_ref(event)).await
    }

    /// Applies a batch of events inside one transaction (SPEC_FULL.md 4.3.1).
    ///
    /// Per-event faults are logged and counted without aborting the batch;
    /// a database-layer fault aborts and rolls back the whole transaction.
    #[instrument(skip(self, store, events), fields(batch_size = events.len()))]
    pub async fn apply_batch<S: CatalogStore>(
        &self,
        store: &S,
        events: &[FileEvent],
    ) -> Result<EventBatchOutcome> {
        let mut session = store.begin().await?;
        let mut outcome = EventBatchOutcome::default();

        for event in events {
            match self.apply_one(&mut session, event).await {
                Ok(result) => {
                    outcome.processed += 1;
                    match result {
                        ApplyResult::Inserted => outcome.added += 1,
                        ApplyResult::Updated => outcome.updated += 1,
                        ApplyResult::Deleted => outcome.removed += 1,
                        ApplyResult::NoOp => {}
                    }
                }
                Err(err) if err.is_database_fault() => {
                    warn!(error = %err, "database fault mid-batch, rolling back");
                    session.rollback().await?;
                    return Err(err);
                }
                Err(err) => {
                    warn!(path = %event.path.display(), kind = ?event.kind, error = %err, "skipping event");
                    outcome.errors += 1;
                }
            }
        }

        session.commit().await?;
        Ok(outcome)
    }

    async fn apply_one<Sess: CatalogSession>(
        &self,
        session: &mut Sess,
        event: &FileEvent,
    ) -> Result<ApplyResult> {
        match event.kind {
            FileEventKind::Created => {
                self.apply_created(session, &event.path, &event.category).await
            }
            FileEventKind::Modified => {
                self.apply_modified(session, &event.path, &event.category).await
            }
            // A move is modeled as a delete of the source path; the watcher is
            // expected to follow up with a CREATED event for the destination.
            FileEventKind::Deleted | FileEventKind::Moved => {
                self.apply_deleted(session, &event.path).await
            }
        }
    }

    async fn apply_created<Sess: CatalogSession>(
        &self,
        session: &mut Sess,
        path: &Path,
        category: &str,
    ) -> Result<ApplyResult> {
        if !path.exists() {
            return Ok(ApplyResult::NoOp);
        }
        if !is_supported_extension(path) {
            return Ok(ApplyResult::NoOp);
        }

        let resolved = resolve_path_string(path);
        if session.get_by_path(&resolved).await?.is_some() {
            return Ok(ApplyResult::NoOp);
        }

        let metadata = extractor::extract(path)?;
        let filename = basename(path);
        let title = title_from_filename(&filename);
        let photo = Photo::new(resolved, filename, category.to_string(), title, &metadata, Utc::now());
        session.insert(&photo).await?;
        Ok(ApplyResult::Inserted)
    }

    async fn apply_modified<Sess: CatalogSession>(
        &self,
        session: &mut Sess,
        path: &Path,
        category: &str,
    ) -> Result<ApplyResult> {
        if !path.exists() {
            return Ok(ApplyResult::NoOp);
        }

        let resolved = resolve_path_string(path);
        let existing = session.get_by_path(&resolved).await?;
        let Some(existing) = existing else {
            return self.apply_created(session, path, category).await;
        };

        let metadata = extractor::extract(path)?;
        if metadata.file_modified_at == existing.file_modified_at {
            return Ok(ApplyResult::NoOp);
        }

        let updated = apply_modification(&existing, &metadata, category, path);
        session.update(&updated).await?;
        Ok(ApplyResult::Updated)
    }

    async fn apply_deleted<Sess: CatalogSession>(
        &self,
        session: &mut Sess,
        path: &Path,
    ) -> Result<ApplyResult> {
        let resolved = resolve_path_string(path);
        if let Some(existing) = session.get_by_path(&resolved).await? {
            session.delete_by_ids(&[existing.id]).await?;
            return Ok(ApplyResult::Deleted);
        }

        // The resolved form may not have matched a raw event path the watcher
        // never canonicalized; fall back to an exact lookup before giving up.
        let raw = path.to_string_lossy().to_string();
        if raw != resolved {
            if let Some(existing) = session.get_by_path(&raw).await? {
                session.delete_by_ids(&[existing.id]).await?;
                return Ok(ApplyResult::Deleted);
            }
        }

        Ok(ApplyResult::NoOp)
    }

    /// Ground-truth rebuild against the configured root (SPEC_FULL.md 4.3.2).
    #[instrument(skip(self, store), fields(root = %self.root.display()))]
    pub async fn full_sync<S: CatalogStore>(&self, store: &S) -> Result<SyncStats> {
        if !self.root.is_dir() {
            return Err(SyncError::Config(format!(
                "storage root {} does not exist or is not a directory",
                self.root.display()
            )));
        }

        let mut session = store.begin().await?;
        match self.full_sync_inner(&mut session).await {
            Ok(stats) => {
                session.commit().await?;
                debug!(?stats, "full sync committed");
                Ok(stats)
            }
            Err(err) => {
                let _ = session.rollback().await;
                Err(err)
            }
        }
    }

    async fn full_sync_inner<Sess: CatalogSession>(&self, session: &mut Sess) -> Result<SyncStats> {
        let mut stats = SyncStats::default();

        let existing_rows = session.scan_all().await?;
        let mut by_path: HashMap<String, Photo> = existing_rows
            .into_iter()
            .map(|row| (row.file_path.clone(), row))
            .collect();
        let mut found_paths: HashSet<String> = HashSet::new();

        let category_dirs = std::fs::read_dir(&self.root)?;
        for category_entry in category_dirs {
            let category_entry = match category_entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "failed to read a category directory entry");
                    stats.errors += 1;
                    continue;
                }
            };
            let category_path = category_entry.path();
            if !category_path.is_dir() {
                continue;
            }
            let category = category_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("uncategorized")
                .to_string();

            let files = match std::fs::read_dir(&category_path) {
                Ok(files) => files,
                Err(err) => {
                    warn!(category = %category, error = %err, "failed to read category directory");
                    stats.errors += 1;
                    continue;
                }
            };

            for file_entry in files {
                let file_entry = match file_entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(error = %err, "failed to read a file entry");
                        stats.errors += 1;
                        continue;
                    }
                };
                let file_path = file_entry.path();
                if !file_path.is_file() || !is_supported_extension(&file_path) {
                    continue;
                }

                stats.scanned += 1;
                self.reconcile_one_file(session, &file_path, &category, &mut by_path, &mut found_paths, &mut stats)
                    .await;
            }
        }

        let orphan_ids: Vec<String> = by_path
            .values()
            .filter(|row| !found_paths.contains(&row.file_path))
            .map(|row| row.id.clone())
            .collect();
        if !orphan_ids.is_empty() {
            stats.removed = session.delete_by_ids(&orphan_ids).await?;
        }

        Ok(stats)
    }

    async fn reconcile_one_file<Sess: CatalogSession>(
        &self,
        session: &mut Sess,
        file_path: &Path,
        category: &str,
        by_path: &mut HashMap<String, Photo>,
        found_paths: &mut HashSet<String>,
        stats: &mut SyncStats,
    ) {
        let resolved = resolve_path_string(file_path);
        found_paths.insert(resolved.clone());

        match by_path.get(&resolved) {
            None => match extractor::extract(file_path) {
                Ok(metadata) => {
                    let filename = basename(file_path);
                    let title = title_from_filename(&filename);
                    let photo = Photo::new(resolved, filename, category.to_string(), title, &metadata, Utc::now());
                    match session.insert(&photo).await {
                        Ok(()) => stats.added += 1,
                        Err(err) => {
                            warn!(path = %file_path.display(), error = %err, "failed to insert scanned file");
                            stats.errors += 1;
                        }
                    }
                }
                Err(err) => {
                    warn!(path = %file_path.display(), error = %err, "failed to stat scanned file");
                    stats.errors += 1;
                }
            },
            Some(existing) => match extractor::extract(file_path) {
                Ok(metadata) => {
                    if metadata.file_modified_at != existing.file_modified_at {
                        let updated = apply_modification(existing, &metadata, category, file_path);
                        match session.update(&updated).await {
                            Ok(()) => stats.updated += 1,
                            Err(err) => {
                                warn!(path = %file_path.display(), error = %err, "failed to update scanned file");
                                stats.errors += 1;
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(path = %file_path.display(), error = %err, "failed to stat scanned file");
                    stats.errors += 1;
                }
            },
        }
    }
}

/// Applies the MODIFIED update rules (SPEC_FULL.md 4.3.1) to build the new row,
/// capturing "was this title auto-generated" before any field changes.
fn apply_modification(
    existing: &Photo,
    metadata: &crate::types::ImageMetadata,
    category: &str,
    path: &Path,
) -> Photo {
    let title_is_auto =
        existing.title.is_empty() || existing.title == title_from_filename(&existing.filename);
    let filename = basename(path);
    let title = if title_is_auto {
        title_from_filename(&filename)
    } else {
        existing.title.clone()
    };

    Photo {
        filename,
        category: category.to_string(),
        title,
        file_size: metadata.file_size,
        width: metadata.width,
        height: metadata.height,
        file_modified_at: metadata.file_modified_at,
        updated_at: Utc::now(),
        ..existing.clone()
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Resolves symlinks in `path` when possible; falls back to resolving just the
/// parent directory (useful for a just-deleted file whose parent still
/// exists), and finally to the raw path string.
fn resolve_path_string(path: &Path) -> String {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved.to_string_lossy().into_owned();
    }
    if let Some(parent) = path.parent() {
        if let Ok(resolved_parent) = std::fs::canonicalize(parent) {
            if let Some(name) = path.file_name() {
                return resolved_parent.join(name).to_string_lossy().into_owned();
            }
        }
    }
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::types::ImageMetadata;
    use chrono::TimeZone;
    use std::fs;

    fn ts(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
    }

    fn write_file(dir: &Path, category: &str, name: &str, bytes: &[u8]) -> PathBuf {
        let category_dir = dir.join(category);
        fs::create_dir_all(&category_dir).unwrap();
        let path = category_dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn full_sync_inserts_a_new_category_and_file() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "cars", "IMG_20230615_sunset.jpg", b"fake-jpeg-bytes");

        let store = MemoryStore::new();
        let engine = ReconciliationEngine::new(dir.path().to_path_buf());
        let stats = engine.full_sync(&store).await.unwrap();

        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.added, 1);
        assert_eq!(stats.updated, 0);
        assert_eq!(stats.removed, 0);

        let rows = store.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, "cars");
        assert_eq!(rows[0].filename, "IMG_20230615_sunset.jpg");
        assert_eq!(rows[0].title, "Sunset");
    }

    #[tokio::test]
    async fn full_sync_ignores_non_category_files_and_unsupported_extensions() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a", "x.jpg", b"a");
        write_file(dir.path(), "b", "y.png", b"b");
        write_file(dir.path(), "c", "z.txt", b"not an image");
        fs::write(dir.path().join("README"), b"not in a category dir").unwrap();

        let store = MemoryStore::new();
        let engine = ReconciliationEngine::new(dir.path().to_path_buf());
        let stats = engine.full_sync(&store).await.unwrap();

        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.added, 2);
        let mut categories: Vec<_> = store.snapshot().into_iter().map(|p| p.category).collect();
        categories.sort();
        assert_eq!(categories, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn full_sync_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "cars", "a.jpg", b"a");
        write_file(dir.path(), "cars", "b.jpg", b"b");

        let store = MemoryStore::new();
        let engine = ReconciliationEngine::new(dir.path().to_path_buf());
        engine.full_sync(&store).await.unwrap();
        let first_pass = store.snapshot();

        let stats_second = engine.full_sync(&store).await.unwrap();
        let second_pass = store.snapshot();

        assert_eq!(stats_second.added, 0);
        assert_eq!(stats_second.updated, 0);
        assert_eq!(stats_second.removed, 0);
        assert_eq!(first_pass.len(), second_pass.len());
    }

    #[tokio::test]
    async fn full_sync_removes_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "cars", "gone.jpg", b"a");

        let store = MemoryStore::new();
        let engine = ReconciliationEngine::new(dir.path().to_path_buf());
        engine.full_sync(&store).await.unwrap();
        assert_eq!(store.snapshot().len(), 1);

        fs::remove_file(&path).unwrap();
        let stats = engine.full_sync(&store).await.unwrap();
        assert_eq!(stats.removed, 1);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn created_event_is_idempotent_on_watcher_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "cars", "a.jpg", b"a");

        let store = MemoryStore::new();
        let engine = ReconciliationEngine::new(dir.path().to_path_buf());
        let event = FileEvent::new(FileEventKind::Created, path, "cars".to_string());

        engine.apply(&store, &event).await.unwrap();
        let outcome = engine.apply(&store, &event).await.unwrap();

        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.processed, 1);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn deleted_event_for_missing_path_is_a_no_op() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let engine = ReconciliationEngine::new(dir.path().to_path_buf());
        let event = FileEvent::new(
            FileEventKind::Deleted,
            dir.path().join("cars").join("never-existed.jpg"),
            "cars".to_string(),
        );

        let outcome = engine.apply(&store, &event).await.unwrap();
        assert_eq!(outcome.removed, 0);
        assert_eq!(outcome.errors, 0);
    }

    #[tokio::test]
    async fn title_is_preserved_when_manually_set_and_regenerated_otherwise() {
        let metadata_v1 = ImageMetadata {
            file_size: 10,
            width: Some(100),
            height: Some(100),
            file_modified_at: ts(2024, 1, 2, 3, 4, 5),
        };
        let metadata_v2 = ImageMetadata {
            file_size: 20,
            width: Some(200),
            height: Some(200),
            file_modified_at: ts(2024, 1, 3, 0, 0, 0),
        };

        let mut auto_titled = Photo::new(
            "/root/cars/IMG_20230615_sunset.jpg".to_string(),
            "IMG_20230615_sunset.jpg".to_string(),
            "cars".to_string(),
            title_from_filename("IMG_20230615_sunset.jpg"),
            &metadata_v1,
            ts(2024, 1, 2, 3, 4, 5),
        );
        let regenerated = apply_modification(
            &auto_titled,
            &metadata_v2,
            "cars",
            Path::new("/root/cars/IMG_20230615_sunset.jpg"),
        );
        assert_eq!(regenerated.title, "Sunset");

        auto_titled.title = "My Best Sunset".to_string();
        let preserved = apply_modification(
            &auto_titled,
            &metadata_v2,
            "cars",
            Path::new("/root/cars/IMG_20230615_sunset.jpg"),
        );
        assert_eq!(preserved.title, "My Best Sunset");
    }
}
