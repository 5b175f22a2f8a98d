//! An in-memory [`CatalogStore`] used by the engine's test suite and by
//! anyone exercising the reconciliation engine without a live database.

use super::{CatalogSession, CatalogStore};
use crate::error::Result;
use crate::types::Photo;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    rows: Arc<Mutex<HashMap<String, Photo>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: snapshot every row currently committed to the store.
    pub fn snapshot(&self) -> Vec<Photo> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    type Session = MemorySession;

    async fn begin(&self) -> Result<Self::Session> {
        Ok(MemorySession {
            backing: self.rows.clone(),
            working: self.rows.lock().unwrap().clone(),
        })
    }

    async fn health(&self) -> bool {
        true
    }
}

/// A transaction-scoped view over [`MemoryStore`]'s rows. Mutations apply to
/// a private working copy until [`commit`](CatalogSession::commit), mirroring
/// the isolation a real database transaction provides.
#[derive(Debug)]
pub struct MemorySession {
    backing: Arc<Mutex<HashMap<String, Photo>>>,
    working: HashMap<String, Photo>,
}

#[async_trait]
impl CatalogSession for MemorySession {
    async fn get_by_path(&mut self, file_path: &str) -> Result<Option<Photo>> {
        Ok(self.working.get(file_path).cloned())
    }

    async fn scan_all(&mut self) -> Result<Vec<Photo>> {
        Ok(self.working.values().cloned().collect())
    }

    async fn insert(&mut self, photo: &Photo) -> Result<()> {
        if self.working.contains_key(&photo.file_path) {
            return Err(crate::error::SyncError::Internal(format!(
                "duplicate file_path on insert: {}",
                photo.file_path
            )));
        }
        self.working.insert(photo.file_path.clone(), photo.clone());
        Ok(())
    }

    async fn update(&mut self, photo: &Photo) -> Result<()> {
        self.working.insert(photo.file_path.clone(), photo.clone());
        Ok(())
    }

    async fn delete_by_ids(&mut self, ids: &[String]) -> Result<u64> {
        let before = self.working.len();
        self.working.retain(|_, row| !ids.contains(&row.id));
        Ok((before - self.working.len()) as u64)
    }

    async fn commit(self) -> Result<()> {
        *self.backing.lock().unwrap() = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
