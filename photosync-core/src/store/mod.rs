//! Catalog Store (C2): persistence for [`Photo`](crate::types::Photo) rows.
//!
//! The reconciliation engine (C3) never talks to a concrete backend; it
//! operates against a [`CatalogSession`] obtained from a [`CatalogStore`]
//! factory. A session wraps one transaction: callers either [`CatalogSession::commit`]
//! or [`CatalogSession::rollback`] it explicitly. Sessions are not `Clone` and
//! are not safe to share across concurrent tasks — each concurrent caller
//! opens its own.

pub mod memory;
pub mod postgres;

use crate::error::Result;
use crate::types::Photo;
use async_trait::async_trait;

/// Factory for catalog sessions. Implemented once per storage backend.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    type Session: CatalogSession;

    /// Opens a new unit-of-work. The caller must `commit` or `rollback` it.
    async fn begin(&self) -> Result<Self::Session>;

    /// Cheap round-trip used by the health surface (C7).
    async fn health(&self) -> bool;
}

/// A single unit of work against the catalog, scoped to one transaction.
#[async_trait]
pub trait CatalogSession: Send {
    async fn get_by_path(&mut self, file_path: &str) -> Result<Option<Photo>>;
    async fn scan_all(&mut self) -> Result<Vec<Photo>>;
    async fn insert(&mut self, photo: &Photo) -> Result<()>;
    async fn update(&mut self, photo: &Photo) -> Result<()>;
    async fn delete_by_ids(&mut self, ids: &[String]) -> Result<u64>;
    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}
