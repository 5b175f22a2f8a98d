//! Core library for the photo catalog sync worker.
//!
//! This crate implements the Event Pipeline, the Reconciliation Engine, the
//! Catalog Store abstraction, and the Directory Watcher. The binary crate
//! (`photosync-worker`) composes these into a long-running daemon and adds
//! the health/stats HTTP surface and process lifecycle.

pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod health;
pub mod pipeline;
pub mod store;
pub mod title;
pub mod types;
pub mod watcher;

pub use config::Config;
pub use engine::{EventBatchOutcome, ReconciliationEngine};
pub use error::{Result, SyncError};
pub use health::HealthState;
pub use pipeline::EventPipeline;
pub use store::{memory::MemoryStore, postgres::PostgresStore, CatalogSession, CatalogStore};
pub use title::title_from_filename;
pub use types::{FileEvent, FileEventKind, ImageMetadata, Photo, SyncStats};
pub use watcher::DirectoryWatcher;
