use thiserror::Error;

/// Closed error taxonomy for the sync worker.
///
/// The variant a caller receives decides how the failure is handled upstream:
/// `Io` is swallowed per-file by the reconciliation engine, `Database` aborts
/// and rolls back the surrounding transaction, `Config` is fatal at startup,
/// and `Watch` is fatal to the watcher task that raised it.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("watcher error: {0}")]
    Watch(String),

    #[error("photo not found for path: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// True for faults the reconciliation engine should treat as a transaction-aborting
    /// database fault (see SPEC_FULL.md section 7) rather than a per-file, swallowable one.
    pub fn is_database_fault(&self) -> bool {
        matches!(self, SyncError::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
