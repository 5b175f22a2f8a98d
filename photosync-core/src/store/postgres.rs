//! PostgreSQL-backed [`CatalogStore`], the reference implementation of the
//! catalog schema described in SPEC_FULL.md section 6.

use super::{CatalogSession, CatalogStore};
use crate::error::{Result, SyncError};
use crate::types::Photo;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row, Transaction};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wraps an already-connected pool, e.g. one handed to a `#[sqlx::test]`.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SyncError::Database(sqlx::Error::Migrate(Box::new(e))))
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    type Session = PgSession<'static>;

    async fn begin(&self) -> Result<Self::Session> {
        let tx = self.pool.begin().await?;
        Ok(PgSession { tx: Some(tx) })
    }

    async fn health(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// One transaction-scoped unit of work. `tx` is `Some` until `commit` or
/// `rollback` consumes it; if a session is dropped without either, sqlx
/// rolls the underlying transaction back on drop, but we still log so that a
/// caller forgetting to close a session out is visible in the logs.
pub struct PgSession<'a> {
    tx: Option<Transaction<'a, Postgres>>,
}

impl<'a> std::fmt::Debug for PgSession<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSession")
            .field("open", &self.tx.is_some())
            .finish()
    }
}

impl<'a> Drop for PgSession<'a> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!("catalog session dropped without commit or rollback");
        }
    }
}

fn row_to_photo(row: &sqlx::postgres::PgRow) -> Result<Photo> {
    Ok(Photo {
        id: row.try_get("id")?,
        file_path: row.try_get("file_path")?,
        filename: row.try_get("filename")?,
        category: row.try_get("category")?,
        title: row.try_get("title")?,
        file_size: {
            let size: i64 = row.try_get("file_size")?;
            size as u64
        },
        width: row
            .try_get::<Option<i32>, _>("width")?
            .map(|w| w as u32),
        height: row
            .try_get::<Option<i32>, _>("height")?
            .map(|h| h as u32),
        file_modified_at: row.try_get("file_modified_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl<'a> CatalogSession for PgSession<'a> {
    async fn get_by_path(&mut self, file_path: &str) -> Result<Option<Photo>> {
        let tx = self.tx.as_mut().expect("session already closed");
        let row = sqlx::query("SELECT * FROM photos WHERE file_path = $1")
            .bind(file_path)
            .fetch_optional(&mut **tx)
            .await?;
        row.as_ref().map(row_to_photo).transpose()
    }

    async fn scan_all(&mut self) -> Result<Vec<Photo>> {
        let tx = self.tx.as_mut().expect("session already closed");
        let rows = sqlx::query("SELECT * FROM photos").fetch_all(&mut **tx).await?;
        rows.iter().map(row_to_photo).collect()
    }

    async fn insert(&mut self, photo: &Photo) -> Result<()> {
        let tx = self.tx.as_mut().expect("session already closed");
        sqlx::query(
            r#"
            INSERT INTO photos
                (id, file_path, filename, category, title, file_size, width, height,
                 file_modified_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&photo.id)
        .bind(&photo.file_path)
        .bind(&photo.filename)
        .bind(&photo.category)
        .bind(&photo.title)
        .bind(photo.file_size as i64)
        .bind(photo.width.map(|w| w as i32))
        .bind(photo.height.map(|h| h as i32))
        .bind(photo.file_modified_at)
        .bind(photo.created_at)
        .bind(photo.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update(&mut self, photo: &Photo) -> Result<()> {
        let tx = self.tx.as_mut().expect("session already closed");
        sqlx::query(
            r#"
            UPDATE photos
            SET filename = $2, category = $3, title = $4, file_size = $5, width = $6,
                height = $7, file_modified_at = $8, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(&photo.id)
        .bind(&photo.filename)
        .bind(&photo.category)
        .bind(&photo.title)
        .bind(photo.file_size as i64)
        .bind(photo.width.map(|w| w as i32))
        .bind(photo.height.map(|h| h as i32))
        .bind(photo.file_modified_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn delete_by_ids(&mut self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let tx = self.tx.as_mut().expect("session already closed");
        let result = sqlx::query("DELETE FROM photos WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(mut self) -> Result<()> {
        let tx = self.tx.take().expect("session already closed");
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        let tx = self.tx.take().expect("session already closed");
        tx.rollback().await?;
        Ok(())
    }
}
