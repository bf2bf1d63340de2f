//! Metadata store contract and the SQLite implementation.
//!
//! The metadata store is the system of record for an image's existence.

use crate::models::image::{CustomMetadata, ImageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite};
use thiserror::Error;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum MetadataStoreError {
    #[error("metadata store timed out")]
    Timeout,
    #[error("record `{image_id}` is corrupt: {source}")]
    Serialization {
        image_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for MetadataStoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => MetadataStoreError::Timeout,
            other => MetadataStoreError::Sqlx(other),
        }
    }
}

pub type MetadataResult<T> = Result<T, MetadataStoreError>;

/// Structured storage for [`ImageRecord`]s keyed by `image_id`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert or replace the record stored under `image_id`.
    async fn put(&self, image_id: &str, record: &ImageRecord) -> MetadataResult<()>;

    async fn get(&self, image_id: &str) -> MetadataResult<Option<ImageRecord>>;

    /// Remove the record. Removing a missing record succeeds.
    async fn delete(&self, image_id: &str) -> MetadataResult<()>;

    /// Read up to `limit` records; `None` reads the whole collection.
    async fn scan(&self, limit: Option<usize>) -> MetadataResult<Vec<ImageRecord>>;

    async fn health_check(&self) -> MetadataResult<()>;
}

#[derive(FromRow)]
struct ImageRow {
    image_id: String,
    owner_id: String,
    filename: String,
    storage_key: String,
    content_type: String,
    size_bytes: i64,
    custom_metadata: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ImageRow> for ImageRecord {
    type Error = MetadataStoreError;

    fn try_from(row: ImageRow) -> MetadataResult<Self> {
        let custom_metadata = row
            .custom_metadata
            .as_deref()
            .map(serde_json::from_str::<CustomMetadata>)
            .transpose()
            .map_err(|source| MetadataStoreError::Serialization {
                image_id: row.image_id.clone(),
                source,
            })?;

        Ok(ImageRecord {
            image_id: row.image_id,
            owner_id: row.owner_id,
            filename: row.filename,
            storage_key: row.storage_key,
            content_type: row.content_type,
            size_bytes: row.size_bytes.max(0) as u64,
            custom_metadata,
            created_at: row.created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT image_id, owner_id, filename, storage_key, content_type, \
     size_bytes, custom_metadata, created_at FROM images";

/// SQLite-backed metadata store.
#[derive(Clone, Debug)]
pub struct SqliteMetadataStore {
    db: SqlitePool,
}

impl SqliteMetadataStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> MetadataResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());
        for stmt in statements {
            tracing::debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn put(&self, image_id: &str, record: &ImageRecord) -> MetadataResult<()> {
        let custom_metadata = record
            .custom_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|source| MetadataStoreError::Serialization {
                image_id: image_id.to_string(),
                source,
            })?;

        sqlx::query(
            r#"
            INSERT INTO images (
                image_id, owner_id, filename, storage_key, content_type,
                size_bytes, custom_metadata, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(image_id) DO UPDATE SET
                owner_id = excluded.owner_id,
                filename = excluded.filename,
                storage_key = excluded.storage_key,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                custom_metadata = excluded.custom_metadata,
                created_at = excluded.created_at
            "#,
        )
        .bind(image_id)
        .bind(&record.owner_id)
        .bind(&record.filename)
        .bind(&record.storage_key)
        .bind(&record.content_type)
        .bind(record.size_bytes as i64)
        .bind(custom_metadata)
        .bind(record.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn get(&self, image_id: &str) -> MetadataResult<Option<ImageRecord>> {
        let row = sqlx::query_as::<_, ImageRow>(&format!("{SELECT_COLUMNS} WHERE image_id = ?"))
            .bind(image_id)
            .fetch_optional(&self.db)
            .await?;

        row.map(ImageRecord::try_from).transpose()
    }

    async fn delete(&self, image_id: &str) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM images WHERE image_id = ?")
            .bind(image_id)
            .execute(&self.db)
            .await?;
        tracing::debug!(image_id, removed = result.rows_affected(), "deleted metadata");
        Ok(())
    }

    async fn scan(&self, limit: Option<usize>) -> MetadataResult<Vec<ImageRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        builder.push(" ORDER BY created_at ASC, image_id ASC");
        if let Some(limit) = limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }

        let rows: Vec<ImageRow> = builder.build_query_as().fetch_all(&self.db).await?;
        rows.into_iter().map(ImageRecord::try_from).collect()
    }

    async fn health_check(&self) -> MetadataResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.db)
            .await?;
        if one != 1 {
            return Err(MetadataStoreError::Sqlx(sqlx::Error::Protocol(format!(
                "unexpected probe result: {one}"
            ))));
        }
        Ok(())
    }
}
