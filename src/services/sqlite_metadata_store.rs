//! SQLite-backed metadata store.
//!
//! Records live in a single `records` table keyed by id; tags are nullable
//! columns so both schemas share one table. There are no secondary indices.

use crate::{
    models::record::{Record, RecordRow},
    services::metadata_store::{MetadataError, MetadataResult, MetadataStore},
};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");

const SELECT_COLUMNS: &str = "SELECT id, title, district, block, gp, polling_station, year, \
     uploader, filename, storage_path, size_bytes, uploaded_at, public_url FROM records";

#[derive(Clone)]
pub struct SqliteMetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Run the embedded schema migration statement by statement.
    pub async fn migrate(&self) -> MetadataResult<usize> {
        let statements = MIGRATION_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(statements.len())
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get_all(&self) -> MetadataResult<Vec<Record>> {
        let rows: Vec<RecordRow> = sqlx::query_as(SELECT_COLUMNS)
            .fetch_all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(Record::from).collect())
    }

    async fn get(&self, id: &str) -> MetadataResult<Option<Record>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(row.map(Record::from))
    }

    async fn set(&self, record: &Record) -> MetadataResult<()> {
        let tags = record.tags.as_ref();
        sqlx::query(
            r#"
            INSERT INTO records (
                id, title, district, block, gp, polling_station, year,
                uploader, filename, storage_path, size_bytes, uploaded_at, public_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                district = excluded.district,
                block = excluded.block,
                gp = excluded.gp,
                polling_station = excluded.polling_station,
                year = excluded.year,
                uploader = excluded.uploader,
                filename = excluded.filename,
                storage_path = excluded.storage_path,
                size_bytes = excluded.size_bytes,
                uploaded_at = excluded.uploaded_at,
                public_url = excluded.public_url
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(tags.map(|t| t.district.as_str()))
        .bind(tags.map(|t| t.block.as_str()))
        .bind(tags.map(|t| t.gp.as_str()))
        .bind(tags.map(|t| t.polling_station.as_str()))
        .bind(tags.map(|t| t.year.as_str()))
        .bind(&record.uploader)
        .bind(&record.filename)
        .bind(&record.storage_path)
        .bind(record.size_bytes)
        .bind(&record.uploaded_at)
        .bind(record.public_url.as_deref())
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn check(&self) -> MetadataResult<()> {
        let value = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if value != 1 {
            return Err(MetadataError::Backend(format!(
                "unexpected result: {value}"
            )));
        }
        Ok(())
    }
}
