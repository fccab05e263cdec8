//! PostgreSQL result store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sbomer_core::error::StorageError;
use sbomer_core::pipeline::ResultStore;
use sbomer_core::types::{BatchStats, OperationLogEntry, SbomRecord, StoredSbom};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::StoreError;

static MIGRATOR: Migrator = sqlx::migrate!();

/// Opens a connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))
}

/// Applies the embedded migrations. Already-applied ones are skipped.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    MIGRATOR.run(pool).await?;
    info!("database migrations applied");
    Ok(())
}

type SbomRow = (
    i64,
    String,
    String,
    Vec<String>,
    Vec<u8>,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// [`ResultStore`] on a shared pool. Cheap to clone.
#[derive(Clone)]
pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn upsert(&self, record: &SbomRecord) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO sbom (project_uid, name, path, topics, sbom_data, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (project_uid) DO UPDATE SET
                name = EXCLUDED.name,
                path = EXCLUDED.path,
                topics = EXCLUDED.topics,
                sbom_data = EXCLUDED.sbom_data,
                updated_at = NOW()
            ",
        )
        .bind(record.project_uid)
        .bind(&record.name)
        .bind(&record.path)
        .bind(&record.topics)
        .bind(&record.sbom_document)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("upsert sbom"))?;

        debug!(project_uid = record.project_uid, "sbom upserted");
        Ok(())
    }

    async fn insert_log(&self, entry: &OperationLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO operations (project_id, operation, status, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(entry.project_id)
        .bind(entry.operation.as_str())
        .bind(entry.status.as_str())
        .bind(entry.error_message.as_deref())
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("append operation log"))?;
        Ok(())
    }

    async fn insert_stats(&self, stats: &BatchStats) -> Result<i64, StoreError> {
        sqlx::query_scalar(
            r"
            INSERT INTO fetch_stats (projects_count, batch_size, duration_seconds, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            ",
        )
        .bind(stats.projects_count)
        .bind(stats.batch_size)
        .bind(stats.duration_seconds)
        .bind(stats.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::query("append batch stats"))
    }

    async fn select_sbom(&self, project_uid: i64) -> Result<Option<StoredSbom>, StoreError> {
        let row: Option<SbomRow> = sqlx::query_as(
            r"
            SELECT project_uid, name, path, topics, sbom_data, created_at, updated_at
            FROM sbom
            WHERE project_uid = $1
            ",
        )
        .bind(project_uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::query("get sbom"))?;

        Ok(row.map(
            |(project_uid, name, path, topics, sbom_document, created_at, updated_at)| StoredSbom {
                record: SbomRecord {
                    project_uid,
                    name,
                    path,
                    topics,
                    sbom_document,
                },
                created_at,
                updated_at,
            },
        ))
    }
}

impl ResultStore for PgResultStore {
    async fn upsert_sbom(&self, record: &SbomRecord) -> Result<(), StorageError> {
        Ok(self.upsert(record).await?)
    }

    async fn append_log(&self, entry: &OperationLogEntry) -> Result<(), StorageError> {
        Ok(self.insert_log(entry).await?)
    }

    async fn append_batch_stats(&self, stats: &BatchStats) -> Result<i64, StorageError> {
        Ok(self.insert_stats(stats).await?)
    }

    async fn get_sbom(&self, project_uid: i64) -> Result<Option<StoredSbom>, StorageError> {
        Ok(self.select_sbom(project_uid).await?)
    }
}
