//! SQLite-backed catalog

use super::{decode_record, Catalog};
use crate::models::{CatalogRecord, CATALOG_SCHEMA_VERSION};
use async_trait::async_trait;
use chrono::Utc;
use picsort_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// Catalog stored in a single SQLite table
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    /// Open (creating if needed) the catalog database at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // WAL lets concurrent stage workers read while one writes
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        if newly_created {
            tracing::info!("Initialized new catalog: {}", db_path.display());
        } else {
            tracing::info!("Opened existing catalog: {}", db_path.display());
        }

        let catalog = Self { pool };
        catalog.init_tables().await?;
        Ok(catalog)
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS catalog (
                hash TEXT PRIMARY KEY,
                schema_version INTEGER NOT NULL,
                record TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Underlying pool (tests write raw rows through it)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn get(&self, hash: &str) -> Result<Option<CatalogRecord>> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT schema_version, record FROM catalog WHERE hash = ?")
                .bind(hash)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(version, json)| decode_record(hash, version, &json)))
    }

    async fn set(&self, hash: &str, record: &CatalogRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        sqlx::query(
            r#"
            INSERT INTO catalog (hash, schema_version, record, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(hash) DO UPDATE SET
                schema_version = excluded.schema_version,
                record = excluded.record,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(hash)
        .bind(i64::from(CATALOG_SCHEMA_VERSION))
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!(hash = %hash, "Saved catalog record");
        Ok(())
    }

    async fn iter_all(&self) -> Result<Vec<(String, CatalogRecord)>> {
        let rows: Vec<(String, i64, String)> =
            sqlx::query_as("SELECT hash, schema_version, record FROM catalog ORDER BY hash")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(hash, version, json)| {
                decode_record(&hash, version, &json).map(|record| (hash, record))
            })
            .collect())
    }

    async fn reset(&self) -> Result<()> {
        let result = sqlx::query("DELETE FROM catalog").execute(&self.pool).await?;
        tracing::info!(removed = result.rows_affected(), "Catalog reset");
        Ok(())
    }
}
