// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Embedded schema; applied idempotently at startup.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS queue (
    domain            TEXT PRIMARY KEY,
    source            TEXT NOT NULL DEFAULT '',
    status            TEXT NOT NULL DEFAULT 'PENDING',
    attempts          INTEGER NOT NULL DEFAULT 0,
    lease_expires_at  TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_queue_status ON queue(status);

CREATE TABLE IF NOT EXISTS results (
    domain                  TEXT PRIMARY KEY,
    run_id                  TEXT NOT NULL,
    crawled_at              TEXT NOT NULL,
    legal_source_url        TEXT NOT NULL,
    legal_name              TEXT,
    legal_name_source       TEXT,
    legal_name_confidence   REAL,
    legal_form              TEXT,
    legal_form_source       TEXT,
    legal_form_confidence   REAL,
    registration_number     TEXT,
    register_court          TEXT,
    register_type           TEXT,
    vat_id                  TEXT,
    street                  TEXT,
    postal_code             TEXT,
    city                    TEXT,
    country                 TEXT,
    address_source          TEXT,
    address_confidence      REAL,
    ceo                     TEXT,
    directors               TEXT,
    emails                  TEXT,
    emails_source           TEXT,
    emails_confidence       REAL,
    phones                  TEXT,
    phones_source           TEXT,
    phones_confidence       REAL,
    fax                     TEXT,
    robots_allowed          INTEGER NOT NULL DEFAULT 1,
    robots_reason           TEXT,
    confidence              REAL NOT NULL DEFAULT 0
);
"#;

#[derive(Clone)]
pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open database: {database_url}"))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply the embedded schema and enable foreign keys.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON").execute(&self.pool).await?;
        sqlx::query("PRAGMA journal_mode = WAL").execute(&self.pool).await?;

        for statement in SCHEMA_SQL.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        let queued = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM queue")
            .fetch_one(&self.pool)
            .await?;
        let results = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM results")
            .fetch_one(&self.pool)
            .await?;
        info!("📊 Database ready: {} queued domains, {} results", queued, results);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection_and_migration() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;
        assert!(!db.pool().is_closed());

        db.migrate().await?;

        let queue_table =
            sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='queue'")
                .fetch_optional(db.pool())
                .await?;
        let results_table =
            sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='results'")
                .fetch_optional(db.pool())
                .await?;

        assert!(queue_table.is_some());
        assert!(results_table.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("twice.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;
        db.migrate().await?;
        db.migrate().await?;
        Ok(())
    }
}
