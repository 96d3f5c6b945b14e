pub mod operations;
pub mod sqlite_schema;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::sqlite_schema::{split_sql_statements, SCHEMA_VERSION, SQLITE_SCHEMA_SQL};

#[derive(Clone)]
pub struct DatabaseProxy {
    pool: SqlitePool,
}

impl DatabaseProxy {
    /// Opens (creating if needed) the database file and applies the schema.
    pub async fn open(db_path: &Path) -> Result<Self, DbInitError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| DbInitError::Io(e.to_string()))?;
            }
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| DbInitError::Config(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        let proxy = Self { pool };
        proxy.run_migrations().await?;
        tracing::info!(path = %db_path.display(), "mastery database ready");

        Ok(proxy)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn schema_version(&self) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar(r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn run_migrations(&self) -> Result<(), DbInitError> {
        // The metadata table itself may not exist yet on a fresh file.
        if self.schema_version().await.ok().flatten().is_some() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for stmt in split_sql_statements(SQLITE_SCHEMA_SQL) {
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }
        sqlx::query(
            r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#,
        )
        .bind(SCHEMA_VERSION)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(version = SCHEMA_VERSION, "mastery schema applied");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer changed a row between our snapshot and our write.
    #[error("concurrent update detected for skill {skill_id}")]
    Conflict { skill_id: String },
    #[error("invalid stored value: {0}")]
    Decode(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
