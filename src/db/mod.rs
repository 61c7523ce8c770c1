//! SQLite persistence for crawl results.
//!
//! Forums, subforums and posts keep their hierarchy through foreign keys.
//! Users land in `users_general` or `users_detailed`, the latter with one
//! `users_feedback` row per feedback entry.

mod migrations;
mod models;
mod queries;

pub use models::*;
pub use queries::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::info;

use crate::records::{ForumSummary, UserDetailedRecord, UserGeneralRecord};

/// Handle on the crawl database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

fn connect_options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(10))
}

impl Database {
    /// Open the crawl database at `path`, creating the file and its
    /// directory if needed, and bring the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created, a
    /// migration fails, or the file is read-only.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create database directory: {}", dir.display()))?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options(path))
            .await
            .with_context(|| format!("Failed to open crawl database: {}", path.display()))?;

        let db = Self {
            pool,
            path: path.to_path_buf(),
        };
        migrations::run(&db.pool).await?;
        db.ensure_writable().await?;

        info!(path = %path.display(), schema_version = db.schema_version().await?, "Crawl database ready");
        Ok(db)
    }

    // A read-only file would otherwise only fail once the crawl is over.
    async fn ensure_writable(&self) -> Result<()> {
        let tx = self.pool.begin().await.with_context(|| {
            format!(
                "Crawl database is not writable (path: {}). Check file permissions",
                self.path.display()
            )
        })?;
        tx.commit()
            .await
            .context("Failed to commit crawl database writability check")
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applied schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version table cannot be read.
    pub async fn schema_version(&self) -> Result<i32> {
        migrations::current_version(&self.pool).await
    }

    /// Store a forum forest. See [`load_forums`].
    pub async fn store_forums(&self, forums: &[ForumSummary]) -> LoadReport {
        load_forums(&self.pool, forums).await
    }

    pub async fn store_users_general(&self, users: &[UserGeneralRecord]) -> LoadReport {
        bulk_load_users_general(&self.pool, users).await
    }

    pub async fn store_users_detailed(&self, users: &[UserDetailedRecord]) -> LoadReport {
        bulk_load_users_detailed(&self.pool, users).await
    }

    /// Row count of every crawler table, in schema order.
    ///
    /// # Errors
    ///
    /// Returns an error if a table cannot be counted.
    pub async fn row_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        let mut counts = Vec::with_capacity(CRAWL_TABLES.len());
        for table in CRAWL_TABLES {
            counts.push((table, count_rows(&self.pool, table).await?));
        }
        Ok(counts)
    }
}
