use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let version = current_version(pool).await?;

    if version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

pub(crate) async fn current_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating board structure tables");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS forums (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            element_type TEXT NOT NULL,
            crawl_timestamp TEXT NOT NULL,
            title TEXT NOT NULL,
            link TEXT NOT NULL,
            topics_count INTEGER NOT NULL,
            posts_count INTEGER NOT NULL,
            last_post_date TEXT NOT NULL,
            last_post_author TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create forums table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS subforums (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            forum_id INTEGER NOT NULL REFERENCES forums(id) ON DELETE CASCADE,
            element_type TEXT NOT NULL,
            crawl_timestamp TEXT NOT NULL,
            title TEXT NOT NULL,
            link TEXT NOT NULL,
            topics_count INTEGER NOT NULL,
            posts_count INTEGER NOT NULL,
            last_post_date TEXT NOT NULL,
            last_post_author TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create subforums table")?;

    // A post hangs off either a forum or a subforum, never both.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            forum_id INTEGER REFERENCES forums(id) ON DELETE CASCADE,
            subforum_id INTEGER REFERENCES subforums(id) ON DELETE CASCADE,
            element_type TEXT NOT NULL,
            crawl_timestamp TEXT NOT NULL,
            title TEXT NOT NULL,
            link TEXT NOT NULL,
            author TEXT NOT NULL,
            replies_count INTEGER NOT NULL,
            views_count INTEGER NOT NULL,
            last_post_date TEXT NOT NULL,
            last_post_author TEXT NOT NULL,
            CHECK ((forum_id IS NULL) != (subforum_id IS NULL))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create posts table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_subforums_forum_id ON subforums(forum_id)")
        .execute(pool)
        .await
        .context("Failed to create subforums forum_id index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_forum_id ON posts(forum_id)")
        .execute(pool)
        .await
        .context("Failed to create posts forum_id index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_subforum_id ON posts(subforum_id)")
        .execute(pool)
        .await
        .context("Failed to create posts subforum_id index")?;

    Ok(())
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: creating user tables");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS users_general (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            title TEXT NOT NULL,
            profile_link TEXT NOT NULL,
            post_count INTEGER NOT NULL,
            points INTEGER NOT NULL,
            registration_date TEXT NOT NULL,
            crawl_timestamp TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create users_general table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS users_detailed (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            crawl_timestamp TEXT NOT NULL,
            title TEXT NOT NULL,
            post_count INTEGER NOT NULL,
            points INTEGER NOT NULL,
            registration_date TEXT NOT NULL,
            has_badge INTEGER NOT NULL DEFAULT 0,
            badge TEXT,
            has_trade_activity INTEGER NOT NULL DEFAULT 0,
            trade_points INTEGER,
            positive_feedbacks INTEGER,
            neutral_feedbacks INTEGER,
            negative_feedbacks INTEGER,
            has_feedback_statistic INTEGER NOT NULL DEFAULT 0,
            product_packaging TEXT,
            contact_delivery TEXT,
            product_service TEXT,
            has_fingerprint INTEGER NOT NULL DEFAULT 0,
            fingerprint TEXT,
            has_public_key INTEGER NOT NULL DEFAULT 0,
            public_key TEXT
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create users_detailed table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS users_feedback (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users_detailed(id) ON DELETE CASCADE,
            crawl_timestamp TEXT NOT NULL,
            feedback_date TEXT NOT NULL,
            mark TEXT NOT NULL,
            comment TEXT NOT NULL,
            author TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create users_feedback table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_feedback_user_id ON users_feedback(user_id)")
        .execute(pool)
        .await
        .context("Failed to create users_feedback user_id index")?;

    Ok(())
}
