use anyhow::{Context, Result};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use super::models::{LoadReport, PostParent, StoredFeedback, StoredPost, StoredUserDetailed};
use crate::records::{
    BoardSummary, FeedbackEntry, ForumChildren, ForumSummary, PostSummary, UserDetailedRecord,
    UserGeneralRecord, TIMESTAMP_FORMAT,
};

fn timestamp(value: &chrono::NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

// ========== Forums ==========

/// Insert a top-level forum, returning its ID.
pub async fn insert_forum(pool: &SqlitePool, forum: &BoardSummary) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO forums (element_type, crawl_timestamp, title, link, topics_count,
                            posts_count, last_post_date, last_post_author)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(forum.element_type.as_str())
    .bind(timestamp(&forum.crawl_timestamp))
    .bind(&forum.title)
    .bind(&forum.link)
    .bind(forum.topics_count)
    .bind(forum.posts_count)
    .bind(&forum.last_post_date)
    .bind(&forum.last_post_author)
    .execute(pool)
    .await
    .context("Failed to insert forum")?;

    Ok(result.last_insert_rowid())
}

/// Insert a subforum below an already stored forum, returning its ID.
pub async fn insert_subforum(pool: &SqlitePool, forum_id: i64, subforum: &BoardSummary) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO subforums (forum_id, element_type, crawl_timestamp, title, link,
                               topics_count, posts_count, last_post_date, last_post_author)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(forum_id)
    .bind(subforum.element_type.as_str())
    .bind(timestamp(&subforum.crawl_timestamp))
    .bind(&subforum.title)
    .bind(&subforum.link)
    .bind(subforum.topics_count)
    .bind(subforum.posts_count)
    .bind(&subforum.last_post_date)
    .bind(&subforum.last_post_author)
    .execute(pool)
    .await
    .context("Failed to insert subforum")?;

    Ok(result.last_insert_rowid())
}

/// Insert a post linked to the forum or subforum that listed it.
pub async fn insert_post(pool: &SqlitePool, parent: PostParent, post: &PostSummary) -> Result<i64> {
    let (forum_id, subforum_id) = parent.columns();
    let result = sqlx::query(
        r"
        INSERT INTO posts (forum_id, subforum_id, element_type, crawl_timestamp, title, link,
                           author, replies_count, views_count, last_post_date, last_post_author)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(forum_id)
    .bind(subforum_id)
    .bind(post.element_type.as_str())
    .bind(timestamp(&post.crawl_timestamp))
    .bind(&post.title)
    .bind(&post.link)
    .bind(&post.author)
    .bind(post.replies_count)
    .bind(post.views_count)
    .bind(&post.last_post_date)
    .bind(&post.last_post_author)
    .execute(pool)
    .await
    .context("Failed to insert post")?;

    Ok(result.last_insert_rowid())
}

async fn load_posts(pool: &SqlitePool, parent: PostParent, posts: &[PostSummary]) -> LoadReport {
    let mut report = LoadReport::default();
    for post in posts {
        let result = insert_post(pool, parent, post).await;
        if let Err(e) = &result {
            warn!(title = %post.title, ?parent, error = %e, "Failed to store post");
        }
        report.record(&result);
    }
    report
}

/// Store a forum forest, parents before children.
///
/// A forum or subforum that cannot be stored is counted as failed and its
/// children are skipped, since they would have nothing to link to.
pub async fn load_forums(pool: &SqlitePool, forums: &[ForumSummary]) -> LoadReport {
    let mut report = LoadReport::default();

    for forum in forums {
        let forum_id = match insert_forum(pool, &forum.summary).await {
            Ok(id) => {
                report.inserted += 1;
                id
            }
            Err(e) => {
                warn!(title = %forum.summary.title, error = %e, "Failed to store forum, skipping its children");
                report.failed += 1;
                continue;
            }
        };

        match &forum.children {
            Some(ForumChildren::Posts(posts)) => {
                report.absorb(load_posts(pool, PostParent::Forum(forum_id), posts).await);
            }
            Some(ForumChildren::Subforums(subforums)) => {
                for subforum in subforums {
                    let subforum_id = match insert_subforum(pool, forum_id, &subforum.summary).await {
                        Ok(id) => {
                            report.inserted += 1;
                            id
                        }
                        Err(e) => {
                            warn!(title = %subforum.summary.title, error = %e, "Failed to store subforum, skipping its posts");
                            report.failed += 1;
                            continue;
                        }
                    };
                    if let Some(posts) = &subforum.posts {
                        report.absorb(load_posts(pool, PostParent::Subforum(subforum_id), posts).await);
                    }
                }
            }
            None => debug!(title = %forum.summary.title, "Forum has no children to store"),
        }
    }

    info!(inserted = report.inserted, failed = report.failed, "Forums stored");
    report
}

/// Posts listed directly in a forum.
pub async fn get_posts_for_forum(pool: &SqlitePool, forum_id: i64) -> Result<Vec<StoredPost>> {
    sqlx::query_as(
        r"
        SELECT id, forum_id, subforum_id, title, link, author, replies_count, views_count, crawl_timestamp
        FROM posts WHERE forum_id = ? ORDER BY id
        ",
    )
    .bind(forum_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch posts for forum")
}

/// Posts listed in a subforum.
pub async fn get_posts_for_subforum(pool: &SqlitePool, subforum_id: i64) -> Result<Vec<StoredPost>> {
    sqlx::query_as(
        r"
        SELECT id, forum_id, subforum_id, title, link, author, replies_count, views_count, crawl_timestamp
        FROM posts WHERE subforum_id = ? ORDER BY id
        ",
    )
    .bind(subforum_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch posts for subforum")
}

// ========== Users ==========

/// Insert a user directory row, returning its ID.
pub async fn insert_user_general(pool: &SqlitePool, user: &UserGeneralRecord) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO users_general (name, title, profile_link, post_count, points,
                                   registration_date, crawl_timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&user.name)
    .bind(&user.title)
    .bind(&user.profile_link)
    .bind(user.post_count)
    .bind(user.points)
    .bind(&user.registration_date)
    .bind(timestamp(&user.crawl_timestamp))
    .execute(pool)
    .await
    .context("Failed to insert general user")?;

    Ok(result.last_insert_rowid())
}

pub async fn bulk_load_users_general(pool: &SqlitePool, users: &[UserGeneralRecord]) -> LoadReport {
    let mut report = LoadReport::default();
    for user in users {
        let result = insert_user_general(pool, user).await;
        if let Err(e) = &result {
            warn!(user = %user.name, error = %e, "Failed to store user");
        }
        report.record(&result);
    }
    info!(inserted = report.inserted, failed = report.failed, "General users stored");
    report
}

/// Insert a detailed user and its feedback entries, returning the user ID.
///
/// The user row and its feedback are written in one transaction; feedback is
/// inserted only once the user row has its ID.
pub async fn insert_user_detailed(pool: &SqlitePool, user: &UserDetailedRecord) -> Result<i64> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin transaction")?;

    let user_id = insert_user_detailed_row(&mut tx, user).await?;
    for entry in &user.feedback_entries {
        insert_feedback_entry(&mut tx, user_id, user, entry).await?;
    }

    tx.commit().await.context("Failed to commit detailed user")?;
    Ok(user_id)
}

async fn insert_user_detailed_row(conn: &mut SqliteConnection, user: &UserDetailedRecord) -> Result<i64> {
    let trade = user.trade_activity.as_ref();
    let stats = user.feedback_statistic.as_ref();

    let result = sqlx::query(
        r"
        INSERT INTO users_detailed (
            name, crawl_timestamp, title, post_count, points, registration_date,
            has_badge, badge,
            has_trade_activity, trade_points, positive_feedbacks, neutral_feedbacks, negative_feedbacks,
            has_feedback_statistic, product_packaging, contact_delivery, product_service,
            has_fingerprint, fingerprint,
            has_public_key, public_key
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&user.name)
    .bind(timestamp(&user.crawl_timestamp))
    .bind(&user.title)
    .bind(user.post_count)
    .bind(user.points)
    .bind(&user.registration_date)
    .bind(user.badge.is_some())
    .bind(&user.badge)
    .bind(trade.is_some())
    .bind(trade.map(|t| t.points))
    .bind(trade.map(|t| t.positive))
    .bind(trade.map(|t| t.neutral))
    .bind(trade.map(|t| t.negative))
    .bind(stats.is_some())
    .bind(stats.map(|s| s.packaging.as_str()))
    .bind(stats.map(|s| s.contact_delivery.as_str()))
    .bind(stats.map(|s| s.product.as_str()))
    .bind(user.fingerprint.is_some())
    .bind(&user.fingerprint)
    .bind(user.public_key.is_some())
    .bind(&user.public_key)
    .execute(&mut *conn)
    .await
    .context("Failed to insert detailed user")?;

    Ok(result.last_insert_rowid())
}

async fn insert_feedback_entry(
    conn: &mut SqliteConnection,
    user_id: i64,
    user: &UserDetailedRecord,
    entry: &FeedbackEntry,
) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO users_feedback (user_id, crawl_timestamp, feedback_date, mark, comment, author)
        VALUES (?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(user_id)
    .bind(timestamp(&user.crawl_timestamp))
    .bind(&entry.date)
    .bind(&entry.mark)
    .bind(&entry.comment)
    .bind(&entry.author)
    .execute(&mut *conn)
    .await
    .context("Failed to insert feedback entry")?;

    Ok(result.last_insert_rowid())
}

pub async fn bulk_load_users_detailed(pool: &SqlitePool, users: &[UserDetailedRecord]) -> LoadReport {
    let mut report = LoadReport::default();
    for user in users {
        let result = insert_user_detailed(pool, user).await;
        if let Err(e) = &result {
            warn!(user = %user.name, error = %e, "Failed to store detailed user");
        }
        report.record(&result);
    }
    info!(inserted = report.inserted, failed = report.failed, "Detailed users stored");
    report
}

pub async fn get_user_detailed(pool: &SqlitePool, id: i64) -> Result<Option<StoredUserDetailed>> {
    sqlx::query_as(
        r"
        SELECT id, name, has_badge, badge,
               has_trade_activity, trade_points, positive_feedbacks, neutral_feedbacks, negative_feedbacks,
               has_feedback_statistic, product_packaging, contact_delivery, product_service,
               has_fingerprint, fingerprint, has_public_key, public_key
        FROM users_detailed WHERE id = ?
        ",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch detailed user")
}

pub async fn get_feedback_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<StoredFeedback>> {
    sqlx::query_as(
        r"
        SELECT id, user_id, feedback_date, mark, comment, author
        FROM users_feedback WHERE user_id = ? ORDER BY id
        ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to fetch feedback for user")
}

/// Tables holding crawl results.
pub const CRAWL_TABLES: [&str; 6] = [
    "forums",
    "subforums",
    "posts",
    "users_general",
    "users_detailed",
    "users_feedback",
];

/// Row count of one of the crawler tables.
pub async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64> {
    anyhow::ensure!(CRAWL_TABLES.contains(&table), "Unknown table: {table}");

    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to count rows in {table}"))?;
    Ok(count)
}
