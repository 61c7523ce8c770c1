use serde::{Deserialize, Serialize};

/// Which container a post was listed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostParent {
    Forum(i64),
    Subforum(i64),
}

impl PostParent {
    /// `(forum_id, subforum_id)`; exactly one is set.
    #[must_use]
    pub fn columns(self) -> (Option<i64>, Option<i64>) {
        match self {
            Self::Forum(id) => (Some(id), None),
            Self::Subforum(id) => (None, Some(id)),
        }
    }
}

/// Counts of one bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub inserted: usize,
    pub failed: usize,
}

impl LoadReport {
    pub(crate) fn record<T, E>(&mut self, result: &Result<T, E>) {
        if result.is_ok() {
            self.inserted += 1;
        } else {
            self.failed += 1;
        }
    }

    pub(crate) fn absorb(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.failed += other.failed;
    }
}

/// A stored post row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredPost {
    pub id: i64,
    pub forum_id: Option<i64>,
    pub subforum_id: Option<i64>,
    pub title: String,
    pub link: String,
    pub author: String,
    pub replies_count: i64,
    pub views_count: i64,
    pub crawl_timestamp: String,
}

/// A stored detailed user row, with its presence flags.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredUserDetailed {
    pub id: i64,
    pub name: String,
    pub has_badge: bool,
    pub badge: Option<String>,
    pub has_trade_activity: bool,
    pub trade_points: Option<i64>,
    pub positive_feedbacks: Option<i64>,
    pub neutral_feedbacks: Option<i64>,
    pub negative_feedbacks: Option<i64>,
    pub has_feedback_statistic: bool,
    pub product_packaging: Option<String>,
    pub contact_delivery: Option<String>,
    pub product_service: Option<String>,
    pub has_fingerprint: bool,
    pub fingerprint: Option<String>,
    pub has_public_key: bool,
    pub public_key: Option<String>,
}

/// A stored feedback row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredFeedback {
    pub id: i64,
    pub user_id: i64,
    pub feedback_date: String,
    pub mark: String,
    pub comment: String,
    pub author: String,
}
