//! Records extracted from the board.
//!
//! Records are immutable once built by the extractors. Forums own either
//! subforums or posts, never both; that choice is carried by
//! [`ForumChildren`] so it cannot be violated by construction.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Format used for crawl timestamps, both in snapshots and in the database.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of listing element a record was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Forum,
    Subforum,
    Post,
}

impl ElementKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forum => "forum",
            Self::Subforum => "subforum",
            Self::Post => "post",
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by forum and subforum summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSummary {
    pub element_type: ElementKind,
    #[serde(with = "timestamp")]
    pub crawl_timestamp: NaiveDateTime,
    pub title: String,
    pub link: String,
    pub topics_count: i64,
    pub posts_count: i64,
    pub last_post_date: String,
    pub last_post_author: String,
}

/// A top-level forum and whatever the walker found below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumSummary {
    #[serde(flatten)]
    pub summary: BoardSummary,
    /// `None` when the forum page could not be fetched.
    #[serde(flatten)]
    pub children: Option<ForumChildren>,
}

impl ForumSummary {
    #[must_use]
    pub fn new(summary: BoardSummary) -> Self {
        Self {
            summary,
            children: None,
        }
    }

    #[must_use]
    pub fn subforums(&self) -> Option<&[SubforumSummary]> {
        match &self.children {
            Some(ForumChildren::Subforums(subforums)) => Some(subforums),
            _ => None,
        }
    }

    #[must_use]
    pub fn posts(&self) -> Option<&[PostSummary]> {
        match &self.children {
            Some(ForumChildren::Posts(posts)) => Some(posts),
            _ => None,
        }
    }
}

/// Children of a forum: subforums XOR direct posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForumChildren {
    Subforums(Vec<SubforumSummary>),
    Posts(Vec<PostSummary>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubforumSummary {
    #[serde(flatten)]
    pub summary: BoardSummary,
    /// `None` when the subforum page could not be fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts: Option<Vec<PostSummary>>,
}

impl SubforumSummary {
    #[must_use]
    pub fn new(summary: BoardSummary) -> Self {
        Self {
            summary,
            posts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    pub element_type: ElementKind,
    #[serde(with = "timestamp")]
    pub crawl_timestamp: NaiveDateTime,
    pub title: String,
    pub link: String,
    pub author: String,
    pub replies_count: i64,
    pub views_count: i64,
    pub last_post_date: String,
    pub last_post_author: String,
}

/// One row of the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGeneralRecord {
    pub name: String,
    pub title: String,
    pub profile_link: String,
    pub post_count: i64,
    pub points: i64,
    pub registration_date: String,
    #[serde(with = "timestamp")]
    pub crawl_timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeActivity {
    pub points: i64,
    pub positive: i64,
    pub neutral: i64,
    pub negative: i64,
}

/// Average feedback grades, as displayed by the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackStatistic {
    pub packaging: String,
    pub contact_delivery: String,
    pub product: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub date: String,
    pub mark: String,
    pub comment: String,
    pub author: String,
}

/// The five optional sections of a user's profile page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDetails {
    pub badge: Option<String>,
    pub trade_activity: Option<TradeActivity>,
    pub feedback_statistic: Option<FeedbackStatistic>,
    pub feedback_entries: Option<Vec<FeedbackEntry>>,
    pub fingerprint: Option<String>,
    pub public_key: Option<String>,
}

/// A directory row merged with its profile page.
///
/// Optional sections serialize as explicit `null`, never as a missing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetailedRecord {
    pub name: String,
    #[serde(with = "timestamp")]
    pub crawl_timestamp: NaiveDateTime,
    pub title: String,
    pub post_count: i64,
    pub points: i64,
    pub registration_date: String,
    pub badge: Option<String>,
    pub trade_activity: Option<TradeActivity>,
    pub feedback_statistic: Option<FeedbackStatistic>,
    pub fingerprint: Option<String>,
    pub public_key: Option<String>,
    pub feedback_entries: Vec<FeedbackEntry>,
}

impl UserDetailedRecord {
    /// Merge a directory row with the details scraped from its profile.
    #[must_use]
    pub fn merge(general: UserGeneralRecord, details: ProfileDetails) -> Self {
        Self {
            name: general.name,
            crawl_timestamp: general.crawl_timestamp,
            title: general.title,
            post_count: general.post_count,
            points: general.points,
            registration_date: general.registration_date,
            badge: details.badge,
            trade_activity: details.trade_activity,
            feedback_statistic: details.feedback_statistic,
            fingerprint: details.fingerprint,
            public_key: details.public_key,
            feedback_entries: details.feedback_entries.unwrap_or_default(),
        }
    }
}

/// Serde adapter storing timestamps as `%Y-%m-%d %H:%M:%S`.
mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
