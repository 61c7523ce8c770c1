use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::{parse_count_field, required_attr, required_text, selector, FieldError};
use crate::dates::{DateNormalizer, RunContext};
use crate::records::{BoardSummary, ElementKind, PostSummary};

static FORUM_CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[class*="main-item"]"#));
static SUBFORUM_CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[class*="vf-subforum"]"#));
static POST_CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[class*="main-item"]"#));
static POSTS_VIEW_MARKER: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[class*="forum-views"]"#));

static FORUM_TITLE: LazyLock<Selector> =
    LazyLock::new(|| selector("div.item-subject > h3 > a > span"));
static FORUM_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector("div.item-subject > h3 > a[href]"));
static HEADING_LINK: LazyLock<Selector> = LazyLock::new(|| selector("div > h3 > a"));
static TOPICS: LazyLock<Selector> = LazyLock::new(|| selector("li.info-topics > strong"));
static POSTS: LazyLock<Selector> = LazyLock::new(|| selector("li.info-posts > strong"));
static REPLIES: LazyLock<Selector> = LazyLock::new(|| selector("li.info-replies > strong"));
static VIEWS: LazyLock<Selector> = LazyLock::new(|| selector("li.info-views > strong"));
static LAST_POST: LazyLock<Selector> =
    LazyLock::new(|| selector("li.info-lastpost > strong > a"));
static LAST_POST_AUTHOR: LazyLock<Selector> =
    LazyLock::new(|| selector("li.info-lastpost > cite"));
static POST_AUTHOR: LazyLock<Selector> = LazyLock::new(|| selector("p > span > cite"));

/// Class marking a post that was moved or removed.
const MOVED_CLASS: &str = "moved";

/// What a forum page turned out to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageShape {
    Subforums,
    Posts,
    Unknown,
}

/// Sniff a forum page for the subforum container, then the posts view.
#[must_use]
pub fn classify_forum_page(document: &Html) -> PageShape {
    if document.select(&SUBFORUM_CONTAINER).next().is_some() {
        PageShape::Subforums
    } else if document.select(&POSTS_VIEW_MARKER).next().is_some() {
        PageShape::Posts
    } else {
        PageShape::Unknown
    }
}

/// A record pulled out of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingRecord {
    Board(BoardSummary),
    Post(PostSummary),
}

/// Extracts forum, subforum and post summaries from listing pages.
///
/// A container missing any required field is skipped on its own; the rest
/// of the page is still extracted.
#[derive(Debug, Clone, Copy)]
pub struct ListingExtractor {
    ctx: RunContext,
    dates: DateNormalizer,
}

impl ListingExtractor {
    #[must_use]
    pub fn new(ctx: RunContext) -> Self {
        Self {
            ctx,
            dates: ctx.date_normalizer(),
        }
    }

    /// Extract every container of the given kind.
    #[must_use]
    pub fn extract_all(&self, kind: ElementKind, document: &Html) -> Vec<ListingRecord> {
        match kind {
            ElementKind::Forum => self
                .extract_forums(document)
                .into_iter()
                .map(ListingRecord::Board)
                .collect(),
            ElementKind::Subforum => self
                .extract_subforums(document)
                .into_iter()
                .map(ListingRecord::Board)
                .collect(),
            ElementKind::Post => self
                .extract_posts(document)
                .into_iter()
                .map(ListingRecord::Post)
                .collect(),
        }
    }

    #[must_use]
    pub fn extract_forums(&self, document: &Html) -> Vec<BoardSummary> {
        collect_containers(document, &FORUM_CONTAINER, ElementKind::Forum, |div| {
            self.forum(div).map(Some)
        })
    }

    #[must_use]
    pub fn extract_subforums(&self, document: &Html) -> Vec<BoardSummary> {
        collect_containers(document, &SUBFORUM_CONTAINER, ElementKind::Subforum, |div| {
            self.subforum(div).map(Some)
        })
    }

    #[must_use]
    pub fn extract_posts(&self, document: &Html) -> Vec<PostSummary> {
        collect_containers(document, &POST_CONTAINER, ElementKind::Post, |div| {
            if div.value().classes().any(|c| c.contains(MOVED_CLASS)) {
                debug!("Skipping post that no longer exists");
                return Ok(None);
            }
            self.post(div).map(Some)
        })
    }

    fn forum(&self, div: &ElementRef) -> Result<BoardSummary, FieldError> {
        Ok(BoardSummary {
            element_type: ElementKind::Forum,
            crawl_timestamp: self.ctx.crawl_timestamp(),
            title: required_text(div, &FORUM_TITLE, "title")?,
            link: required_attr(div, &FORUM_LINK, "href", "link")?,
            topics_count: parse_count_field("topics_count", &required_text(div, &TOPICS, "topics_count")?)?,
            posts_count: parse_count_field("posts_count", &required_text(div, &POSTS, "posts_count")?)?,
            last_post_date: self
                .dates
                .normalize(&required_text(div, &LAST_POST, "last_post_date")?),
            last_post_author: required_text(div, &LAST_POST_AUTHOR, "last_post_author")?,
        })
    }

    fn subforum(&self, div: &ElementRef) -> Result<BoardSummary, FieldError> {
        Ok(BoardSummary {
            element_type: ElementKind::Subforum,
            crawl_timestamp: self.ctx.crawl_timestamp(),
            title: required_text(div, &HEADING_LINK, "title")?,
            link: required_attr(div, &HEADING_LINK, "href", "link")?,
            topics_count: parse_count_field("topics_count", &required_text(div, &TOPICS, "topics_count")?)?,
            posts_count: parse_count_field("posts_count", &required_text(div, &POSTS, "posts_count")?)?,
            last_post_date: self
                .dates
                .normalize(&required_text(div, &LAST_POST, "last_post_date")?),
            last_post_author: required_text(div, &LAST_POST_AUTHOR, "last_post_author")?,
        })
    }

    fn post(&self, div: &ElementRef) -> Result<PostSummary, FieldError> {
        Ok(PostSummary {
            element_type: ElementKind::Post,
            crawl_timestamp: self.ctx.crawl_timestamp(),
            title: required_text(div, &HEADING_LINK, "title")?,
            link: required_attr(div, &HEADING_LINK, "href", "link")?,
            author: required_text(div, &POST_AUTHOR, "author")?,
            replies_count: parse_count_field("replies_count", &required_text(div, &REPLIES, "replies_count")?)?,
            views_count: parse_count_field("views_count", &required_text(div, &VIEWS, "views_count")?)?,
            last_post_date: self
                .dates
                .normalize(&required_text(div, &LAST_POST, "last_post_date")?),
            last_post_author: required_text(div, &LAST_POST_AUTHOR, "last_post_author")?,
        })
    }
}

/// Run `extract` over every container, skipping the ones that fail.
fn collect_containers<T>(
    document: &Html,
    container: &Selector,
    kind: ElementKind,
    mut extract: impl FnMut(&ElementRef) -> Result<Option<T>, FieldError>,
) -> Vec<T> {
    let containers: Vec<ElementRef> = document.select(container).collect();
    let total = containers.len();
    debug!(kind = %kind, total, "Extracting containers");

    let mut records = Vec::with_capacity(total);
    for (idx, div) in containers.iter().enumerate() {
        match extract(div) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => {
                warn!(kind = %kind, index = idx + 1, total, error = %e, "Could not extract container, skipping it");
            }
        }
    }
    records
}
