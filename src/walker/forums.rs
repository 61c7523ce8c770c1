use scraper::Html;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::dates::RunContext;
use crate::extract::{classify_forum_page, ListingExtractor, PageShape};
use crate::fetch::{resolve_link, FetchOutcome, Fetcher, SessionCredential};
use crate::records::{
    BoardSummary, ForumChildren, ForumSummary, PostSummary, SubforumSummary,
};

/// Result of one pass over the forum listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForumWalkOutcome {
    Completed(Vec<ForumSummary>),
    /// The top-level listing itself could not be fetched.
    ListingUnreachable,
    /// A forum page was neither a subforum list nor a posts view. Carries
    /// the forums completed before it.
    UnknownPageShape {
        url: String,
        partial: Vec<ForumSummary>,
    },
}

/// A fetched and classified forum page.
enum ForumPage {
    Subforums(Vec<BoardSummary>),
    Posts(Vec<PostSummary>),
    Unknown,
}

/// Walks the forum listing one level down into subforums.
///
/// A forum or subforum whose page cannot be fetched keeps no children and
/// the walk moves on; a page of unknown shape ends the walk.
#[derive(Debug)]
pub struct ForumWalker {
    fetcher: Fetcher,
    credential: SessionCredential,
    base_url: String,
    extractor: ListingExtractor,
}

impl ForumWalker {
    #[must_use]
    pub fn new(
        fetcher: Fetcher,
        credential: SessionCredential,
        base_url: impl Into<String>,
        ctx: RunContext,
    ) -> Self {
        Self {
            fetcher,
            credential,
            base_url: base_url.into(),
            extractor: ListingExtractor::new(ctx),
        }
    }

    pub async fn walk(&self) -> ForumWalkOutcome {
        let span = info_span!("forum_walk", base_url = %self.base_url);
        self.walk_listing().instrument(span).await
    }

    async fn walk_listing(&self) -> ForumWalkOutcome {
        info!("Started crawling the forums");

        let FetchOutcome::Success(body) = self.fetcher.fetch(&self.base_url, &self.credential).await
        else {
            error!("Forum listing is unreachable");
            return ForumWalkOutcome::ListingUnreachable;
        };
        let summaries = self.extractor.extract_forums(&Html::parse_document(&body));

        let total = summaries.len();
        let mut forums = Vec::with_capacity(total);
        for (idx, summary) in summaries.into_iter().enumerate() {
            info!("[{}/{}] Processing forum...", idx + 1, total);
            let url = resolve_link(&self.base_url, &summary.link);
            debug!(url = %url, "Processing forum");

            let mut forum = ForumSummary::new(summary);
            match self.fetch_page(&url).await {
                Some(ForumPage::Subforums(subforums)) => {
                    let subforums = self.walk_subforums(&url, subforums).await;
                    forum.children = Some(ForumChildren::Subforums(subforums));
                }
                Some(ForumPage::Posts(posts)) => {
                    debug!(url = %url, "Forum does not contain subforums");
                    forum.children = Some(ForumChildren::Posts(posts));
                }
                Some(ForumPage::Unknown) => {
                    error!(url = %url, "No matching page structure found, page is neither a posts view nor a subforum list");
                    return ForumWalkOutcome::UnknownPageShape {
                        url,
                        partial: forums,
                    };
                }
                None => warn!(url = %url, "No content for forum, keeping it without children"),
            }
            forums.push(forum);
        }

        info!(forums = forums.len(), "Finished crawling the forums");
        ForumWalkOutcome::Completed(forums)
    }

    async fn walk_subforums(
        &self,
        forum_url: &str,
        summaries: Vec<BoardSummary>,
    ) -> Vec<SubforumSummary> {
        let total = summaries.len();
        let mut subforums = Vec::with_capacity(total);
        for (idx, summary) in summaries.into_iter().enumerate() {
            let url = resolve_link(forum_url, &summary.link);
            debug!(url = %url, "[{}/{}] Processing subforum", idx + 1, total);

            let mut subforum = SubforumSummary::new(summary);
            match self.fetcher.fetch(&url, &self.credential).await {
                FetchOutcome::Success(body) => {
                    subforum.posts = Some(self.extractor.extract_posts(&Html::parse_document(&body)));
                }
                _ => warn!(url = %url, "No content for subforum, keeping it without posts"),
            }
            subforums.push(subforum);
        }
        subforums
    }

    async fn fetch_page(&self, url: &str) -> Option<ForumPage> {
        let FetchOutcome::Success(body) = self.fetcher.fetch(url, &self.credential).await else {
            return None;
        };
        let document = Html::parse_document(&body);
        Some(match classify_forum_page(&document) {
            PageShape::Subforums => ForumPage::Subforums(self.extractor.extract_subforums(&document)),
            PageShape::Posts => ForumPage::Posts(self.extractor.extract_posts(&document)),
            PageShape::Unknown => ForumPage::Unknown,
        })
    }
}
