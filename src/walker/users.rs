use std::collections::HashSet;

use scraper::Html;
use tracing::{debug, info, info_span, warn, Instrument};

use super::captcha::{resolve_captcha, OperatorDecisionSource, RecoveryOutcome};
use crate::dates::RunContext;
use crate::extract::{extract_profile_details, UserListExtractor};
use crate::fetch::{resolve_link, FetchOutcome, Fetcher, SessionCredential};
use crate::records::{ProfileDetails, UserDetailedRecord, UserGeneralRecord};

/// Why a user directory walk stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkTermination {
    /// No further page was declared.
    Exhausted,
    /// A listing page could not be fetched.
    FetchFailed { url: String },
    /// The operator chose to stop at a captcha wall.
    OperatorAborted,
}

/// Users collected by a walk, and why it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserWalk<R> {
    pub users: Vec<R>,
    pub termination: WalkTermination,
    pub pages_visited: usize,
}

enum PageStep {
    Rows {
        page_url: String,
        rows: Vec<UserGeneralRecord>,
    },
    Finished(WalkTermination),
}

enum ProfileFetch {
    Document(String),
    Unavailable,
    Aborted,
}

/// Walks the paginated user directory by following `rel="next"` links.
///
/// Each page is extracted at most once, and pagination never moves to a page
/// that was already visited, so cyclic `next` links still terminate.
#[derive(Debug)]
pub struct UserDirectoryWalker {
    fetcher: Fetcher,
    credential: SessionCredential,
    extractor: UserListExtractor,
    current_page: Option<String>,
    visited: HashSet<String>,
}

impl UserDirectoryWalker {
    #[must_use]
    pub fn new(
        fetcher: Fetcher,
        credential: SessionCredential,
        start_url: impl Into<String>,
        ctx: RunContext,
    ) -> Self {
        Self {
            fetcher,
            credential,
            extractor: UserListExtractor::new(ctx),
            current_page: Some(start_url.into()),
            visited: HashSet::new(),
        }
    }

    /// The credential currently in use; the operator may have replaced it.
    #[must_use]
    pub fn credential(&self) -> &SessionCredential {
        &self.credential
    }

    /// Collect the directory rows only.
    pub async fn walk_general(mut self) -> UserWalk<UserGeneralRecord> {
        let span = info_span!("user_walk", variant = "general", start = ?self.current_page);
        async move {
            info!("General user crawl: collecting the user directory");
            let mut users = Vec::new();
            let termination = loop {
                match self.advance(None).await {
                    PageStep::Rows { rows, .. } => users.extend(rows),
                    PageStep::Finished(termination) => break termination,
                }
            };
            info!(users = users.len(), ?termination, "User crawl finished");
            UserWalk {
                users,
                termination,
                pages_visited: self.visited.len(),
            }
        }
        .instrument(span)
        .await
    }

    /// Collect the directory rows and visit every user's profile.
    ///
    /// Captcha walls on any fetch are handed to `operator`. If the operator
    /// aborts, the users completed so far are returned.
    pub async fn walk_detailed(
        mut self,
        operator: &mut dyn OperatorDecisionSource,
    ) -> UserWalk<UserDetailedRecord> {
        let span = info_span!("user_walk", variant = "detailed", start = ?self.current_page);
        async move {
            info!("Detailed user crawl: collecting users including their profiles");
            let mut users = Vec::new();
            let termination = 'pages: loop {
                let (page_url, rows) = match self.advance(Some(&mut *operator)).await {
                    PageStep::Rows { page_url, rows } => (page_url, rows),
                    PageStep::Finished(termination) => break termination,
                };

                let total = rows.len();
                for (idx, row) in rows.into_iter().enumerate() {
                    let profile_url = resolve_link(&page_url, &row.profile_link);
                    debug!(user = %row.name, url = %profile_url, "Connecting to profile");

                    let details = match self.fetch_profile(&profile_url, &mut *operator).await {
                        ProfileFetch::Document(body) => {
                            extract_profile_details(&Html::parse_document(&body))
                        }
                        ProfileFetch::Unavailable => {
                            warn!(user = %row.name, url = %profile_url, "Profile unavailable, keeping directory data only");
                            ProfileDetails::default()
                        }
                        ProfileFetch::Aborted => break 'pages WalkTermination::OperatorAborted,
                    };
                    users.push(UserDetailedRecord::merge(row, details));
                    debug!("{}/{} users crawled on this page", idx + 1, total);
                }
            };
            info!(users = users.len(), ?termination, "User crawl finished");
            UserWalk {
                users,
                termination,
                pages_visited: self.visited.len(),
            }
        }
        .instrument(span)
        .await
    }

    /// Fetch and extract the current page, then move to the next one.
    async fn advance(&mut self, operator: Option<&mut dyn OperatorDecisionSource>) -> PageStep {
        let Some(url) = self.current_page.take() else {
            return PageStep::Finished(WalkTermination::Exhausted);
        };
        debug!(url = %url, "Connecting to user list page");

        let body = match (self.fetcher.fetch(&url, &self.credential).await, operator) {
            (FetchOutcome::Success(body), _) => body,
            (FetchOutcome::CaptchaWall(_), Some(operator)) => {
                match resolve_captcha(&self.fetcher, &mut self.credential, operator, &url).await {
                    RecoveryOutcome::Cleared(body) => body,
                    RecoveryOutcome::Aborted => {
                        return PageStep::Finished(WalkTermination::OperatorAborted)
                    }
                }
            }
            (outcome, _) => {
                warn!(url = %url, outcome = outcome.label(), "Failed to retrieve user list page, stopping");
                return PageStep::Finished(WalkTermination::FetchFailed { url });
            }
        };

        let page = self
            .extractor
            .extract_page(&Html::parse_document(&body), &url);

        info!(url = %url, "Scraping users from page");
        let rows = page.rows.unwrap_or_default();

        // Pages are queued only while unvisited.
        self.visited.insert(url.clone());
        self.current_page = match page.next {
            Some(next) if self.visited.contains(&next) => {
                warn!(url = %url, next = %next, "Next page was already visited, ending pagination");
                None
            }
            next => next,
        };

        PageStep::Rows {
            page_url: url,
            rows,
        }
    }

    async fn fetch_profile(
        &mut self,
        url: &str,
        operator: &mut dyn OperatorDecisionSource,
    ) -> ProfileFetch {
        match self.fetcher.fetch(url, &self.credential).await {
            FetchOutcome::Success(body) => ProfileFetch::Document(body),
            FetchOutcome::CaptchaWall(_) => {
                match resolve_captcha(&self.fetcher, &mut self.credential, operator, url).await {
                    RecoveryOutcome::Cleared(body) => ProfileFetch::Document(body),
                    RecoveryOutcome::Aborted => ProfileFetch::Aborted,
                }
            }
            _ => ProfileFetch::Unavailable,
        }
    }
}
