//! Page fetching and response classification.
//!
//! The fetcher never fails: every response, including transport errors, is
//! mapped onto a [`FetchOutcome`] and the walkers decide what to do with it.

mod transport;

pub use transport::*;

use std::sync::{Arc, LazyLock};

use scraper::{Html, Selector};
use tracing::{debug, error, warn};
use url::Url;

/// Marker of the decoy page served for stale or invalid sessions.
const PHISHING_MARKER: &str = "phishing";

static CAPTCHA_IFRAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"iframe[name="captcha"]"#).expect("Invalid selector"));

/// Classified result of a single GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// HTTP 200 with no anti-bot marker.
    Success(String),
    /// Decoy "phishing mirror" page: the session is stale or invalid.
    Challenge(String),
    /// The board's interactive captcha wall.
    CaptchaWall(String),
    /// Any other HTTP status.
    HttpError(u16),
    /// The request never produced a response.
    Unreachable(String),
}

impl FetchOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short label used in log fields.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Challenge(_) => "challenge",
            Self::CaptchaWall(_) => "captcha_wall",
            Self::HttpError(_) => "http_error",
            Self::Unreachable(_) => "unreachable",
        }
    }
}

/// Classify a raw response.
///
/// The phishing marker wins over everything else, then the captcha wall,
/// then the status code.
#[must_use]
pub fn classify(response: RawResponse) -> FetchOutcome {
    if response.body.to_lowercase().contains(PHISHING_MARKER) {
        return FetchOutcome::Challenge(response.body);
    }
    if has_captcha_wall(&response.body) {
        return FetchOutcome::CaptchaWall(response.body);
    }
    if response.status == 200 {
        FetchOutcome::Success(response.body)
    } else {
        FetchOutcome::HttpError(response.status)
    }
}

/// Whether the document embeds the board's captcha iframe.
#[must_use]
pub fn has_captcha_wall(body: &str) -> bool {
    if !body.contains("captcha") {
        return false;
    }
    Html::parse_document(body)
        .select(&CAPTCHA_IFRAME)
        .next()
        .is_some()
}

/// Resolve an href found on `page_url` to an absolute URL.
///
/// Absolute hrefs come back unchanged; if `page_url` is not a URL the href
/// is returned as-is.
#[must_use]
pub fn resolve_link(page_url: &str, href: &str) -> String {
    Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map_or_else(|_| href.to_string(), String::from)
}

/// Issues GETs through a [`Transport`] and classifies the responses.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
}

impl Fetcher {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetch `url` once. No retries happen here.
    pub async fn fetch(&self, url: &str, credential: &SessionCredential) -> FetchOutcome {
        debug!(url = %url, "Sending request");

        let outcome = match self.transport.get(url, credential).await {
            Ok(response) => classify(response),
            Err(e) => FetchOutcome::Unreachable(e.to_string()),
        };

        match &outcome {
            FetchOutcome::Success(_) => debug!(url = %url, "Received response"),
            FetchOutcome::Challenge(_) => {
                error!(url = %url, "Received phishing mirror response, session cookie is probably invalid");
            }
            FetchOutcome::CaptchaWall(_) => warn!(url = %url, "Received captcha wall"),
            FetchOutcome::HttpError(status) => {
                error!(url = %url, status, "Received unexpected response status");
            }
            FetchOutcome::Unreachable(reason) => {
                error!(url = %url, reason = %reason, "Request failed");
            }
        }

        outcome
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_classify_success() {
        assert_eq!(
            classify(response(200, "<html><body>ok</body></html>")),
            FetchOutcome::Success("<html><body>ok</body></html>".to_string())
        );
    }

    #[test]
    fn test_classify_phishing_beats_status() {
        let outcome = classify(response(200, "<h1>Phishing Mirror detected</h1>"));
        assert!(matches!(outcome, FetchOutcome::Challenge(_)));

        let outcome = classify(response(503, "this is a PHISHING page"));
        assert!(matches!(outcome, FetchOutcome::Challenge(_)));
    }

    #[test]
    fn test_classify_captcha_wall() {
        let body = r#"<html><body><iframe name="captcha" src="/c.php"></iframe></body></html>"#;
        assert!(matches!(
            classify(response(200, body)),
            FetchOutcome::CaptchaWall(_)
        ));
    }

    #[test]
    fn test_captcha_word_without_iframe_is_not_a_wall() {
        let body = "<p>Please solve one captcha on the front page.</p>";
        assert!(classify(response(200, body)).is_success());
    }

    #[test]
    fn test_classify_http_error() {
        assert_eq!(classify(response(404, "nope")), FetchOutcome::HttpError(404));
    }

    #[test]
    fn test_resolve_link() {
        assert_eq!(
            resolve_link("http://forum.test/index.php", "viewforum.php?id=3"),
            "http://forum.test/viewforum.php?id=3"
        );
        assert_eq!(
            resolve_link("http://forum.test/index.php", "http://other.test/x"),
            "http://other.test/x"
        );
        assert_eq!(resolve_link("not a url", "x.php"), "x.php");
    }
}
