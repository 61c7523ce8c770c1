use std::fmt;

use async_trait::async_trait;
use reqwest::header::{COOKIE, USER_AGENT};
use reqwest::{Client, Proxy};
use thiserror::Error;

/// Browser user agent sent with every request; the board serves a reduced
/// page to unknown agents.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; rv:102.0) Gecko/20100101 Firefox/102.0";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid proxy URL '{url}': {source}")]
    InvalidProxy {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// Session token sent as a cookie with every request.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    cookie_name: String,
    token: String,
}

impl SessionCredential {
    #[must_use]
    pub fn new(cookie_name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            token: token.into().trim().to_string(),
        }
    }

    /// Same cookie name, new token.
    #[must_use]
    pub fn replaced(&self, token: impl Into<String>) -> Self {
        Self::new(self.cookie_name.clone(), token)
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value of the `Cookie` request header.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        format!("{}={}", self.cookie_name, self.token)
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visible: String = self.token.chars().take(4).collect();
        f.debug_struct("SessionCredential")
            .field("cookie_name", &self.cookie_name)
            .field("token", &format_args!("{visible}…"))
            .finish()
    }
}

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// An HTTP GET capability.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        credential: &SessionCredential,
    ) -> Result<RawResponse, TransportError>;
}

/// `reqwest` transport routed through a SOCKS proxy.
///
/// The proxy is installed for every scheme; there is no way to build this
/// transport without one.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a client that sends everything through `proxy_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy URL is invalid or the client cannot be built.
    pub fn new(proxy_url: &str) -> Result<Self, TransportError> {
        let proxy = Proxy::all(proxy_url).map_err(|source| TransportError::InvalidProxy {
            url: proxy_url.to_string(),
            source,
        })?;

        let client = Client::builder()
            .proxy(proxy)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        credential: &SessionCredential,
    ) -> Result<RawResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(COOKIE, credential.cookie_header())
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        Ok(RawResponse { status, body })
    }
}
