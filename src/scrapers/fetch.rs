//! HTTP retrieval of listing pages.
//!
//! [`PageSource`] is the seam between the crawl loop and the network: the
//! controller only ever asks for "page N" and gets markup or a
//! [`FetchError`]. [`HttpPageSource`] is the production implementation;
//! tests substitute in-memory sources.

use crate::config::SiteConfig;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Failure to retrieve a document over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: StatusCode, url: String },
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
}

impl FetchError {
    /// Classify a reqwest error, separating timeouts from other failures.
    pub fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(timeout)
        } else {
            FetchError::Transport(e)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

/// Source of listing page markup.
pub trait PageSource {
    /// Fetch the markup of the 1-based listing page `page`.
    async fn fetch_page(&self, page: u32) -> Result<String, FetchError>;
}

/// Fetches listing pages from the live site with a shared client.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: Client,
    blog_url: String,
    timeout: Duration,
}

impl HttpPageSource {
    /// Build a client with browser-like headers and a fixed per-request timeout.
    pub fn new(site: &SiteConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        if let Ok(lang) = HeaderValue::from_str(&site.accept_language) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }
        headers.insert(REFERER, HeaderValue::from_static("https://www.google.com/"));
        headers.insert("dnt", HeaderValue::from_static("1"));

        let client = Client::builder()
            .user_agent(site.user_agent.clone())
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            blog_url: site.blog_url(),
            timeout,
        })
    }

    pub fn page_url(&self, page: u32) -> String {
        listing_page_url(&self.blog_url, page)
    }
}

impl PageSource for HttpPageSource {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_page(&self, page: u32) -> Result<String, FetchError> {
        let url = self.page_url(page);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status, url });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;
        debug!(bytes = body.len(), %url, "Fetched listing page");
        Ok(body)
    }
}

/// Page 1 is the bare listing URL; later pages append `/page/<n>`.
pub fn listing_page_url(blog_url: &str, page: u32) -> String {
    let blog_url = blog_url.trim_end_matches('/');
    if page > 1 {
        format!("{blog_url}/page/{page}")
    } else {
        blog_url.to_string()
    }
}
