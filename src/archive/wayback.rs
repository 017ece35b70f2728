//! Wayback Machine submission with retry.
//!
//! # Architecture
//!
//! - [`ArchiveEndpoint`]: submit a URL for capture, or look up an existing one
//! - [`WaybackClient`]: the live `web.archive.org` implementation
//! - [`RetrySubmit`]: decorator that retries failed submissions of any endpoint
//!
//! A submission that completes with any HTTP response counts as archived.
//! Only transport failures and timeouts are retried.

use crate::config::ArchiveConfig;
use crate::scrapers::fetch::FetchError;
use chrono::{DateTime, Utc};
use rand::{Rng, rng};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

pub const SAVE_ENDPOINT: &str = "https://web.archive.org/save/";
pub const AVAILABILITY_ENDPOINT: &str = "https://archive.org/wayback/available";
const ARCHIVE_HOST: &str = "web.archive.org";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// A service that keeps snapshots of web pages.
pub trait ArchiveEndpoint {
    /// Ask the service to capture `url`; returns the snapshot URL.
    async fn submit(&self, url: &str) -> Result<String, FetchError>;

    /// An existing snapshot of `url`, if the service knows one.
    async fn lookup(&self, url: &str) -> Option<String>;
}

/// Snapshot URL for a capture of `url` taken at `at`.
pub fn snapshot_url(url: &str, at: DateTime<Utc>) -> String {
    format!("https://{ARCHIVE_HOST}/web/{}/{url}", at.format("%Y%m%d%H%M%S"))
}

/// Decide the snapshot URL for a completed save request.
///
/// A 200 that ended on the archive host names the snapshot directly; any
/// other completed response gets a snapshot URL stamped with `now`.
pub fn resolve_submission(status: StatusCode, final_url: &Url, url: &str, now: DateTime<Utc>) -> String {
    if status == StatusCode::OK && final_url.host_str() == Some(ARCHIVE_HOST) {
        final_url.to_string()
    } else {
        snapshot_url(url, now)
    }
}

#[derive(Debug, Deserialize)]
struct Availability {
    #[serde(default)]
    archived_snapshots: Snapshots,
}

#[derive(Debug, Default, Deserialize)]
struct Snapshots {
    closest: Option<Closest>,
}

#[derive(Debug, Deserialize)]
struct Closest {
    url: String,
}

/// Closest snapshot URL from an availability API response body.
fn closest_snapshot(body: &str) -> Option<String> {
    let availability: Availability = serde_json::from_str(body).ok()?;
    availability.archived_snapshots.closest.map(|c| c.url)
}

/// Client for the public Wayback Machine endpoints.
#[derive(Debug, Clone)]
pub struct WaybackClient {
    client: Client,
    timeout: Duration,
}

impl WaybackClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, timeout })
    }
}

impl ArchiveEndpoint for WaybackClient {
    #[instrument(level = "debug", skip(self))]
    async fn submit(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(format!("{SAVE_ENDPOINT}{url}"))
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;
        let status = response.status();
        let snapshot = resolve_submission(status, response.url(), url, Utc::now());
        debug!(%status, %snapshot, "Save request completed");
        Ok(snapshot)
    }

    #[instrument(level = "debug", skip(self))]
    async fn lookup(&self, url: &str) -> Option<String> {
        let query = format!("{AVAILABILITY_ENDPOINT}?url={}", urlencoding::encode(url));
        let body = match self.client.get(&query).timeout(LOOKUP_TIMEOUT).send().await {
            Ok(response) => response.text().await.ok()?,
            Err(e) => {
                debug!(error = %e, "Availability lookup failed");
                return None;
            }
        };
        closest_snapshot(&body)
    }
}

/// Retries failed submissions of the wrapped endpoint.
///
/// Waits `timeout_delay` after a timeout and `error_delay` after any other
/// failure, plus up to `jitter` of random spread.
pub struct RetrySubmit<T> {
    inner: T,
    attempts: usize,
    timeout_delay: Duration,
    error_delay: Duration,
    jitter: Duration,
}

impl<T: ArchiveEndpoint> RetrySubmit<T> {
    pub fn new(inner: T, config: &ArchiveConfig) -> Self {
        Self {
            inner,
            attempts: config.attempts.max(1),
            timeout_delay: Duration::from_secs(config.timeout_retry_delay_secs),
            error_delay: Duration::from_secs(config.error_retry_delay_secs),
            jitter: Duration::from_millis(config.retry_jitter_ms),
        }
    }

    fn backoff(&self, error: &FetchError) -> Duration {
        let base = if error.is_timeout() {
            self.timeout_delay
        } else {
            self.error_delay
        };
        let jitter_ms: u64 = rng().random_range(0..=self.jitter.as_millis() as u64);
        base + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetrySubmit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySubmit")
            .field("attempts", &self.attempts)
            .field("timeout_delay", &self.timeout_delay)
            .field("error_delay", &self.error_delay)
            .finish()
    }
}

impl<T: ArchiveEndpoint> ArchiveEndpoint for RetrySubmit<T> {
    #[instrument(level = "info", skip(self))]
    async fn submit(&self, url: &str) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.submit(url).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.attempts {
                        error!(
                            attempt,
                            max = self.attempts,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "submit() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(&e);
                    warn!(
                        attempt,
                        max = self.attempts,
                        timeout = e.is_timeout(),
                        ?delay,
                        error = %e,
                        "submit() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn lookup(&self, url: &str) -> Option<String> {
        self.inner.lookup(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct Flaky {
        failures: Mutex<Vec<FetchError>>,
        calls: Mutex<usize>,
    }

    impl Flaky {
        fn new(failures: Vec<FetchError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl ArchiveEndpoint for Flaky {
        async fn submit(&self, url: &str) -> Result<String, FetchError> {
            *self.calls.lock().unwrap() += 1;
            match self.failures.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok(format!("https://web.archive.org/web/1/{url}")),
            }
        }

        async fn lookup(&self, _url: &str) -> Option<String> {
            None
        }
    }

    fn instant_config(attempts: usize) -> ArchiveConfig {
        ArchiveConfig {
            attempts,
            timeout_retry_delay_secs: 0,
            error_retry_delay_secs: 0,
            retry_jitter_ms: 0,
            ..ArchiveConfig::default()
        }
    }

    fn timeout() -> FetchError {
        FetchError::Timeout(Duration::from_secs(60))
    }

    #[test]
    fn test_snapshot_url_format() {
        let at = Utc.with_ymd_and_hms(2024, 2, 5, 10, 15, 30).unwrap();
        assert_eq!(
            snapshot_url("https://example.com/a", at),
            "https://web.archive.org/web/20240205101530/https://example.com/a"
        );
    }

    #[test]
    fn test_resolve_submission() {
        let at = Utc.with_ymd_and_hms(2024, 2, 5, 0, 0, 0).unwrap();
        let archived = Url::parse("https://web.archive.org/web/20240205000001/https://example.com/a").unwrap();
        assert_eq!(
            resolve_submission(StatusCode::OK, &archived, "https://example.com/a", at),
            archived.to_string()
        );

        let elsewhere = Url::parse("https://example.com/a").unwrap();
        let expected = "https://web.archive.org/web/20240205000000/https://example.com/a";
        assert_eq!(resolve_submission(StatusCode::OK, &elsewhere, "https://example.com/a", at), expected);
        assert_eq!(
            resolve_submission(StatusCode::TOO_MANY_REQUESTS, &archived, "https://example.com/a", at),
            expected
        );
    }

    #[test]
    fn test_closest_snapshot() {
        let found = r#"{"url":"x","archived_snapshots":{"closest":{"status":"200","available":true,"url":"http://web.archive.org/web/2024/x","timestamp":"2024"}}}"#;
        assert_eq!(closest_snapshot(found).as_deref(), Some("http://web.archive.org/web/2024/x"));
        assert_eq!(closest_snapshot(r#"{"url":"x","archived_snapshots":{}}"#), None);
        assert_eq!(closest_snapshot("not json"), None);
    }

    #[tokio::test]
    async fn test_retry_recovers_after_timeout() {
        let retry = RetrySubmit::new(Flaky::new(vec![timeout()]), &instant_config(2));
        let snapshot = retry.submit("https://example.com/a").await.unwrap();
        assert_eq!(snapshot, "https://web.archive.org/web/1/https://example.com/a");
        assert_eq!(retry.inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_attempts() {
        let retry = RetrySubmit::new(Flaky::new(vec![timeout(), timeout(), timeout()]), &instant_config(2));
        assert!(retry.submit("https://example.com/a").await.unwrap_err().is_timeout());
        assert_eq!(retry.inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let retry = RetrySubmit::new(Flaky::new(vec![]), &instant_config(0));
        assert!(retry.submit("https://example.com/a").await.is_ok());
        assert_eq!(retry.inner.calls(), 1);
    }
}
