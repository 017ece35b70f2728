//! Runtime configuration loaded from an optional YAML file.
//!
//! Every field has a default, so the file can be omitted entirely or list
//! only the values that differ:
//!
//! ```yaml
//! site:
//!   base_url: https://www.example.com
//!   blog_path: /blog
//!   article_segment: blog
//! crawl:
//!   checkpoint_interval: 50
//! archive:
//!   sample_size: 100
//! ```

use crate::dates::MonthTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use url::Url;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub crawl: CrawlConfig,
    pub archive: ArchiveConfig,
    pub report: ReportConfig,
}

impl Config {
    /// Load configuration from `path`, or the defaults when no path is given.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_yaml(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_string(),
            source,
        })?;
        info!(config_path = path, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}

/// The audited site and how to address it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Scheme and host, e.g. `https://www.q2bstudio.com`.
    pub base_url: String,
    /// Path of the first listing page.
    pub blog_path: String,
    /// Path segment that precedes the numeric article identifier.
    pub article_segment: String,
    pub user_agent: String,
    pub accept_language: String,
    /// Month name to month number overrides for the listing date language.
    pub months: Option<BTreeMap<String, u32>>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.q2bstudio.com".to_string(),
            blog_path: "/blog-empresa-aplicaciones".to_string(),
            article_segment: "nuestro-blog".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "es-ES,es;q=0.9,en;q=0.8".to_string(),
            months: None,
        }
    }
}

impl SiteConfig {
    pub fn base(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)
    }

    /// URL of listing page 1.
    pub fn blog_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.blog_path.trim_start_matches('/')
        )
    }

    pub fn month_table(&self) -> MonthTable {
        match &self.months {
            Some(names) => MonthTable::from_names(names.iter().map(|(k, v)| (k.as_str(), *v))),
            None => MonthTable::spanish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Pages between checkpoint flushes.
    pub checkpoint_interval: u32,
    /// Pause after every page fetch, successful or not.
    pub page_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Expected articles per listing page, used to estimate the resume page.
    pub records_per_page: u32,
    /// Pages to step back from the estimated resume page.
    pub resume_safety_margin: u32,
    /// Crawl every Nth page; 1 crawls them all.
    pub sample_every: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 100,
            page_delay_ms: 500,
            request_timeout_secs: 15,
            records_per_page: 9,
            resume_safety_margin: 0,
            sample_every: 1,
        }
    }
}

impl CrawlConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub sample_size: usize,
    /// Submission attempts per article.
    pub attempts: usize,
    pub item_delay_secs: u64,
    pub timeout_retry_delay_secs: u64,
    pub error_retry_delay_secs: u64,
    /// Upper bound of the random spread added to each retry delay.
    pub retry_jitter_ms: u64,
    pub checkpoint_interval: usize,
    pub request_timeout_secs: u64,
    /// Ask the availability API for an existing snapshot before submitting.
    pub check_existing: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            sample_size: 500,
            attempts: 2,
            item_delay_secs: 3,
            timeout_retry_delay_secs: 5,
            error_retry_delay_secs: 3,
            retry_jitter_ms: 250,
            checkpoint_interval: 50,
            request_timeout_secs: 60,
            check_existing: false,
        }
    }
}

impl ArchiveConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_secs(self.item_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Daily article count that marks a regime change on the timeline chart.
    pub regime_threshold: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            regime_threshold: 100,
        }
    }
}
