//! Random-sample archiving of crawled articles to the Wayback Machine.
//!
//! The sampler works on an audit directory written by a crawl. It reads
//! `articles.csv`, picks a uniform random sample, submits each article URL
//! for capture and records the snapshot URL on the record. Progress is
//! written to `archiving_checkpoint.json` at a fixed interval, and the
//! results to `articles_archived.csv`, `archive_report.json` and
//! `wayback_urls.txt`.

pub mod wayback;

use crate::config::ArchiveConfig;
use crate::models::ArticleRecord;
use crate::outputs::OutputError;
use crate::outputs::json::write_json;
use crate::outputs::tabular::{ARCHIVED_ARTICLES_FILE, ARTICLES_FILE, read_articles, write_articles};
use crate::outputs::write_atomic;
use crate::utils::truncate_for_log;
use chrono::Utc;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use wayback::ArchiveEndpoint;

pub const ARCHIVE_CHECKPOINT_FILE: &str = "archiving_checkpoint.json";
pub const ARCHIVE_REPORT_FILE: &str = "archive_report.json";
pub const WAYBACK_URLS_FILE: &str = "wayback_urls.txt";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("no articles loaded; nothing to archive")]
    NotLoaded,
    #[error("failed to write archive results: {0}")]
    Output(#[from] OutputError),
    #[error("failed to format archive URL list")]
    Format(#[from] std::fmt::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub archived: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Contents of `archiving_checkpoint.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ArchiveCheckpoint {
    pub timestamp: String,
    #[serde(flatten)]
    pub stats: ArchiveStats,
    pub articles: Vec<ArticleRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedUrl {
    pub original_url: String,
    pub archive_url: String,
    pub title: String,
    pub date: String,
}

/// Contents of `archive_report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveReport {
    pub generated_at: String,
    pub total_articles: usize,
    pub archived_count: usize,
    pub archive_rate: String,
    pub stats: ArchiveStats,
    pub archived_urls: Vec<ArchivedUrl>,
}

/// Archives a random sample of an audit directory's articles.
#[derive(Debug)]
pub struct ArchiveSampler<E> {
    endpoint: E,
    dir: PathBuf,
    config: ArchiveConfig,
    articles: Vec<ArticleRecord>,
    stats: ArchiveStats,
}

impl<E: ArchiveEndpoint> ArchiveSampler<E> {
    pub fn new(endpoint: E, dir: &Path, config: ArchiveConfig) -> Self {
        Self {
            endpoint,
            dir: dir.to_path_buf(),
            config,
            articles: Vec::new(),
            stats: ArchiveStats::default(),
        }
    }

    #[cfg(test)]
    pub fn articles(&self) -> &[ArticleRecord] {
        &self.articles
    }

    /// Load `articles.csv` from the audit directory.
    ///
    /// Returns `false` when the file is missing or cannot be read.
    #[instrument(level = "info", skip(self), fields(dir = %self.dir.display()))]
    pub fn load(&mut self) -> bool {
        let path = self.dir.join(ARTICLES_FILE);
        if !path.exists() {
            error!(path = %path.display(), "Articles CSV not found");
            return false;
        }
        match read_articles(&path) {
            Ok(articles) => {
                info!(articles = articles.len(), "Loaded articles for archiving");
                self.articles = articles;
                true
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Could not read articles CSV");
                false
            }
        }
    }

    /// Archive `min(sample_size, loaded)` distinct articles chosen at random.
    pub async fn archive_sample(&mut self, sample_size: usize) -> Result<ArchiveStats, ArchiveError> {
        if self.articles.is_empty() {
            return Err(ArchiveError::NotLoaded);
        }
        let amount = sample_size.min(self.articles.len());
        let picked = index::sample(&mut rand::rng(), self.articles.len(), amount).into_vec();
        info!(sample = picked.len(), total = self.articles.len(), "Selected random articles");
        self.archive_indices(&picked).await
    }

    async fn archive_indices(&mut self, picked: &[usize]) -> Result<ArchiveStats, ArchiveError> {
        let t0 = Instant::now();
        let interval = self.config.checkpoint_interval.max(1);

        for (n, &i) in picked.iter().enumerate() {
            let n = n + 1;
            let article = &self.articles[i];
            let url = article.url.clone();
            info!(
                item = n,
                of = picked.len(),
                title = %truncate_for_log(&article.title, 50),
                %url,
                "Archiving article"
            );

            if let Some(existing) = &article.archive_url {
                info!(archive_url = %existing, "Already archived; skipping");
                self.stats.skipped += 1;
            } else {
                let found = if self.config.check_existing {
                    self.endpoint.lookup(&url).await
                } else {
                    None
                };
                let result = match found {
                    Some(snapshot) => {
                        info!(archive_url = %snapshot, "Found existing snapshot");
                        Some(snapshot)
                    }
                    None => {
                        let submitted = self.endpoint.submit(&url).await;
                        sleep(self.config.item_delay()).await;
                        submitted
                            .map_err(|e| warn!(error = %e, "Failed to archive"))
                            .ok()
                    }
                };
                match result {
                    Some(snapshot) => {
                        info!(archive_url = %snapshot, "Archived");
                        self.articles[i].archive_url = Some(snapshot);
                        self.stats.archived += 1;
                    }
                    None => self.stats.failed += 1,
                }
            }

            if n % interval == 0 {
                info!(
                    progress = n,
                    of = picked.len(),
                    archived = self.stats.archived,
                    failed = self.stats.failed,
                    skipped = self.stats.skipped,
                    elapsed_secs = t0.elapsed().as_secs(),
                    "Archive progress"
                );
                if let Err(e) = self.save_checkpoint().await {
                    error!(error = %e, "Archive checkpoint failed; continuing");
                }
            }
        }

        info!(
            archived = self.stats.archived,
            failed = self.stats.failed,
            skipped = self.stats.skipped,
            elapsed_secs = t0.elapsed().as_secs(),
            "Archiving complete"
        );
        Ok(self.stats)
    }

    pub async fn save_checkpoint(&self) -> Result<(), OutputError> {
        let checkpoint = ArchiveCheckpoint {
            timestamp: Utc::now().to_rfc3339(),
            stats: self.stats,
            articles: self.articles.clone(),
        };
        write_json(&self.dir.join(ARCHIVE_CHECKPOINT_FILE), &checkpoint).await
    }

    /// Build the archive report for the current state of the articles.
    pub fn report(&self) -> ArchiveReport {
        let archived_urls: Vec<ArchivedUrl> = self
            .articles
            .iter()
            .filter_map(|a| {
                a.archive_url.as_ref().map(|archive_url| ArchivedUrl {
                    original_url: a.url.clone(),
                    archive_url: archive_url.clone(),
                    title: a.title.clone(),
                    date: a.date_parsed.to_string(),
                })
            })
            .collect();
        let archive_rate = if self.articles.is_empty() {
            "0%".to_string()
        } else {
            format!(
                "{:.2}%",
                archived_urls.len() as f64 / self.articles.len() as f64 * 100.0
            )
        };
        ArchiveReport {
            generated_at: Utc::now().to_rfc3339(),
            total_articles: self.articles.len(),
            archived_count: archived_urls.len(),
            archive_rate,
            stats: self.stats,
            archived_urls,
        }
    }

    /// Write `articles_archived.csv`, `archive_report.json` and `wayback_urls.txt`.
    #[instrument(level = "info", skip_all, fields(dir = %self.dir.display()))]
    pub async fn save_results(&self) -> Result<ArchiveReport, ArchiveError> {
        write_articles(&self.dir.join(ARCHIVED_ARTICLES_FILE), &self.articles).await?;

        let report = self.report();
        write_json(&self.dir.join(ARCHIVE_REPORT_FILE), &report).await?;

        let mut listing = String::new();
        writeln!(listing, "# Wayback Machine archive URLs")?;
        writeln!(listing, "# Generated: {}", report.generated_at)?;
        writeln!(listing, "# Total archived: {}", report.archived_count)?;
        writeln!(listing)?;
        for entry in &report.archived_urls {
            writeln!(listing, "{}", entry.archive_url)?;
        }
        write_atomic(&self.dir.join(WAYBACK_URLS_FILE), listing.as_bytes()).await?;

        info!(archived = report.archived_count, rate = %report.archive_rate, "Saved archive results");
        Ok(report)
    }
}
