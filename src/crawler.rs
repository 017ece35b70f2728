//! Checkpointed crawl of the blog listing.
//!
//! A run moves through [`Phase::DiscoverBounds`], [`Phase::Crawling`] and
//! [`Phase::Finalizing`]:
//!
//! 1. Page 1 is fetched once to read the pagination bar. Without a bound
//!    there is nothing sensible to crawl, so failure here ends the run. The
//!    cards on that page are kept and stand in for page 1 of the crawl.
//! 2. Pages are fetched one at a time in ascending order. A page that fails
//!    to fetch is treated as empty; a page with no cards is logged and
//!    skipped. Every `checkpoint_interval` pages the store is flushed.
//! 3. A final flush is always written, however few pages ran since the last.
//!
//! Restarting from a checkpoint loads the saved store and estimates where the
//! previous run stopped from the smallest article identifier seen so far.
//! Starting early only re-fetches pages whose records are already stored,
//! which upserts absorb.

use crate::config::CrawlConfig;
use crate::models::{ArticleIdPattern, ArticleRecord, ReportSnapshot};
use crate::outputs::OutputError;
use crate::outputs::json::{CHECKPOINT_FILE, REPORT_FILE, read_checkpoint, write_checkpoint, write_report};
use crate::outputs::tabular::{ARTICLES_FILE, DAILY_SUMMARY_FILE, write_articles, write_daily_summary};
use crate::report;
use crate::scrapers::fetch::{FetchError, PageSource};
use crate::scrapers::listing::ListingParser;
use crate::store::ArticleStore;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    DiscoverBounds,
    Crawling,
    Finalizing,
    Done,
}

/// Failures that end a crawl run.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("could not fetch the first listing page: {0}")]
    Bounds(#[source] FetchError),
    #[error("the first listing page has no pagination bar")]
    NoPagination,
    #[error("final checkpoint flush failed: {0}")]
    Flush(#[from] OutputError),
}

/// Counters for one call to [`CrawlController::crawl`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub start_page: u32,
    pub max_page: u32,
    pub pages_processed: u32,
    pub failed_pages: u32,
    pub empty_pages: u32,
    pub records_seen: usize,
    pub total_articles: usize,
}

/// Estimate the page a restarted crawl should begin on.
///
/// Identifiers grow over time and the listing is newest first, so the
/// smallest identifier seen points at the deepest page reached. The
/// identifier space is taken as `max_page * records_per_page`; the
/// identifiers above `min_id` fill `(space - min_id) / records_per_page`
/// pages.
///
/// # Arguments
///
/// * `min_id` - Smallest article identifier in the restored store, if any
/// * `max_page` - Highest listing page reported by the pagination bar
/// * `records_per_page` - Cards per listing page; `0` is treated as `1`
/// * `safety_margin` - Pages to step back so nothing near the boundary is missed
///
/// # Returns
///
/// A page in `[1, max_page]`. Without an identifier the crawl restarts at
/// page 1.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(estimate_resume_page(Some(500), 1000, 9, 0), 944);
/// assert_eq!(estimate_resume_page(Some(500), 1000, 9, 10), 934);
/// assert_eq!(estimate_resume_page(None, 1000, 9, 0), 1);
/// ```
pub fn estimate_resume_page(
    min_id: Option<u64>,
    max_page: u32,
    records_per_page: u32,
    safety_margin: u32,
) -> u32 {
    let max_page = max_page.max(1);
    let Some(min_id) = min_id else {
        return 1;
    };
    let per_page = u64::from(records_per_page.max(1));
    let space = u64::from(max_page) * per_page;
    let pages = space.saturating_sub(min_id) / per_page;
    let pages = pages.saturating_sub(u64::from(safety_margin));
    pages.clamp(1, u64::from(max_page)) as u32
}

/// Drives the listing crawl and owns the article store while it runs.
#[derive(Debug)]
pub struct CrawlController<S> {
    source: S,
    parser: ListingParser,
    store: ArticleStore,
    output_dir: PathBuf,
    config: CrawlConfig,
    id_pattern: ArticleIdPattern,
    phase: Phase,
    /// Cards parsed from the page 1 fetch made by `discover_bounds`.
    first_page: Option<Vec<ArticleRecord>>,
}

impl<S: PageSource> CrawlController<S> {
    pub fn new(
        source: S,
        parser: ListingParser,
        config: CrawlConfig,
        id_pattern: ArticleIdPattern,
        output_dir: &Path,
    ) -> Self {
        Self {
            source,
            parser,
            store: ArticleStore::new(),
            output_dir: output_dir.to_path_buf(),
            config,
            id_pattern,
            phase: Phase::DiscoverBounds,
            first_page: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn store(&self) -> &ArticleStore {
        &self.store
    }

    /// Read the highest listing page number from page 1.
    ///
    /// The cards on page 1 are held back for [`crawl`](Self::crawl), which
    /// uses them instead of fetching page 1 a second time. The page delay
    /// follows this fetch like any other.
    #[instrument(level = "info", skip_all)]
    pub async fn discover_bounds(&mut self) -> Result<u32, CrawlError> {
        self.phase = Phase::DiscoverBounds;
        let fetched = self.source.fetch_page(1).await;
        sleep(self.config.page_delay()).await;
        let html = fetched.map_err(|e| {
            error!(error = %e, "Failed to fetch the first listing page");
            CrawlError::Bounds(e)
        })?;
        let max_page = self.parser.max_page(&html).ok_or_else(|| {
            error!("Pagination bar not found on the first listing page");
            CrawlError::NoPagination
        })?;
        self.first_page = Some(self.parser.articles(&html, 1));
        info!(max_page, "Discovered listing bounds");
        Ok(max_page)
    }

    /// Load a previous checkpoint into the store.
    ///
    /// Returns `false`, leaving the store untouched, when the checkpoint is
    /// missing or unreadable.
    pub async fn restore(&mut self, path: &Path) -> bool {
        match read_checkpoint(path).await {
            Ok(snapshot) => {
                self.store.bulk_load(snapshot.articles);
                info!(articles = self.store.len(), "Restored article store from checkpoint");
                true
            }
            Err(e) => {
                warn!(error = %e, "Could not restore checkpoint");
                false
            }
        }
    }

    /// Where to continue a restored crawl.
    pub fn resume_page(&self, max_page: u32) -> u32 {
        let min_id = self.store.min_article_id(&self.id_pattern);
        let page = estimate_resume_page(
            min_id,
            max_page,
            self.config.records_per_page,
            self.config.resume_safety_margin,
        );
        info!(
            ?min_id,
            max_page,
            records_per_page = self.config.records_per_page,
            safety_margin = self.config.resume_safety_margin,
            resume_page = page,
            "Estimated resume page"
        );
        page
    }

    /// Crawl pages `start..=max_page` and finish with a final flush.
    ///
    /// Only the final flush can fail the run; interval flush failures are
    /// logged and the crawl carries on.
    #[instrument(level = "info", skip(self))]
    pub async fn crawl(&mut self, start: u32, max_page: u32) -> Result<CrawlSummary, CrawlError> {
        self.phase = Phase::Crawling;
        let t0 = Instant::now();
        let start = start.max(1);
        let step = self.config.sample_every.max(1) as usize;
        let interval = self.config.checkpoint_interval.max(1);
        let total_pages = if start > max_page {
            0
        } else {
            (max_page - start) / step as u32 + 1
        };
        let mut summary = CrawlSummary {
            start_page: start,
            max_page,
            ..CrawlSummary::default()
        };

        info!(start, max_page, total_pages, "Starting crawl");

        for page in (start..=max_page).step_by(step) {
            let cached = if page == 1 { self.first_page.take() } else { None };
            let records = match cached {
                Some(records) => {
                    debug!(page, "Reusing the listing page fetched for bounds");
                    records
                }
                None => {
                    let records = match self.source.fetch_page(page).await {
                        Ok(html) => self.parser.articles(&html, page),
                        Err(e) => {
                            warn!(page, error = %e, timeout = e.is_timeout(), "Page fetch failed; treating as empty");
                            summary.failed_pages += 1;
                            Vec::new()
                        }
                    };
                    sleep(self.config.page_delay()).await;
                    records
                }
            };

            if records.is_empty() {
                summary.empty_pages += 1;
                debug!(page, "No articles on page");
            }
            summary.records_seen += records.len();
            for record in records {
                self.store.upsert(record);
            }
            summary.pages_processed += 1;

            if summary.pages_processed % interval == 0 {
                if let Err(e) = self.flush().await {
                    error!(page, error = %e, "Checkpoint flush failed; continuing");
                }
                let elapsed = t0.elapsed().as_secs_f64();
                let rate = f64::from(summary.pages_processed) / elapsed.max(f64::EPSILON);
                let remaining = total_pages.saturating_sub(summary.pages_processed);
                info!(
                    pages_done = summary.pages_processed,
                    total_pages,
                    articles = self.store.len(),
                    pages_per_sec = rate,
                    eta_secs = (f64::from(remaining) / rate.max(f64::EPSILON)) as u64,
                    "Crawl progress"
                );
            }
        }

        self.phase = Phase::Finalizing;
        self.flush().await?;
        self.phase = Phase::Done;

        summary.total_articles = self.store.len();
        info!(
            pages = summary.pages_processed,
            failed = summary.failed_pages,
            empty = summary.empty_pages,
            articles = summary.total_articles,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Crawl finished"
        );
        Ok(summary)
    }

    /// Write the checkpoint bundle and return the report it contains.
    pub async fn flush(&mut self) -> Result<ReportSnapshot, OutputError> {
        write_bundle(&self.output_dir, &mut self.store).await
    }
}

/// Write the checkpoint bundle for `store` into `dir`.
///
/// The date index is rebuilt first so the report reads a current index.
/// Each file goes through [`write_atomic`](crate::outputs::write_atomic), so
/// an interrupted flush leaves the previous bundle readable.
///
/// # Arguments
///
/// * `dir` - Audit directory; must already exist
/// * `store` - The article store to snapshot
///
/// # Returns
///
/// The [`ReportSnapshot`] that was written to `report.json`.
///
/// # Files written
///
/// - `checkpoint.json`: every stored record plus a timestamp
/// - `articles.csv`: the same records as a flat table
/// - `report.json`: the aggregate statistics
/// - `daily_summary.csv`: one row per publication date
#[instrument(level = "info", skip_all, fields(dir = %dir.display(), articles = store.len()))]
pub async fn write_bundle(dir: &Path, store: &mut ArticleStore) -> Result<ReportSnapshot, OutputError> {
    store.rebuild_index();
    let snapshot = store.snapshot();
    write_checkpoint(&dir.join(CHECKPOINT_FILE), &snapshot).await?;
    write_articles(&dir.join(ARTICLES_FILE), &snapshot.articles).await?;

    let report = report::build(store);
    write_report(&dir.join(REPORT_FILE), &report).await?;
    write_daily_summary(&dir.join(DAILY_SUMMARY_FILE), &report).await?;
    Ok(report)
}
