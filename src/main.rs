//! # Blog Audit
//!
//! Measures how many articles a blog publishes per day. The listing is
//! crawled page by page into a URL-keyed store that is checkpointed to disk,
//! so an interrupted crawl can resume. Each checkpoint carries a report,
//! CSV exports and, at the end of a run, PNG charts. A random sample of the
//! discovered articles can then be submitted to the Wayback Machine as
//! independent evidence.
//!
//! ## Usage
//!
//! ```sh
//! blog_audit crawl
//! blog_audit crawl --resume audit_20240205_101500/checkpoint.json --yes
//! blog_audit report --checkpoint audit_20240205_101500/checkpoint.json
//! blog_audit archive --dir audit_20240205_101500 --sample 100
//! ```
//!
//! ## Architecture
//!
//! 1. **Bounds**: read the page count from the first listing page
//! 2. **Crawl**: fetch pages sequentially, upserting records and flushing
//!    checkpoints at a fixed interval
//! 3. **Report**: aggregate per-day counts and render charts
//! 4. **Archive** (optional): submit a random sample to the Wayback Machine

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod archive;
mod cli;
mod config;
mod crawler;
mod dates;
mod models;
mod outputs;
mod report;
mod scrapers;
mod store;
mod utils;

use archive::ArchiveSampler;
use archive::wayback::{RetrySubmit, WaybackClient};
use cli::{Cli, Command};
use config::Config;
use crawler::{CrawlController, write_bundle};
use models::{ArticleIdPattern, ReportSnapshot};
use outputs::charts::Visualizer;
use outputs::json::read_checkpoint;
use scrapers::fetch::HttpPageSource;
use scrapers::listing::ListingParser;
use store::ArticleStore;
use utils::{audit_dir_name, confirm, ensure_writable_dir, group_thousands};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("blog_audit starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");
    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Crawl {
            resume,
            yes,
            archive_sample,
            safety_margin,
        } => {
            let output_dir = output_dir(args.output_dir.as_deref(), resume.as_deref());
            let outcome = run_crawl(
                &config,
                &output_dir,
                resume.as_deref(),
                yes,
                safety_margin,
            )
            .await?;
            if let Some(sample) = archive_sample {
                if should_archive(outcome) {
                    run_archive(&config, &output_dir, sample).await?;
                } else {
                    info!("Crawl did not run; skipping archive");
                }
            }
        }
        Command::Report { checkpoint } => {
            let output_dir = output_dir(args.output_dir.as_deref(), Some(&checkpoint));
            run_report(&config, Path::new(&checkpoint), &output_dir).await?;
        }
        Command::Archive { dir, sample } => {
            let sample = sample.unwrap_or(config.archive.sample_size);
            run_archive(&config, Path::new(&dir), sample).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

/// The explicit directory, else the checkpoint's directory, else a new
/// timestamped audit directory.
fn output_dir(explicit: Option<&str>, checkpoint: Option<&str>) -> PathBuf {
    if let Some(dir) = explicit {
        return PathBuf::from(dir);
    }
    if let Some(parent) = checkpoint.and_then(|c| Path::new(c).parent()) {
        if !parent.as_os_str().is_empty() {
            return parent.to_path_buf();
        }
        return PathBuf::from(".");
    }
    PathBuf::from(audit_dir_name(Local::now()))
}

/// Whether `run_crawl` went ahead or the operator declined it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrawlOutcome {
    Completed,
    Declined,
}

/// Archiving only follows a crawl that actually ran.
fn should_archive(outcome: CrawlOutcome) -> bool {
    outcome == CrawlOutcome::Completed
}

fn site_label(config: &Config) -> String {
    config
        .site
        .base()
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| config.site.base_url.clone())
}

#[instrument(level = "info", skip(config))]
async fn run_crawl(
    config: &Config,
    output_dir: &Path,
    resume: Option<&str>,
    yes: bool,
    safety_margin: Option<u32>,
) -> Result<CrawlOutcome, Box<dyn Error>> {
    if let Err(e) = ensure_writable_dir(output_dir).await {
        error!(
            path = %output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let mut crawl_config = config.crawl.clone();
    if let Some(margin) = safety_margin {
        crawl_config.resume_safety_margin = margin;
    }
    let page_delay = crawl_config.page_delay();

    let source = HttpPageSource::new(&config.site, crawl_config.request_timeout())?;
    let parser = ListingParser::new(config.site.base()?, config.site.month_table());
    let id_pattern = ArticleIdPattern::new(&config.site.article_segment)?;
    let mut controller = CrawlController::new(source, parser, crawl_config, id_pattern, output_dir);

    let max_page = controller.discover_bounds().await?;

    let start = match resume {
        Some(checkpoint) => {
            if controller.restore(Path::new(checkpoint)).await {
                controller.resume_page(max_page)
            } else {
                warn!(checkpoint, "Checkpoint not usable; starting from page 1");
                1
            }
        }
        None => 1,
    };

    let pages = max_page.saturating_sub(start) + 1;
    let est_minutes = (page_delay.as_secs_f64() + 1.0) * f64::from(pages) / 60.0;
    info!(
        start,
        max_page,
        pages,
        est_minutes = est_minutes.round() as u64,
        already_stored = controller.store().len(),
        "Crawl plan"
    );

    if !yes && !confirm(&format!("Crawl pages {start} to {max_page}?"))? {
        info!("Crawl cancelled");
        return Ok(CrawlOutcome::Declined);
    }

    let summary = controller.crawl(start, max_page).await?;
    info!(phase = ?controller.phase(), failed_pages = summary.failed_pages, "Crawl run closed");
    if controller.store().is_empty() {
        warn!("No articles discovered; check the listing selectors and article segment");
    }

    let report = report::build(controller.store());
    log_report(&report);
    render_charts(config, output_dir, &report).await;
    Ok(CrawlOutcome::Completed)
}

#[instrument(level = "info", skip(config))]
async fn run_report(config: &Config, checkpoint: &Path, output_dir: &Path) -> Result<(), Box<dyn Error>> {
    ensure_writable_dir(output_dir).await?;
    let snapshot = read_checkpoint(checkpoint).await?;
    let mut store = ArticleStore::new();
    store.bulk_load(snapshot.articles);

    let report = write_bundle(output_dir, &mut store).await?;
    log_report(&report);
    render_charts(config, output_dir, &report).await;
    Ok(())
}

#[instrument(level = "info", skip(config))]
async fn run_archive(config: &Config, dir: &Path, sample: usize) -> Result<(), Box<dyn Error>> {
    let client = WaybackClient::new(&config.site.user_agent, config.archive.request_timeout())?;
    let endpoint = RetrySubmit::new(client, &config.archive);
    let mut sampler = ArchiveSampler::new(endpoint, dir, config.archive.clone());

    if !sampler.load() {
        return Err(format!("no readable articles.csv in {}", dir.display()).into());
    }
    sampler.archive_sample(sample).await?;
    let report = sampler.save_results().await?;
    info!(
        total = report.total_articles,
        archived = report.archived_count,
        rate = %report.archive_rate,
        "Archive run finished"
    );
    Ok(())
}

async fn render_charts(config: &Config, output_dir: &Path, report: &ReportSnapshot) {
    let visualizer = Visualizer::new(output_dir, &site_label(config), config.report.regime_threshold);
    match visualizer.render(report).await {
        Ok(charts) => info!(charts = charts.len(), "Rendered charts"),
        Err(e) => error!(error = %e, "Failed to render charts"),
    }
}

fn log_report(report: &ReportSnapshot) {
    let show = |d: Option<models::PublishedDate>| d.map(|d| d.to_string()).unwrap_or_default();
    info!(
        total = %group_thousands(report.total_articles as u64),
        earliest = %show(report.date_range.earliest),
        latest = %show(report.date_range.latest),
        days = report.daily_statistics.dates,
        average_per_day = %format!("{:.1}", report.daily_statistics.average_per_day),
        max_per_day = report.daily_statistics.max_per_day,
        min_per_day = report.daily_statistics.min_per_day,
        duplicates_removed = report.cleaning_summary.duplicates_removed,
        "Audit report"
    );
}
