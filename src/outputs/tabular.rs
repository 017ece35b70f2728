//! CSV exports.
//!
//! `articles.csv` is the hand-off to the archive sampler, which reads it back
//! with [`read_articles`]; its columns are fixed as
//! `url, title, date_raw, date_parsed, page_number, archive_url`.
//! `daily_summary.csv` has `Date, Article Count`, one row per date in
//! ascending order with `UNKNOWN_DATE` last.

use super::{OutputError, write_atomic};
use crate::models::{ArticleRecord, ReportSnapshot};
use std::path::Path;
use tracing::{instrument, warn};

pub const ARTICLES_FILE: &str = "articles.csv";
pub const DAILY_SUMMARY_FILE: &str = "daily_summary.csv";
pub const ARCHIVED_ARTICLES_FILE: &str = "articles_archived.csv";

const ARTICLE_COLUMNS: [&str; 6] = [
    "url",
    "title",
    "date_raw",
    "date_parsed",
    "page_number",
    "archive_url",
];

/// Encode records as CSV with the fixed article column set.
pub fn articles_csv<'a, I>(records: I) -> Result<Vec<u8>, OutputError>
where
    I: IntoIterator<Item = &'a ArticleRecord>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(ARTICLE_COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| OutputError::Csv(csv::Error::from(e.into_error())))
}

pub fn daily_summary_csv(report: &ReportSnapshot) -> Result<Vec<u8>, OutputError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Date", "Article Count"])?;
    for (date, count) in &report.daily_statistics.articles_per_day {
        writer.write_record([date.to_string(), count.to_string()])?;
    }
    writer
        .into_inner()
        .map_err(|e| OutputError::Csv(csv::Error::from(e.into_error())))
}

#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_articles<'a, I>(path: &Path, records: I) -> Result<(), OutputError>
where
    I: IntoIterator<Item = &'a ArticleRecord>,
{
    let bytes = articles_csv(records)?;
    write_atomic(path, &bytes).await
}

pub async fn write_daily_summary(path: &Path, report: &ReportSnapshot) -> Result<(), OutputError> {
    let bytes = daily_summary_csv(report)?;
    write_atomic(path, &bytes).await
}

/// Read `articles.csv`. Rows that fail to decode are logged and skipped.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn read_articles(path: &Path) -> Result<Vec<ArticleRecord>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().from_path(path)?;
    let mut records = Vec::new();
    for (row, result) in reader.deserialize::<ArticleRecord>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => warn!(row = row + 1, error = %e, "Skipping unreadable CSV row"),
        }
    }
    Ok(records)
}
