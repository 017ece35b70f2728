//! Data models for discovered articles, checkpoints and reports.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ArticleRecord`]: One blog post as discovered on a listing page
//! - [`PublishedDate`]: A canonical calendar date or the `UNKNOWN_DATE` sentinel
//! - [`CheckpointSnapshot`]: The durable form of the article collection
//! - [`ReportSnapshot`]: Aggregate publication statistics derived from the collection
//! - [`ArticleIdPattern`]: Extraction of the numeric identifier embedded in article URLs
//!
//! Field names match the JSON and CSV files written to the audit directory, so
//! renaming a field is a file format change.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Text written in place of a date that could not be parsed.
pub const UNKNOWN_DATE: &str = "UNKNOWN_DATE";

/// Canonical publication date of an article.
///
/// Serialized as `YYYY-MM-DD`, or as [`UNKNOWN_DATE`] when the listing text
/// could not be parsed. Known dates order chronologically and sort before
/// `Unknown`, which matches the plain string ordering of the serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PublishedDate {
    /// A calendar date.
    Known(NaiveDate),
    /// The listing date text was missing or malformed.
    Unknown,
}

impl PublishedDate {
    /// The calendar date, if known.
    pub fn known(&self) -> Option<NaiveDate> {
        match self {
            PublishedDate::Known(d) => Some(*d),
            PublishedDate::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, PublishedDate::Known(_))
    }
}

impl fmt::Display for PublishedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishedDate::Known(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            PublishedDate::Unknown => f.write_str(UNKNOWN_DATE),
        }
    }
}

// Anything that is not an ISO date (including the sentinel itself) reads back
// as `Unknown`, so a hand-edited checkpoint cannot fail to load on a date.
impl From<String> for PublishedDate {
    fn from(s: String) -> Self {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(PublishedDate::Known)
            .unwrap_or(PublishedDate::Unknown)
    }
}

impl From<PublishedDate> for String {
    fn from(d: PublishedDate) -> Self {
        d.to_string()
    }
}

/// One discovered blog post.
///
/// The `url` is the identity key; every other field is informational.
/// The field order is the column order of `articles.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Absolute article URL.
    pub url: String,
    /// Display title from the listing card.
    pub title: String,
    /// Date text exactly as it appeared on the listing page.
    pub date_raw: String,
    /// Normalized publication date.
    pub date_parsed: PublishedDate,
    /// 1-based listing page the article was discovered on.
    #[serde(alias = "page_num")]
    pub page_number: u32,
    /// Web archive snapshot URL, set only after a successful submission.
    #[serde(default, deserialize_with = "non_empty")]
    pub archive_url: Option<String>,
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Durable representation of the article collection at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointSnapshot {
    /// RFC 3339 time the snapshot was taken.
    pub timestamp: String,
    /// Number of records in `articles` at the time of writing.
    pub articles_count: usize,
    pub articles: Vec<ArticleRecord>,
}

/// Aggregate statistics over the article collection.
///
/// Recomputed on demand and written to `report.json` for inspection and for
/// chart rendering; never read back as a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub generated_at: String,
    pub total_articles: usize,
    pub date_range: DateRange,
    pub daily_statistics: DailyStatistics,
    pub cleaning_summary: CleaningSummary,
}

/// Earliest and latest known publication dates.
///
/// Both are `Unknown` when the collection only holds undated records, and
/// absent when the collection is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub earliest: Option<PublishedDate>,
    pub latest: Option<PublishedDate>,
}

/// Per-day publication counts and their summary figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatistics {
    /// Number of distinct known dates.
    pub dates: usize,
    /// Article count per date, `UNKNOWN_DATE` included.
    pub articles_per_day: BTreeMap<PublishedDate, usize>,
    /// Mean over complete days (known dates minus the first and last day).
    pub average_per_day: f64,
    pub max_per_day: usize,
    pub min_per_day: usize,
}

/// How many discoveries were folded together by URL deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningSummary {
    pub initial_article_count: usize,
    pub final_article_count: usize,
    pub duplicates_removed: usize,
    pub deduplication_rate: String,
}

/// Extracts the integer identifier that article URLs carry after a fixed
/// path segment, e.g. `https://example.com/blog/48213/some-title`.
#[derive(Debug, Clone)]
pub struct ArticleIdPattern {
    regex: Regex,
}

impl ArticleIdPattern {
    /// Build a pattern for URLs of the form `.../<segment>/<integer>`.
    pub fn new(segment: &str) -> Result<Self, regex::Error> {
        let segment = segment.trim_matches('/');
        let regex = Regex::new(&format!(r"/{}/(\d+)(?:[/?#]|$)", regex::escape(segment)))?;
        Ok(Self { regex })
    }

    /// The identifier embedded in `url`, or `None` for a non-conforming URL.
    pub fn extract(&self, url: &str) -> Option<u64> {
        self.regex
            .captures(url)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, date: &str) -> ArticleRecord {
        ArticleRecord {
            url: url.to_string(),
            title: "Title".to_string(),
            date_raw: "lunes, 1 de enero de 2024".to_string(),
            date_parsed: PublishedDate::from(date.to_string()),
            page_number: 3,
            archive_url: None,
        }
    }

    #[test]
    fn test_published_date_display() {
        let d = PublishedDate::Known(NaiveDate::from_ymd_opt(2024, 2, 5).unwrap());
        assert_eq!(d.to_string(), "2024-02-05");
        assert_eq!(PublishedDate::Unknown.to_string(), "UNKNOWN_DATE");
    }

    #[test]
    fn test_published_date_from_malformed_string_is_unknown() {
        assert_eq!(PublishedDate::from("UNKNOWN_DATE".to_string()), PublishedDate::Unknown);
        assert_eq!(PublishedDate::from("05/02/2024".to_string()), PublishedDate::Unknown);
        assert!(PublishedDate::from("2024-02-05".to_string()).is_known());
    }

    #[test]
    fn test_unknown_sorts_after_known_dates() {
        let early = PublishedDate::from("2020-01-01".to_string());
        let late = PublishedDate::from("2030-12-31".to_string());
        assert!(early < late);
        assert!(late < PublishedDate::Unknown);
    }

    #[test]
    fn test_article_record_json_shape() {
        let json = serde_json::to_value(record("https://example.com/blog/1", "2024-01-01")).unwrap();
        assert_eq!(json["date_parsed"], "2024-01-01");
        assert_eq!(json["page_number"], 3);
        assert!(json["archive_url"].is_null());
    }

    #[test]
    fn test_article_record_accepts_legacy_page_num_and_missing_archive_url() {
        let json = r#"{
            "url": "https://example.com/blog/7/x",
            "title": "T",
            "date_raw": "N/A",
            "date_parsed": "UNKNOWN_DATE",
            "page_num": 12
        }"#;
        let r: ArticleRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.page_number, 12);
        assert_eq!(r.date_parsed, PublishedDate::Unknown);
        assert_eq!(r.archive_url, None);
    }

    #[test]
    fn test_empty_archive_url_reads_as_none() {
        let json = r#"{"url":"u","title":"t","date_raw":"d","date_parsed":"2024-01-01","page_number":1,"archive_url":""}"#;
        let r: ArticleRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.archive_url, None);
    }

    #[test]
    fn test_articles_per_day_serializes_as_string_keys() {
        let mut per_day = BTreeMap::new();
        per_day.insert(PublishedDate::from("2024-01-02".to_string()), 4usize);
        per_day.insert(PublishedDate::Unknown, 1usize);
        let json = serde_json::to_string(&per_day).unwrap();
        assert_eq!(json, r#"{"2024-01-02":4,"UNKNOWN_DATE":1}"#);
        let back: BTreeMap<PublishedDate, usize> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, per_day);
    }

    #[test]
    fn test_article_id_extraction() {
        let pattern = ArticleIdPattern::new("blog").unwrap();
        assert_eq!(pattern.extract("https://example.com/blog/48213/some-title"), Some(48213));
        assert_eq!(pattern.extract("https://example.com/blog/48213"), Some(48213));
        assert_eq!(pattern.extract("https://example.com/blog/48213?ref=x"), Some(48213));
        assert_eq!(pattern.extract("https://example.com/blog/not-a-number"), None);
        assert_eq!(pattern.extract("https://example.com/blog/123abc"), None);
        assert_eq!(pattern.extract("https://example.com/other/55/title"), None);
    }

    #[test]
    fn test_article_id_segment_is_escaped() {
        let pattern = ArticleIdPattern::new("/a.b/").unwrap();
        assert_eq!(pattern.extract("https://example.com/a.b/9"), Some(9));
        assert_eq!(pattern.extract("https://example.com/axb/9"), None);
    }
}
