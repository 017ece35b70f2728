//! Aggregate publication statistics.
//!
//! [`build`] reduces an [`ArticleStore`] to a [`ReportSnapshot`] without I/O
//! or mutation. The first and last known days of a crawl are usually only
//! partly covered (the crawl starts and stops mid-day), so they are left out
//! of the per-day average, minimum and maximum, as is the `UNKNOWN_DATE`
//! bucket. They still count towards the totals and the per-day mapping.

use crate::models::{CleaningSummary, DailyStatistics, DateRange, PublishedDate, ReportSnapshot};
use crate::store::ArticleStore;
use chrono::{DateTime, Utc};
use itertools::{Itertools, MinMaxResult};
use std::collections::BTreeMap;

/// Build a report stamped with the current time.
pub fn build(store: &ArticleStore) -> ReportSnapshot {
    build_at(store, Utc::now())
}

/// Build a report stamped with `generated_at`.
pub fn build_at(store: &ArticleStore, generated_at: DateTime<Utc>) -> ReportSnapshot {
    let articles_per_day: BTreeMap<PublishedDate, usize> = store
        .date_index()
        .iter()
        .map(|(date, urls)| (*date, urls.len()))
        .collect();

    // BTreeMap order puts known dates first, ascending.
    let known: Vec<usize> = articles_per_day
        .iter()
        .filter(|(date, _)| date.is_known())
        .map(|(_, count)| *count)
        .collect();

    let known_dates = articles_per_day.keys().filter(|d| d.is_known());
    let (earliest, latest) = match known_dates.minmax() {
        MinMaxResult::NoElements if articles_per_day.is_empty() => (None, None),
        MinMaxResult::NoElements => (Some(PublishedDate::Unknown), Some(PublishedDate::Unknown)),
        MinMaxResult::OneElement(d) => (Some(*d), Some(*d)),
        MinMaxResult::MinMax(first, last) => (Some(*first), Some(*last)),
    };

    let complete = complete_days(&known);
    let average_per_day = if complete.is_empty() {
        0.0
    } else {
        complete.iter().sum::<usize>() as f64 / complete.len() as f64
    };
    let (min_per_day, max_per_day) = match complete.iter().minmax() {
        MinMaxResult::NoElements => (0, 0),
        MinMaxResult::OneElement(c) => (*c, *c),
        MinMaxResult::MinMax(min, max) => (*min, *max),
    };

    let total_articles = store.len();
    let initial = store.discoveries().max(total_articles);
    let duplicates_removed = initial - total_articles;
    let deduplication_rate = if initial == 0 {
        "0.00%".to_string()
    } else {
        format!("{:.2}%", duplicates_removed as f64 / initial as f64 * 100.0)
    };

    ReportSnapshot {
        generated_at: generated_at.to_rfc3339(),
        total_articles,
        date_range: DateRange { earliest, latest },
        daily_statistics: DailyStatistics {
            dates: known.len(),
            articles_per_day,
            average_per_day,
            max_per_day,
            min_per_day,
        },
        cleaning_summary: CleaningSummary {
            initial_article_count: initial,
            final_article_count: total_articles,
            duplicates_removed,
            deduplication_rate,
        },
    }
}

/// Counts for the days strictly between the first and last known day.
///
/// With fewer than three known days there is no interior, and every known
/// day is used instead so that short crawls still report figures.
fn complete_days(known: &[usize]) -> &[usize] {
    if known.len() > 2 {
        &known[1..known.len() - 1]
    } else {
        known
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleRecord;

    fn store_with(days: &[(&str, usize)]) -> ArticleStore {
        let mut store = ArticleStore::new();
        let mut id = 0;
        for (date, count) in days {
            for _ in 0..*count {
                id += 1;
                store.upsert(ArticleRecord {
                    url: format!("https://example.com/blog/{id}"),
                    title: format!("Article {id}"),
                    date_raw: date.to_string(),
                    date_parsed: PublishedDate::from(date.to_string()),
                    page_number: 1,
                    archive_url: None,
                });
            }
        }
        store
    }

    fn day(s: &str) -> PublishedDate {
        PublishedDate::from(s.to_string())
    }

    #[test]
    fn test_empty_store_reports_zeroes() {
        let report = build(&ArticleStore::new());
        assert_eq!(report.total_articles, 0);
        assert_eq!(report.date_range.earliest, None);
        assert_eq!(report.date_range.latest, None);
        assert!(report.daily_statistics.articles_per_day.is_empty());
        assert_eq!(report.daily_statistics.dates, 0);
        assert_eq!(report.daily_statistics.average_per_day, 0.0);
        assert_eq!(report.daily_statistics.max_per_day, 0);
        assert_eq!(report.daily_statistics.min_per_day, 0);
        assert_eq!(report.cleaning_summary.deduplication_rate, "0.00%");
    }

    #[test]
    fn test_unknown_only_store() {
        let report = build(&store_with(&[("UNKNOWN_DATE", 4)]));
        assert_eq!(report.total_articles, 4);
        assert_eq!(report.daily_statistics.articles_per_day[&PublishedDate::Unknown], 4);
        assert_eq!(report.daily_statistics.average_per_day, 0.0);
        assert_eq!(report.daily_statistics.dates, 0);
        assert_eq!(report.date_range.earliest, Some(PublishedDate::Unknown));
        assert_eq!(report.date_range.latest, Some(PublishedDate::Unknown));
    }

    #[test]
    fn test_average_excludes_boundary_days() {
        let report = build(&store_with(&[
            ("2024-01-01", 5),
            ("2024-01-02", 100),
            ("2024-01-03", 7),
        ]));
        assert_eq!(report.daily_statistics.average_per_day, 100.0);
        assert_eq!(report.daily_statistics.max_per_day, 100);
        assert_eq!(report.daily_statistics.min_per_day, 100);
        assert_eq!(report.date_range.earliest, Some(day("2024-01-01")));
        assert_eq!(report.date_range.latest, Some(day("2024-01-03")));
    }

    #[test]
    fn test_totals_reconcile_with_unknown_bucket() {
        let report = build(&store_with(&[
            ("2024-03-01", 2),
            ("2024-03-02", 40),
            ("2024-03-03", 60),
            ("2024-03-04", 1),
            ("UNKNOWN_DATE", 3),
        ]));
        let per_day = &report.daily_statistics.articles_per_day;
        assert_eq!(per_day.values().sum::<usize>(), report.total_articles);
        assert_eq!(report.total_articles, 106);
        assert_eq!(report.daily_statistics.dates, 4);
        assert_eq!(report.daily_statistics.average_per_day, 50.0);
        assert_eq!(report.daily_statistics.min_per_day, 40);
        assert_eq!(report.daily_statistics.max_per_day, 60);
        assert_eq!(report.date_range.latest, Some(day("2024-03-04")));
    }

    #[test]
    fn test_short_crawl_uses_all_known_days() {
        let report = build(&store_with(&[("2024-01-01", 4), ("2024-01-02", 8)]));
        assert_eq!(report.daily_statistics.average_per_day, 6.0);
        assert_eq!(report.daily_statistics.min_per_day, 4);
        assert_eq!(report.daily_statistics.max_per_day, 8);
    }

    #[test]
    fn test_cleaning_summary_counts_overwrites() {
        let mut store = store_with(&[("2024-01-01", 3)]);
        let again = store.get("https://example.com/blog/1").cloned().unwrap();
        store.upsert(again);
        let report = build(&store);
        assert_eq!(report.cleaning_summary.initial_article_count, 4);
        assert_eq!(report.cleaning_summary.final_article_count, 3);
        assert_eq!(report.cleaning_summary.duplicates_removed, 1);
        assert_eq!(report.cleaning_summary.deduplication_rate, "25.00%");
    }

    #[test]
    fn test_report_json_shape() {
        let report = build(&store_with(&[("2024-01-01", 1), ("UNKNOWN_DATE", 1)]));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["date_range"]["earliest"], "2024-01-01");
        assert_eq!(json["daily_statistics"]["articles_per_day"]["UNKNOWN_DATE"], 1);
        assert!(json["daily_statistics"]["average_per_day"].is_number());
        assert!(json["daily_statistics"]["max_per_day"].is_number());
    }
}
