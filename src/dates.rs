//! Normalization of listing date text into [`PublishedDate`].
//!
//! Listing cards print dates as `<weekday>, <day> de <month> de <year>`
//! (e.g. `lunes, 5 de febrero de 2024`). Month names are resolved through an
//! explicit [`MonthTable`] handed to the parser, so no process-wide locale is
//! involved and other languages can be plugged in from configuration.

use crate::models::PublishedDate;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

const SPANISH_MONTHS: [(&str, u32); 13] = [
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
];

/// Case-insensitive lookup from month name to month number (1-12).
#[derive(Debug, Clone)]
pub struct MonthTable {
    names: HashMap<String, u32>,
}

impl MonthTable {
    /// Spanish month names, including the `setiembre` spelling.
    pub fn spanish() -> Self {
        Self::from_names(SPANISH_MONTHS)
    }

    /// Build a table from `(name, month)` pairs. Pairs with a month outside
    /// 1-12 are ignored.
    pub fn from_names<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        let names = pairs
            .into_iter()
            .filter(|(_, m)| (1..=12).contains(m))
            .map(|(name, m)| (name.as_ref().trim().to_lowercase(), m))
            .collect();
        Self { names }
    }

    pub fn month(&self, name: &str) -> Option<u32> {
        self.names.get(&name.trim().to_lowercase()).copied()
    }
}

impl Default for MonthTable {
    fn default() -> Self {
        Self::spanish()
    }
}

/// Parse listing date text such as `lunes, 5 de febrero de 2024`.
///
/// Anything before the first comma is treated as a weekday and dropped.
/// Text that does not match `<day> de <month> de <year>` or names an
/// impossible date yields [`PublishedDate::Unknown`].
pub fn parse_listing_date(raw: &str, months: &MonthTable) -> PublishedDate {
    let text = raw.split_once(',').map(|(_, rest)| rest).unwrap_or(raw).trim();
    let tokens: Vec<&str> = text.split_whitespace().collect();

    let parsed = match tokens.as_slice() {
        [day, de1, month, de2, year]
            if de1.eq_ignore_ascii_case("de") && de2.eq_ignore_ascii_case("de") =>
        {
            let day = day.parse::<u32>().ok();
            let year = year.parse::<i32>().ok();
            let month = months.month(month);
            match (year, month, day) {
                (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y, m, d),
                _ => None,
            }
        }
        _ => None,
    };

    match parsed {
        Some(date) => PublishedDate::Known(date),
        None => {
            debug!(raw = %raw, "Could not parse listing date");
            PublishedDate::Unknown
        }
    }
}
