//! In-memory, URL-keyed collection of discovered articles.
//!
//! The URL map is the only source of truth. The per-date index is a cache
//! derived from it: it is rebuilt in full by [`ArticleStore::bulk_load`] and
//! [`ArticleStore::rebuild_index`], and marked stale by every upsert instead
//! of being patched in place. Readers that need it while stale get a freshly
//! computed copy, so they never observe a half-updated index.
//!
//! The store has no interior locking. The crawl loop is its only writer and
//! runs strictly sequentially.

use crate::models::{ArticleIdPattern, ArticleRecord, CheckpointSnapshot, PublishedDate};
use chrono::Utc;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// Article URLs grouped by publication date, each bucket ordered by
/// listing page and then URL.
pub type DateIndex = BTreeMap<PublishedDate, Vec<String>>;

#[derive(Debug, Default)]
pub struct ArticleStore {
    articles: HashMap<String, ArticleRecord>,
    by_date: DateIndex,
    index_stale: bool,
    /// Records offered since creation or the last bulk load, duplicates included.
    discoveries: usize,
}

impl ArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, url: &str) -> Option<&ArticleRecord> {
        self.articles.get(url)
    }

    #[cfg(test)]
    pub fn records(&self) -> impl Iterator<Item = &ArticleRecord> {
        self.articles.values()
    }

    /// Number of records offered through [`upsert`](Self::upsert) or
    /// [`bulk_load`](Self::bulk_load), counting repeated URLs each time.
    pub fn discoveries(&self) -> usize {
        self.discoveries
    }

    /// Insert `record`, replacing any record with the same URL.
    ///
    /// The replacement is whole: a later sighting of a URL overwrites every
    /// field of the earlier one. The date index is marked stale rather than
    /// patched.
    ///
    /// # Arguments
    ///
    /// * `record` - The parsed article; its `url` is the key
    ///
    /// # Returns
    ///
    /// The replaced record, or `None` when the URL was new.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let mut store = ArticleStore::new();
    /// assert!(store.upsert(record.clone()).is_none());
    /// assert_eq!(store.upsert(record.clone()), Some(record));
    /// assert_eq!(store.len(), 1);
    /// ```
    pub fn upsert(&mut self, record: ArticleRecord) -> Option<ArticleRecord> {
        self.discoveries += 1;
        self.index_stale = true;
        self.articles.insert(record.url.clone(), record)
    }

    /// Replace the whole collection and rebuild the date index.
    ///
    /// Used when restoring a checkpoint. Records sharing a URL collapse to
    /// the last one in `records`, and the discovery counter restarts at the
    /// number of distinct URLs.
    ///
    /// # Arguments
    ///
    /// * `records` - Every record to keep; anything stored before is dropped
    pub fn bulk_load<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = ArticleRecord>,
    {
        self.articles = records
            .into_iter()
            .map(|r| (r.url.clone(), r))
            .collect();
        self.discoveries = self.articles.len();
        self.rebuild_index();
    }

    /// Recompute the date index from the URL map.
    pub fn rebuild_index(&mut self) {
        self.by_date = self.compute_index();
        self.index_stale = false;
    }

    #[cfg(test)]
    pub fn index_is_current(&self) -> bool {
        !self.index_stale
    }

    /// The date index; borrowed when current, computed on the fly otherwise.
    pub fn date_index(&self) -> Cow<'_, DateIndex> {
        if self.index_stale {
            Cow::Owned(self.compute_index())
        } else {
            Cow::Borrowed(&self.by_date)
        }
    }

    /// Records published on `date`, in index order.
    #[cfg(test)]
    pub fn articles_on(&self, date: PublishedDate) -> Vec<&ArticleRecord> {
        self.date_index()
            .get(&date)
            .map(|urls| urls.iter().filter_map(|u| self.articles.get(u)).collect())
            .unwrap_or_default()
    }

    fn compute_index(&self) -> DateIndex {
        let mut index = DateIndex::new();
        for record in self.ordered() {
            index
                .entry(record.date_parsed)
                .or_default()
                .push(record.url.clone());
        }
        index
    }

    /// All records ordered by listing page, then URL.
    pub fn ordered(&self) -> Vec<&ArticleRecord> {
        let mut records: Vec<&ArticleRecord> = self.articles.values().collect();
        records.sort_by(|a, b| {
            a.page_number
                .cmp(&b.page_number)
                .then_with(|| a.url.cmp(&b.url))
        });
        records
    }

    /// Snapshot of the full collection for writing to a checkpoint.
    pub fn snapshot(&self) -> CheckpointSnapshot {
        let articles: Vec<ArticleRecord> = self.ordered().into_iter().cloned().collect();
        CheckpointSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            articles_count: articles.len(),
            articles,
        }
    }

    /// Smallest article identifier found in any stored URL.
    ///
    /// `None` when the store is empty or no URL carries an identifier.
    pub fn min_article_id(&self, pattern: &ArticleIdPattern) -> Option<u64> {
        self.articles
            .keys()
            .filter_map(|url| pattern.extract(url))
            .min()
    }
}
