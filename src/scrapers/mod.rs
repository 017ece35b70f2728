//! Retrieval and parsing of the blog listing.
//!
//! The crawl touches the site in two ways:
//!
//! 1. **Fetching**: [`fetch::PageSource`] returns the raw markup of one listing
//!    page, or a [`fetch::FetchError`] (timeouts included).
//! 2. **Parsing**: [`listing::ListingParser`] turns that markup into the
//!    pagination bound and into [`crate::models::ArticleRecord`]s.
//!
//! Neither half keeps state between pages; sequencing, rate limiting and
//! failure handling belong to [`crate::crawler`].

pub mod fetch;
pub mod listing;
