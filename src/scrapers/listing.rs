//! Blog listing page parser.
//!
//! Listing pages are server-rendered HTML. Each article is a card:
//!
//! ```html
//! <div class="item-new">
//!   <a href="/nuestro-blog/48213/titulo">…</a>
//!   <div class="title">Título del artículo</div>
//!   <div class="tags"><div class="inner">Desarrollo | lunes, 5 de febrero de 2024</div></div>
//! </div>
//! ```
//!
//! and the page count lives in a Bootstrap pagination `nav` whose links end in
//! `/page/<n>`.

use crate::dates::{MonthTable, parse_listing_date};
use crate::models::ArticleRecord;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

static PAGINATION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"nav[aria-label="Page navigation example"]"#).expect("valid selector")
});
static PAGE_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a.page-link").expect("valid selector"));
static ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("div.item-new").expect("valid selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.title").expect("valid selector"));
static TAGS_INNER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.tags div.inner").expect("valid selector"));

/// Placeholder for a missing title or date on a card.
const MISSING: &str = "N/A";

/// Turns listing markup into article records.
#[derive(Debug, Clone)]
pub struct ListingParser {
    base_url: Url,
    months: MonthTable,
}

impl ListingParser {
    pub fn new(base_url: Url, months: MonthTable) -> Self {
        Self { base_url, months }
    }

    /// Highest page number advertised by the pagination bar.
    ///
    /// `None` when the page has no pagination bar at all; `Some(1)` when the
    /// bar exists but links to no numbered page.
    pub fn max_page(&self, html: &str) -> Option<u32> {
        let document = Html::parse_document(html);
        let nav = document.select(&PAGINATION).next()?;

        let max = nav
            .select(&PAGE_LINK)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(page_number_from_href)
            .fold(1, u32::max);
        Some(max)
    }

    /// All article cards on one listing page, tagged with `page`.
    ///
    /// Cards without a link or with an unresolvable link are skipped; missing
    /// titles and dates become `N/A`.
    pub fn articles(&self, html: &str, page: u32) -> Vec<ArticleRecord> {
        let document = Html::parse_document(html);
        document
            .select(&ITEM)
            .filter_map(|item| self.article(item, page))
            .collect()
    }

    fn article(&self, item: ElementRef<'_>, page: u32) -> Option<ArticleRecord> {
        let href = item.select(&LINK).next()?.value().attr("href")?;
        let url = match self.base_url.join(href.trim()) {
            Ok(url) => url,
            Err(e) => {
                warn!(page, href, error = %e, "Skipping article with unresolvable link");
                return None;
            }
        };

        let title = item
            .select(&TITLE)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| MISSING.to_string());

        let date_raw = item
            .select(&TAGS_INNER)
            .next()
            .map(element_text)
            .and_then(|text| {
                text.split('|')
                    .nth(1)
                    .map(|d| d.trim().to_string())
            })
            .unwrap_or_else(|| MISSING.to_string());

        let date_parsed = parse_listing_date(&date_raw, &self.months);
        debug!(page, url = %url, date = %date_parsed, "Parsed article card");

        Some(ArticleRecord {
            url: url.to_string(),
            title,
            date_raw,
            date_parsed,
            page_number: page,
            archive_url: None,
        })
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn page_number_from_href(href: &str) -> Option<u32> {
    let (_, tail) = href.rsplit_once("/page/")?;
    tail.trim_end_matches('/').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PublishedDate;
    use chrono::NaiveDate;

    const LISTING: &str = r#"
<html><body>
  <div class="item-new">
    <a href="/nuestro-blog/48213/primer-articulo"><img src="x.png"></a>
    <div class="title"> Primer artículo </div>
    <div class="tags"><div class="inner">Tecnología | lunes, 5 de febrero de 2024</div></div>
  </div>
  <div class="item-new">
    <a href="https://www.example.com/nuestro-blog/48212/segundo">Leer</a>
    <div class="tags"><div class="inner">sin fecha</div></div>
  </div>
  <div class="item-new">
    <div class="title">Sin enlace</div>
  </div>
  <div class="item-new">
    <a href="/nuestro-blog/48211/tercero"></a>
    <div class="title">Tercero</div>
    <div class="tags"><div class="inner">IA | 31 de febrero de 2024</div></div>
  </div>
  <nav aria-label="Page navigation example">
    <ul class="pagination">
      <li><a class="page-link" href="/blog/page/2">2</a></li>
      <li><a class="page-link" href="/blog/page/3">3</a></li>
      <li><a class="page-link" href="/blog/page/10437">Última</a></li>
      <li><a class="page-link" href="/blog/page/next">»</a></li>
      <li><a class="page-link" href="/blog">1</a></li>
    </ul>
  </nav>
</body></html>
"#;

    fn parser() -> ListingParser {
        ListingParser::new(Url::parse("https://www.example.com").unwrap(), MonthTable::spanish())
    }

    #[test]
    fn test_max_page_from_pagination() {
        assert_eq!(parser().max_page(LISTING), Some(10437));
    }

    #[test]
    fn test_max_page_without_numbered_links_is_one() {
        let html = r#"<nav aria-label="Page navigation example"><a class="page-link" href="/blog">1</a></nav>"#;
        assert_eq!(parser().max_page(html), Some(1));
    }

    #[test]
    fn test_max_page_missing_pagination() {
        assert_eq!(parser().max_page("<html><body><nav>menu</nav></body></html>"), None);
    }

    #[test]
    fn test_extracts_article_cards() {
        let articles = parser().articles(LISTING, 7);
        assert_eq!(articles.len(), 3);

        let first = &articles[0];
        assert_eq!(first.url, "https://www.example.com/nuestro-blog/48213/primer-articulo");
        assert_eq!(first.title, "Primer artículo");
        assert_eq!(first.date_raw, "lunes, 5 de febrero de 2024");
        assert_eq!(
            first.date_parsed,
            PublishedDate::Known(NaiveDate::from_ymd_opt(2024, 2, 5).unwrap())
        );
        assert_eq!(first.page_number, 7);
        assert_eq!(first.archive_url, None);

        let second = &articles[1];
        assert_eq!(second.url, "https://www.example.com/nuestro-blog/48212/segundo");
        assert_eq!(second.title, "N/A");
        assert_eq!(second.date_raw, "N/A");
        assert_eq!(second.date_parsed, PublishedDate::Unknown);

        let third = &articles[2];
        assert_eq!(third.date_raw, "31 de febrero de 2024");
        assert_eq!(third.date_parsed, PublishedDate::Unknown);
    }

    #[test]
    fn test_empty_or_unexpected_markup_yields_nothing() {
        assert!(parser().articles("", 1).is_empty());
        assert!(parser().articles("<html><p>Mantenimiento</p></html>", 1).is_empty());
    }
}
