//! Rashifal (horoscope) aggregation with a per-day cache in the store.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use reqwest::header::USER_AGENT;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::Store;

pub const NOT_FOUND_MESSAGE: &str = "राशिफल डाटा फेला परेन।";
pub const LOAD_FAILED_MESSAGE: &str = "राशिफल लोड गर्न सकिएन।";

/// Listing text shorter than this is treated as a teaser.
const FULL_TEXT_MIN_CHARS: usize = 500;
const PAGE_TIMEOUT: Duration = Duration::from_secs(5);
const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const TRUNCATION: &str = "more...";

/// Nepali sign name to the slug used in upstream URLs.
pub const SIGNS: &[(&str, &str)] = &[
    ("मेष", "mesh"),
    ("वृष", "brish"),
    ("मिथुन", "mithun"),
    ("कर्कट", "karkat"),
    ("सिंह", "singha"),
    ("कन्या", "kanya"),
    ("तुला", "tula"),
    ("वृश्चिक", "brischik"),
    ("धनु", "dhanu"),
    ("मकर", "makar"),
    ("कुम्भ", "kumbh"),
    ("मीन", "meen"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            "yearly" => Ok(Period::Yearly),
            other => Err(format!("Invalid period: {}", other)),
        }
    }
}

/// A sign as asked for: the Nepali name and the URL slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignQuery {
    pub nepali: String,
    pub slug: String,
}

impl SignQuery {
    /// Accepts either form; unknown signs are matched lowercased.
    pub fn resolve(sign: &str) -> Self {
        let sign = sign.trim();
        if let Some((ne, slug)) = SIGNS.iter().find(|(ne, _)| *ne == sign) {
            return Self { nepali: ne.to_string(), slug: slug.to_string() };
        }
        let lower = sign.to_lowercase();
        match SIGNS.iter().find(|(_, slug)| *slug == lower) {
            Some((ne, slug)) => Self { nepali: ne.to_string(), slug: slug.to_string() },
            None => Self { nepali: sign.to_string(), slug: lower },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RashifalItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub url: String,
}

pub fn cache_key(period: Period, date: NaiveDate) -> String {
    format!("{}-{}", period, date.format("%Y-%m-%d"))
}

/// Index of the first item whose name holds the Nepali sign or whose URL
/// holds its slug.
pub fn find_sign(items: &[RashifalItem], sign: &SignQuery) -> Option<usize> {
    items.iter().position(|item| {
        (!item.name.is_empty() && item.name.contains(&sign.nepali))
            || (!item.url.is_empty() && item.url.contains(&sign.slug))
    })
}

/// Listings carry a teaser for anything but daily readings, and daily ones
/// are cut with a "More..." link.
pub fn needs_full_text(period: Period, text: &str) -> bool {
    (period != Period::Daily || text.contains("More..."))
        && text.chars().count() < FULL_TEXT_MIN_CHARS
}

fn strip_truncation(text: &str) -> &str {
    let text = text.trim_end();
    let cut = text.len().saturating_sub(TRUNCATION.len());
    match text.get(cut..) {
        Some(tail) if tail.eq_ignore_ascii_case(TRUNCATION) => text[..cut].trim_end(),
        _ => text,
    }
}

/// The reading on a sign page: the first paragraph under `.desc`.
pub fn extract_full_text(html: &str) -> Option<String> {
    let selector = Selector::parse(".desc p").ok()?;
    let document = Html::parse_document(html);
    let paragraph = document.select(&selector).next()?;
    let text: String = paragraph.text().collect();
    let text = strip_truncation(text.trim());
    (!text.is_empty()).then(|| text.to_string())
}

async fn fetch_full_text(client: &Client, page_url: &str, period: Period, slug: &str) -> Option<String> {
    let url = format!("{}/{}/{}", page_url.trim_end_matches('/'), period, slug);
    let page = async {
        client
            .get(&url)
            .header(USER_AGENT, BROWSER_AGENT)
            .timeout(PAGE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
    .await;
    match page {
        Ok(html) => extract_full_text(&html),
        Err(e) => {
            warn!(error = %e, %url, "rashifal page fetch failed, keeping listing text");
            None
        }
    }
}

/// Look up one sign, replacing teaser text with the full reading from its
/// page. A filled-in text is written back into the listing and the day's
/// cache entry, so later requests skip the page fetch.
pub async fn backfill(
    store: &dyn Store,
    client: &Client,
    page_url: &str,
    period: Period,
    listing: &mut Listing,
    sign: &SignQuery,
) -> Option<RashifalItem> {
    let idx = find_sign(&listing.items, sign)?;
    if !needs_full_text(period, &listing.items[idx].text) {
        return Some(listing.items[idx].clone());
    }

    if let Some(full) = fetch_full_text(client, page_url, period, &sign.slug).await {
        info!(%period, sign = %sign.slug, chars = full.chars().count(), "rashifal full text filled in");
        listing.items[idx].text = full;
        store_listing(store, period, &listing.items).await;
    }
    Some(listing.items[idx].clone())
}

/// Upsert today's entry. Failures are logged only.
async fn store_listing(store: &dyn Store, period: Period, items: &[RashifalItem]) {
    let key = cache_key(period, Utc::now().date_naive());
    match serde_json::to_value(items) {
        Ok(data) => {
            if let Err(e) = store.cache_horoscope(period.as_str(), &key, &data).await {
                warn!(error = %e, "failed to cache rashifal");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode rashifal for cache"),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RashifalError {
    #[error("rashifal source not configured")]
    NotConfigured,
    #[error("rashifal fetch failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rashifal source returned an empty list")]
    Empty,
}

/// A period's full list and whether it came from the cache.
#[derive(Debug, Clone)]
pub struct Listing {
    pub items: Vec<RashifalItem>,
    pub cached: bool,
}

async fn fetch(client: &Client, base_url: &str, period: Period) -> Result<Vec<RashifalItem>, RashifalError> {
    let items: Vec<RashifalItem> = client
        .get(format!("{}/{}", base_url.trim_end_matches('/'), period))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    if items.is_empty() {
        return Err(RashifalError::Empty);
    }
    Ok(items)
}

/// Serve from today's cache entry, else fetch and upsert. Cache failures are
/// logged and never fail the request.
pub async fn listing(
    store: &dyn Store,
    client: &Client,
    base_url: Option<&str>,
    period: Period,
) -> Result<Listing, RashifalError> {
    let key = cache_key(period, Utc::now().date_naive());

    match store.cached_horoscope(period.as_str(), &key).await {
        Ok(Some(data)) => match serde_json::from_value::<Vec<RashifalItem>>(data) {
            Ok(items) => {
                info!(%period, "serving rashifal from cache");
                return Ok(Listing { items, cached: true });
            }
            Err(e) => warn!(error = %e, %key, "discarding malformed rashifal cache entry"),
        },
        Ok(None) => {}
        Err(e) => warn!(error = %e, "rashifal cache lookup failed"),
    }

    let base_url = base_url.ok_or(RashifalError::NotConfigured)?;
    info!(%period, "rashifal cache miss, fetching");
    let items = fetch(client, base_url, period).await?;
    store_listing(store, period, &items).await;
    Ok(Listing { items, cached: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use axum::extract::Path;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn item(name: &str, url: &str) -> RashifalItem {
        RashifalItem { name: name.into(), text: format!("{} text", name), url: url.into() }
    }

    #[test]
    fn test_resolve_sign() {
        assert_eq!(SignQuery::resolve("मेष").slug, "mesh");
        assert_eq!(SignQuery::resolve("Makar").nepali, "मकर");
        let unknown = SignQuery::resolve("Ophiuchus");
        assert_eq!(unknown.slug, "ophiuchus");
        assert_eq!(unknown.nepali, "Ophiuchus");
    }

    #[test]
    fn test_period_parse_and_cache_key() {
        assert_eq!("weekly".parse::<Period>().unwrap(), Period::Weekly);
        assert!("hourly".parse::<Period>().is_err());
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(cache_key(Period::Daily, date), "daily-2025-03-09");
    }

    #[test]
    fn test_find_sign_by_name_or_slug() {
        let items = vec![
            item("मेष (चु, चे, चो)", "https://example.com/rashifal/daily/mesh"),
            item("", "https://example.com/rashifal/daily/makar"),
        ];
        assert_eq!(find_sign(&items, &SignQuery::resolve("मेष")), Some(0));
        assert_eq!(find_sign(&items, &SignQuery::resolve("मकर")), Some(1));
        assert!(find_sign(&items, &SignQuery::resolve("तुला")).is_none());
    }

    #[test]
    fn test_needs_full_text() {
        assert!(!needs_full_text(Period::Daily, "आज शुभ दिन"));
        assert!(needs_full_text(Period::Daily, "आज शुभ दिन More..."));
        assert!(needs_full_text(Period::Weekly, "धैर्य राख्नुहोस्"));
        assert!(!needs_full_text(Period::Monthly, &"क".repeat(500)));
    }

    #[test]
    fn test_extract_full_text_strips_more_link() {
        let html = r#"<html><body>
            <div class="desc"><p>  यो हप्ता धैर्य राख्नुहोस्। MORE... </p><p>second</p></div>
        </body></html>"#;
        assert_eq!(extract_full_text(html).as_deref(), Some("यो हप्ता धैर्य राख्नुहोस्।"));
        assert_eq!(extract_full_text("<div class=\"desc\"><p>  </p></div>"), None);
        assert_eq!(extract_full_text("<p>no desc</p>"), None);
    }

    #[tokio::test]
    async fn test_backfill_updates_response_and_cache() {
        let router = Router::new().route(
            "/{period}/{slug}",
            get(|Path((period, slug)): Path<(String, String)>| async move {
                axum::response::Html(format!(r#"<div class="desc"><p>{} {} पूरा राशिफल More...</p></div>"#, period, slug))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        let page_url = format!("http://{}", addr);

        let db = Database::in_memory().unwrap();
        let mut listing = Listing { items: vec![item("मेष", "/mesh"), item("मकर", "/makar")], cached: false };
        let sign = SignQuery::resolve("makar");

        let found = backfill(&db, &Client::new(), &page_url, Period::Weekly, &mut listing, &sign)
            .await
            .unwrap();
        assert_eq!(found.text, "weekly makar पूरा राशिफल");
        assert_eq!(listing.items[1].text, found.text);
        assert_eq!(listing.items[0].text, "मेष text");

        let key = cache_key(Period::Weekly, Utc::now().date_naive());
        let cached = db.cached_horoscope("weekly", &key).await.unwrap().unwrap();
        let cached: Vec<RashifalItem> = serde_json::from_value(cached).unwrap();
        assert_eq!(cached[1].text, "weekly makar पूरा राशिफल");
    }

    #[tokio::test]
    async fn test_backfill_keeps_teaser_when_page_is_down() {
        let db = Database::in_memory().unwrap();
        let mut listing = Listing { items: vec![item("मेष", "/mesh")], cached: true };
        let client = Client::new();
        let down = "http://127.0.0.1:9";
        let found = backfill(&db, &client, down, Period::Yearly, &mut listing, &SignQuery::resolve("mesh"))
            .await
            .unwrap();
        assert_eq!(found.text, "मेष text");

        let key = cache_key(Period::Yearly, Utc::now().date_naive());
        assert!(db.cached_horoscope("yearly", &key).await.unwrap().is_none());
        let missing = backfill(&db, &client, down, Period::Yearly, &mut listing, &SignQuery::resolve("tula")).await;
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_listing_caches_and_then_serves_from_cache() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/{period}",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(vec![item("मेष", "/mesh")])
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        let base = format!("http://{}", addr);

        let db = Database::in_memory().unwrap();
        let client = Client::new();

        let first = listing(&db, &client, Some(&base), Period::Daily).await.unwrap();
        assert!(!first.cached);
        let second = listing(&db, &client, Some(&base), Period::Daily).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.items, first.items);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listing_without_source_or_cache_fails() {
        let db = Database::in_memory().unwrap();
        let err = listing(&db, &Client::new(), None, Period::Yearly).await.unwrap_err();
        assert!(matches!(err, RashifalError::NotConfigured));
    }
}
