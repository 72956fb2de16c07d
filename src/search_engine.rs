use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future;
use log::{info, warn};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SearchError;
use crate::scraper::{ContactInfo, ContactSource};

/// One discovered candidate site, as it flows through discovery, enrichment,
/// and storage. Each step returns a decorated copy rather than mutating the
/// caller's record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteRecord {
    /// Lowercased host without a leading `www.`; the unique key for dedup
    /// and outreach sequencing.
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub all_emails: Vec<String>,
    pub contact_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dr: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dr_checked: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dr_source: Option<DrSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dr_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrSource {
    Mock,
    Provider,
    Error,
}

/// One raw search result, before contact enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Capability seam for the search provider; fatal failures propagate.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, term: &str) -> Result<Vec<SearchHit>, SearchError>;
}

/// Discovery collector: one search query, then concurrent contact extraction
/// per retained result, merged back in search-ranking order.
pub struct SearchEngine {
    provider: Arc<dyn SearchProvider>,
    contacts: Arc<dyn ContactSource>,
}

impl SearchEngine {
    pub fn new(provider: Arc<dyn SearchProvider>, contacts: Arc<dyn ContactSource>) -> Self {
        SearchEngine { provider, contacts }
    }

    pub async fn discover(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<WebsiteRecord>, SearchError> {
        let mut hits = self.provider.search(term).await?;
        hits.truncate(limit);
        info!("Search for '{}' kept {} results", term, hits.len());

        // Fan out; join_all collects positionally, so output order stays the
        // search ranking order no matter which lookup finishes first.
        let lookups = hits.iter().map(|hit| self.contacts.contact_info(&hit.url));
        let infos = future::join_all(lookups).await;

        Ok(hits
            .into_iter()
            .zip(infos)
            .map(|(hit, info)| merge(hit, info))
            .collect())
    }
}

fn merge(hit: SearchHit, info: ContactInfo) -> WebsiteRecord {
    WebsiteRecord {
        domain: info.domain,
        url: Some(hit.url),
        title: Some(hit.title),
        snippet: Some(hit.snippet),
        email: info.email,
        all_emails: info.all_emails,
        contact_page: info.contact_page,
        error: info.error,
        ..Default::default()
    }
}

/// DuckDuckGo HTML endpoint. No JS rendering needed, which keeps discovery a
/// plain HTTP fetch.
pub struct DuckDuckGoSearch {
    client: Client,
}

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .expect("Failed to build search client");

        DuckDuckGoSearch { client }
    }
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        DuckDuckGoSearch::new()
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, term: &str) -> Result<Vec<SearchHit>, SearchError> {
        let search_url = format!(
            "https://html.duckduckgo.com/html/?q={}",
            urlencoding::encode(term)
        );
        info!("Searching for: '{}'", term);

        let resp = self.client.get(&search_url).send().await?;
        if !resp.status().is_success() {
            warn!("Search failed with status: {}", resp.status());
            return Err(SearchError::BadStatus(resp.status()));
        }
        let html = resp.text().await?;

        Ok(parse_results(&html))
    }
}

/// Parse DDG result markup. `.result__a` carries the title and (redirect)
/// link, `.result__snippet` the description.
fn parse_results(html: &str) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let result_selector = Selector::parse(".result").unwrap();
    let link_selector = Selector::parse(".result__a").unwrap();
    let snippet_selector = Selector::parse(".result__snippet").unwrap();

    let mut hits = Vec::new();
    for result in document.select(&result_selector) {
        let Some(link) = result.select(&link_selector).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(url) = resolve_result_url(href) else {
            continue;
        };

        let title = link.text().collect::<String>().trim().to_string();
        let snippet = result
            .select(&snippet_selector)
            .next()
            .map(|s| s.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        hits.push(SearchHit { title, url, snippet });
    }
    hits
}

/// DDG wraps outbound links in a redirect carrying the target in `uddg`;
/// unwrap it and drop anything that is not a plain http(s) link.
fn resolve_result_url(href: &str) -> Option<String> {
    let base = Url::parse("https://html.duckduckgo.com").unwrap();
    let resolved = base.join(href).ok()?;

    if resolved
        .host_str()
        .is_some_and(|h| h.ends_with("duckduckgo.com"))
    {
        return resolved
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }

    if resolved.scheme().starts_with("http") {
        Some(resolved.to_string())
    } else {
        None
    }
}
