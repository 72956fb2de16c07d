use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::extractor::Extractor;

/// Contact details harvested from one site. Always produced, even on failure:
/// the domain is still derived and the failure message travels in `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub domain: String,
    pub email: Option<String>,
    pub all_emails: Vec<String>,
    pub contact_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Capability seam for contact extraction, so discovery can fan out over a
/// fake in tests.
#[async_trait]
pub trait ContactSource: Send + Sync {
    async fn contact_info(&self, url: &str) -> ContactInfo;
}

pub struct ContactScraper {
    client: Client,
    extractor: Extractor,
}

impl ContactScraper {
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .expect("Failed to build HTTP client");

        ContactScraper {
            client,
            extractor: Extractor::new(),
        }
    }

    fn get_random_user_agent(&self) -> &'static str {
        let uas = [
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
        ];
        use rand::Rng;
        let mut rng = rand::thread_rng();
        uas[rng.gen_range(0..uas.len())]
    }

    async fn fetch_page(&self, url: &str) -> Result<String, reqwest::Error> {
        let ua = self.get_random_user_agent();
        let resp = self.client.get(url).header(USER_AGENT, ua).send().await?;
        resp.text().await
    }

    async fn harvest(&self, url: &str) -> Result<(Vec<String>, Option<String>), reqwest::Error> {
        let mut html = self.fetch_page(url).await?;

        // Prefer the contact/about page when the site links to one.
        let contact_page = find_contact_link(&html, url);
        if let Some(contact_url) = &contact_page {
            info!("Following contact page: {}", contact_url);
            html = self.fetch_page(contact_url).await?;
        }

        Ok((self.extractor.extract_emails(&html), contact_page))
    }
}

impl Default for ContactScraper {
    fn default() -> Self {
        ContactScraper::new()
    }
}

#[async_trait]
impl ContactSource for ContactScraper {
    async fn contact_info(&self, url: &str) -> ContactInfo {
        info!("Extracting contact info from: {}", url);
        let domain = derive_domain(url);

        match self.harvest(url).await {
            Ok((emails, contact_page)) => ContactInfo {
                domain,
                email: emails.first().cloned(),
                all_emails: emails,
                contact_page,
                error: None,
            },
            Err(e) => {
                warn!("Contact extraction failed for {}: {}", url, e);
                ContactInfo {
                    domain,
                    email: None,
                    all_emails: Vec::new(),
                    contact_page: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// First anchor whose visible text mentions "contact" or "about", resolved
/// against the page URL.
fn find_contact_link(html: &str, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let document = Html::parse_document(html);
    let selector = Selector::parse("a").unwrap();

    for element in document.select(&selector) {
        let text = element.text().collect::<String>().to_lowercase();
        if !text.contains("contact") && !text.contains("about") {
            continue;
        }
        if let Some(href) = element.value().attr("href") {
            if let Ok(joined) = base.join(href) {
                if joined.scheme().starts_with("http") {
                    return Some(joined.to_string());
                }
            }
        }
    }
    None
}

/// Lowercased host without a leading `www.`. Falls back to trimming the raw
/// string when the URL does not parse, so a partial record still gets a key.
pub fn derive_domain(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if let Some(host) = parsed.host_str() {
            return host.strip_prefix("www.").unwrap_or(host).to_lowercase();
        }
    }
    let trimmed = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = trimmed.split('/').next().unwrap_or(trimmed);
    host.strip_prefix("www.").unwrap_or(host).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_domain_without_www() {
        assert_eq!(derive_domain("https://www.Example.com/blog"), "example.com");
        assert_eq!(derive_domain("http://sub.example.org"), "sub.example.org");
    }

    #[test]
    fn derives_domain_from_malformed_url() {
        assert_eq!(derive_domain("www.example.com/contact"), "example.com");
        assert_eq!(derive_domain("example.net"), "example.net");
    }

    #[test]
    fn finds_first_contact_link_by_visible_text() {
        let html = r#"
            <html><body>
              <a href="/pricing">Pricing</a>
              <a href="/about-us">About Us</a>
              <a href="/contact">Contact</a>
            </body></html>
        "#;
        let link = find_contact_link(html, "https://example.com/");
        assert_eq!(link.as_deref(), Some("https://example.com/about-us"));
    }

    #[test]
    fn contact_match_is_case_insensitive() {
        let html = r#"<a href="https://example.com/reach-us">CONTACT US</a>"#;
        let link = find_contact_link(html, "https://example.com/");
        assert_eq!(link.as_deref(), Some("https://example.com/reach-us"));
    }

    #[test]
    fn no_contact_link_stays_on_original_page() {
        let html = r#"<a href="/pricing">Pricing</a><a href="/faq">FAQ</a>"#;
        assert!(find_contact_link(html, "https://example.com/").is_none());
    }

    #[test]
    fn skips_non_http_contact_links() {
        let html = r#"<a href="mailto:hi@example.com">Contact</a>"#;
        assert!(find_contact_link(html, "https://example.com/").is_none());
    }
}
