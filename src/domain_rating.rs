use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future;
use log::{info, warn};
use reqwest::Client;
use serde_json::Value;

use crate::delay_manager;
use crate::error::ProviderError;
use crate::search_engine::{DrSource, WebsiteRecord};

/// Batch size for provider lookups. Together with the inter-batch pause this
/// is the rate-limit contract with the score provider.
pub const BATCH_SIZE: usize = 5;

/// Capability seam for the score provider.
#[async_trait]
pub trait RatingProvider: Send + Sync {
    async fn domain_rating(&self, domain: &str) -> Result<u8, ProviderError>;
}

/// Annotates website records with a domain rating. Without a provider every
/// record gets a mock score synchronously; with one, lookups run in batches
/// of [`BATCH_SIZE`] with a mandatory pause between batches.
pub struct RatingChecker {
    provider: Option<Arc<dyn RatingProvider>>,
}

impl RatingChecker {
    pub fn new(provider: Option<Arc<dyn RatingProvider>>) -> Self {
        RatingChecker { provider }
    }

    /// Output has the same length and order as the input; a failed lookup is
    /// quarantined into its own record and never aborts the batch.
    pub async fn check_domain_ratings(&self, websites: Vec<WebsiteRecord>) -> Vec<WebsiteRecord> {
        info!("Checking domain ratings for {} websites", websites.len());

        let Some(provider) = &self.provider else {
            warn!("No rating provider configured. Using mock domain ratings.");
            return websites.into_iter().map(mock_rating).collect();
        };

        let batches: Vec<&[WebsiteRecord]> = websites.chunks(BATCH_SIZE).collect();
        let total = batches.len();
        let mut rated = Vec::with_capacity(websites.len());

        for (i, batch) in batches.into_iter().enumerate() {
            let lookups = batch
                .iter()
                .map(|website| rate_single(provider.as_ref(), website.clone()));
            rated.extend(future::join_all(lookups).await);

            if i + 1 < total {
                delay_manager::batch_delay().await;
            }
        }

        rated
    }
}

async fn rate_single(provider: &dyn RatingProvider, mut website: WebsiteRecord) -> WebsiteRecord {
    info!("Checking DR for: {}", website.domain);
    match provider.domain_rating(&website.domain).await {
        Ok(dr) => {
            website.dr = Some(dr);
            website.dr_source = Some(DrSource::Provider);
            website.dr_error = None;
        }
        Err(e) => {
            warn!("DR lookup failed for {}: {}", website.domain, e);
            website.dr = Some(0);
            website.dr_source = Some(DrSource::Error);
            website.dr_error = Some(e.to_string());
        }
    }
    website.dr_checked = Some(Utc::now());
    website
}

fn mock_rating(mut website: WebsiteRecord) -> WebsiteRecord {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    website.dr = Some(rng.gen_range(0..100));
    website.dr_source = Some(DrSource::Mock);
    website.dr_checked = Some(Utc::now());
    website
}

/// Site-explorer overview lookup keyed by domain. The response nests the
/// rating under `domain.domain_rating`; a missing field counts as 0.
pub struct AhrefsProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AhrefsProvider {
    pub fn new(api_key: &str) -> Self {
        AhrefsProvider {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: "https://apiv2.ahrefs.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }
}

#[async_trait]
impl RatingProvider for AhrefsProvider {
    async fn domain_rating(&self, domain: &str) -> Result<u8, ProviderError> {
        let url = format!("{}/site-explorer/overview", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("token", self.api_key.as_str()),
                ("from", "domain"),
                ("target", domain),
                ("mode", "domain"),
                ("output", "json"),
                ("limit", "1"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let body: Value = resp.json().await?;
        let dr = body
            .pointer("/domain/domain_rating")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        Ok(dr.clamp(0.0, 100.0).round() as u8)
    }
}
