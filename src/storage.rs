use chrono::Utc;
use log::{info, warn};
use uuid::Uuid;

use crate::search_engine::WebsiteRecord;

/// Persistence stub. Decorates records with an id and a stored timestamp so
/// downstream references have a stable key; a durable store can slot in
/// behind the same call without changing callers.
pub struct Storage {
    configured: bool,
}

impl Storage {
    pub fn new(configured: bool) -> Self {
        if !configured {
            warn!("No persistence store configured. Records are decorated in-memory only.");
        }
        Storage { configured }
    }

    pub fn store_websites(&self, websites: Vec<WebsiteRecord>) -> Vec<WebsiteRecord> {
        info!(
            "Storing {} websites ({})",
            websites.len(),
            if self.configured { "store configured" } else { "stub" }
        );

        let stored_at = Utc::now();
        websites
            .into_iter()
            .map(|mut website| {
                website.id = Some(Uuid::new_v4().to_string());
                website.stored = Some(true);
                website.stored_at = Some(stored_at);
                website
            })
            .collect()
    }
}
