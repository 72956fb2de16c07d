use std::time::Duration;
use log::info;
use tokio::time;

/// Pause between rating lookup batches. This is rate-limit compliance for the
/// score provider, not an optimization; it must not be skipped or shortened.
pub const BATCH_DELAY_MS: u64 = 2000;

pub async fn batch_delay() {
    info!("Waiting {} ms before next batch (rate limit)...", BATCH_DELAY_MS);
    time::sleep(Duration::from_millis(BATCH_DELAY_MS)).await;
}
