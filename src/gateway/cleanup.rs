//! Periodic housekeeping for the in-memory ledgers.

use super::pipeline::MessagePipeline;
use crate::api::ratelimit::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Prune the rate-limit ledger and trim the dedup set every `every`.
pub async fn cleanup_loop(limiter: Arc<RateLimiter>, pipeline: Arc<MessagePipeline>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let clients = limiter.prune();
        let evicted = pipeline.trim_processed();
        debug!(
            "cleanup: pruned {clients} idle clients, evicted {evicted} keys, {} remain",
            pipeline.processed_len()
        );
    }
}
