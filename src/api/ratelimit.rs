//! Sliding-window request ledger keyed by caller address.

use mamaz_core::config::RateLimitConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    ledger: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
            ledger: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request from `client`. Returns `false` if it is over the limit.
    pub fn check(&self, client: &str) -> bool {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> bool {
        let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        let hits = ledger.entry(client.to_string()).or_default();
        expire(hits, now, self.window);
        if hits.len() >= self.max_requests {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Drop expired timestamps and empty entries. Returns removed client count.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn prune_at(&self, now: Instant) -> usize {
        let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        let before = ledger.len();
        ledger.retain(|_, hits| {
            expire(hits, now, self.window);
            !hits.is_empty()
        });
        before - ledger.len()
    }

    /// Clients with at least one request inside the window (as of last prune).
    pub fn clients(&self) -> usize {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn expire(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = hits.front() {
        if now.saturating_duration_since(oldest) >= window {
            hits.pop_front();
        } else {
            break;
        }
    }
}
