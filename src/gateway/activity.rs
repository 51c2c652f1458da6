//! Best-effort chat activity logging through a bounded queue.
//!
//! Producers never wait: a full queue drops the event with a warning. One
//! worker drains the queue into the backend's `bot-message` function; its
//! failures are visible in the logs only.

use mamaz_webhook::client::{WebhookClient, BOT_MESSAGE, DEFAULT_RETRIES};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Pending events before new ones are dropped.
pub const ACTIVITY_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvent {
    pub user_id: String,
    pub message: String,
    pub kind: ActivityKind,
}

/// Producer side of the activity queue.
#[derive(Clone)]
pub struct ActivityLog {
    tx: mpsc::Sender<ActivityEvent>,
}

impl ActivityLog {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ActivityEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue without waiting.
    pub fn record(&self, user_id: &str, message: &str, kind: ActivityKind) {
        let event = ActivityEvent {
            user_id: user_id.to_string(),
            message: message.to_string(),
            kind,
        };
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(ev)) => {
                warn!("activity: queue full, dropping {:?} event for {}", ev.kind, ev.user_id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("activity: worker gone, event dropped");
            }
        }
    }
}

/// Drain the queue until every producer is dropped.
pub async fn run_worker(
    mut rx: mpsc::Receiver<ActivityEvent>,
    client: WebhookClient,
    business_phone: Option<String>,
) {
    while let Some(event) = rx.recv().await {
        let payload = json!({
            "user_id": event.user_id,
            "message": event.message,
            "message_type": event.kind,
            "business_phone": business_phone,
        });
        let outcome = client.call(BOT_MESSAGE, &payload, DEFAULT_RETRIES).await;
        if !outcome.is_ok() {
            warn!("activity: {:?} log for {} failed", event.kind, event.user_id);
        }
    }
    debug!("activity: worker stopped");
}
