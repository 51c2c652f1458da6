use serde::{Deserialize, Serialize};

use crate::jid::STATUS_BROADCAST;

/// An incoming chat event from the automation client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform message identifier.
    pub id: String,
    /// Sender JID (e.g. `972501234567@c.us`).
    pub from: String,
    /// Message text content. Empty for non-text messages.
    pub body: String,
    pub is_group: bool,
    /// Authored by this session (our own echo).
    pub from_me: bool,
    /// Unix seconds.
    pub timestamp: i64,
}

impl InboundMessage {
    /// Whether this event belongs to the status-broadcast pseudo-chat.
    pub fn is_status_broadcast(&self) -> bool {
        self.from == STATUS_BROADCAST
    }

    /// Composite key used for at-most-once processing.
    pub fn dedup_key(&self) -> String {
        format!("{}_{}", self.id, self.timestamp)
    }
}

/// Where a reply text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    /// Produced by the backend's `get-reply` function.
    Ai,
    /// The constant greeting used when the backend gives nothing usable.
    Fallback,
}

/// A reply to send back to a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundReply {
    pub to: String,
    pub text: String,
    pub source: ReplySource,
}
