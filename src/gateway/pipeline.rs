//! Inbound message pipeline: filter, dedup, reply, log.

use super::activity::{ActivityKind, ActivityLog};
use mamaz_core::{
    dedup::ProcessedSet,
    error::RelayError,
    message::{InboundMessage, OutboundReply, ReplySource},
    traits::AutomationSession,
};
use mamaz_webhook::ReplyResolver;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Inbound text beyond this many characters is cut off.
pub const MAX_BODY_CHARS: usize = 1000;

/// Why an inbound message was not answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    Group,
    StatusBroadcast,
    OwnMessage,
    Empty,
    Duplicate,
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Discard::Group => "group message",
            Discard::StatusBroadcast => "status broadcast",
            Discard::OwnMessage => "own message",
            Discard::Empty => "empty body",
            Discard::Duplicate => "already processed",
        })
    }
}

/// A message that passed filtering and dedup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub from: String,
    pub text: String,
}

pub struct MessagePipeline {
    processed: Mutex<ProcessedSet>,
    resolver: ReplyResolver,
    activity: ActivityLog,
}

impl MessagePipeline {
    pub fn new(resolver: ReplyResolver, activity: ActivityLog, max_processed: usize) -> Self {
        Self {
            processed: Mutex::new(ProcessedSet::new(max_processed)),
            resolver,
            activity,
        }
    }

    /// Filter and claim a message. Synchronous so the dedup check and insert
    /// cannot interleave with another message.
    pub fn accept(&self, message: InboundMessage) -> Result<Accepted, Discard> {
        if message.is_group {
            return Err(Discard::Group);
        }
        if message.is_status_broadcast() {
            return Err(Discard::StatusBroadcast);
        }
        if message.from_me {
            return Err(Discard::OwnMessage);
        }

        let body = message.body.trim();
        if body.is_empty() {
            return Err(Discard::Empty);
        }
        let text: String = body.chars().take(MAX_BODY_CHARS).collect();

        let fresh = self
            .processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(message.dedup_key());
        if !fresh {
            return Err(Discard::Duplicate);
        }

        Ok(Accepted {
            from: message.from,
            text,
        })
    }

    /// Resolve a reply, send it, then queue the activity log entries.
    ///
    /// A send failure is returned and nothing is logged for the message.
    pub async fn respond(
        &self,
        accepted: Accepted,
        session: &dyn AutomationSession,
    ) -> Result<OutboundReply, RelayError> {
        let (text, source) = self.resolver.resolve(&accepted.from, &accepted.text).await;
        let reply = OutboundReply {
            to: accepted.from,
            text,
            source,
        };

        session.send_text(&reply.to, &reply.text).await?;
        info!(
            "pipeline: replied to {} ({})",
            reply.to,
            match reply.source {
                ReplySource::Ai => "ai",
                ReplySource::Fallback => "fallback",
            }
        );

        self.activity
            .record(&reply.to, &accepted.text, ActivityKind::Incoming);
        self.activity
            .record(&reply.to, &reply.text, ActivityKind::Outgoing);
        Ok(reply)
    }

    pub fn processed_len(&self) -> usize {
        self.processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Evict down to half capacity if over. Returns evicted count.
    pub fn trim_processed(&self) -> usize {
        self.processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .trim()
    }
}
