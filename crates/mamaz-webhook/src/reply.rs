//! AI reply resolution with a constant fallback.

use crate::client::{CallOutcome, WebhookClient, DEFAULT_RETRIES, GET_REPLY};
use mamaz_core::message::ReplySource;
use serde_json::{json, Value};
use tracing::debug;

/// Sent whenever the backend has nothing usable to say.
pub const FALLBACK_REPLY: &str = "Hi! The bot is live 🚀";

/// Asks the backend for a reply to a user message.
#[derive(Clone)]
pub struct ReplyResolver {
    client: WebhookClient,
    business_phone: Option<String>,
}

impl ReplyResolver {
    pub fn new(client: WebhookClient, business_phone: Option<String>) -> Self {
        Self {
            client,
            business_phone,
        }
    }

    /// Resolve a reply for `text` from `user_id`. Never fails.
    pub async fn resolve(&self, user_id: &str, text: &str) -> (String, ReplySource) {
        let payload = json!({
            "user_id": user_id,
            "message": text,
            "business_phone": self.business_phone,
        });

        let outcome = self.client.call(GET_REPLY, &payload, DEFAULT_RETRIES).await;
        match extract_reply(&outcome) {
            Some(reply) => (reply, ReplySource::Ai),
            None => {
                debug!("reply: using fallback for {user_id}");
                (FALLBACK_REPLY.to_string(), ReplySource::Fallback)
            }
        }
    }
}

/// A non-blank `reply` string from a successful call.
fn extract_reply(outcome: &CallOutcome) -> Option<String> {
    let CallOutcome::Success(body) = outcome else {
        return None;
    };
    body.get("reply")
        .and_then(Value::as_str)
        .filter(|r| !r.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mamaz_core::config::WebhookConfig;

    #[test]
    fn test_extract_reply_variants() {
        let ok = CallOutcome::Success(json!({ "reply": "Shalom" }));
        assert_eq!(extract_reply(&ok).as_deref(), Some("Shalom"));

        for body in [
            json!({ "reply": "   " }),
            json!({ "reply": 42 }),
            json!({ "answer": "x" }),
            Value::Null,
        ] {
            assert_eq!(extract_reply(&CallOutcome::Success(body)), None);
        }
        assert_eq!(extract_reply(&CallOutcome::Skipped), None);
        assert_eq!(extract_reply(&CallOutcome::Failed("x".into())), None);
    }

    #[tokio::test]
    async fn test_unconfigured_backend_falls_back() {
        let client = WebhookClient::new(&WebhookConfig::default()).unwrap();
        let resolver = ReplyResolver::new(client, Some("+972500000000".into()));
        let (text, source) = resolver.resolve("972501234567@c.us", "hello").await;
        assert_eq!(text, FALLBACK_REPLY);
        assert_eq!(source, ReplySource::Fallback);
    }
}
