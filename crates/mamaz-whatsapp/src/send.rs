//! Outbound text: JID translation, chunking, and send retry.

use mamaz_core::{error::RelayError, jid::DIRECT_SUFFIX};
use std::time::Duration;
use tracing::{error, warn};
use wacore_binary::jid::Jid;
use whatsapp_rust::client::Client;

/// WhatsApp's per-message text limit.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const PROTOCOL_SUFFIX: &str = "@s.whatsapp.net";
const RETRY_DELAYS_MS: [u64; 3] = [500, 1000, 2000];

/// `972...@c.us` to the protocol form `972...@s.whatsapp.net`.
pub fn to_protocol_jid(jid: &str) -> String {
    match jid.strip_suffix(DIRECT_SUFFIX) {
        Some(user) => format!("{user}{PROTOCOL_SUFFIX}"),
        None => jid.to_string(),
    }
}

/// Protocol form back to the `@c.us` form the relay uses.
pub fn to_relay_jid(jid: &str) -> String {
    match jid.strip_suffix(PROTOCOL_SUFFIX) {
        Some(user) => format!("{user}{DIRECT_SUFFIX}"),
        None => jid.to_string(),
    }
}

/// Split into chunks of at most `max_chars` characters, preferring newlines.
pub fn split_text(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max_chars {
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(i, _)| i);
        let cut = match rest[..limit].rfind('\n') {
            Some(nl) if nl > 0 => nl + 1,
            _ => limit,
        };
        chunks.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Send `text` to `jid`, chunked, retrying each chunk with backoff.
pub(crate) async fn send_text(client: &Client, jid: &str, text: &str) -> Result<(), RelayError> {
    let target: Jid = to_protocol_jid(jid)
        .parse()
        .map_err(|e| RelayError::Automation(format!("invalid jid '{jid}': {e}")))?;

    for chunk in split_text(text, MAX_MESSAGE_CHARS) {
        let msg = waproto::whatsapp::Message {
            conversation: Some(chunk.to_string()),
            ..Default::default()
        };
        retry_send(client, &target, msg).await?;
    }
    Ok(())
}

async fn retry_send(
    client: &Client,
    jid: &Jid,
    msg: waproto::whatsapp::Message,
) -> Result<String, RelayError> {
    let mut last_err = String::new();

    for (attempt, delay_ms) in RETRY_DELAYS_MS.iter().enumerate() {
        let attempt = attempt + 1;
        match client.send_message(jid.clone(), msg.clone()).await {
            Ok(id) => return Ok(id),
            Err(e) if attempt < RETRY_DELAYS_MS.len() => {
                warn!("whatsapp send attempt {attempt} failed: {e}, retrying in {delay_ms}ms");
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                last_err = e.to_string();
            }
            Err(e) => {
                error!("whatsapp send attempt {attempt} failed: {e}, giving up");
                last_err = e.to_string();
            }
        }
    }

    Err(RelayError::Automation(format!(
        "send failed after {} attempts: {last_err}",
        RETRY_DELAYS_MS.len()
    )))
}
