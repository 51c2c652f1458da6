//! Translation of client events into relay callbacks.

use crate::{qr, send::to_relay_jid};
use mamaz_core::{
    message::InboundMessage,
    traits::{ClientStatus, ConnectionState, SessionEvents},
};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use tracing::{debug, info, warn};
use wacore::types::events::Event;

/// Forwards one client's events to the relay.
pub(crate) struct EventRouter {
    events: Arc<dyn SessionEvents>,
    headless: bool,
    qr_attempts: AtomicU32,
}

impl EventRouter {
    pub(crate) fn new(events: Arc<dyn SessionEvents>, headless: bool) -> Self {
        Self {
            events,
            headless,
            qr_attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn dispatch(&self, event: Event) {
        match event {
            Event::PairingQrCode { code, .. } => self.on_pairing_code(&code),
            Event::PairSuccess(_) => {
                info!("whatsapp: pairing successful");
                self.events.on_status(ClientStatus::QrScanned);
            }
            Event::Connected(_) => {
                info!("whatsapp: connected");
                self.qr_attempts.store(0, Ordering::Relaxed);
                self.events.on_status(ClientStatus::LoggedIn);
                self.events.on_state_change(ConnectionState::Connected);
            }
            Event::Disconnected(_) => {
                warn!("whatsapp: disconnected");
                self.events.on_state_change(ConnectionState::Disconnected);
            }
            Event::LoggedOut(_) => {
                warn!("whatsapp: logged out from the phone");
                self.events.on_status(ClientStatus::MobileDisconnected);
            }
            Event::Message(msg, info) => {
                let message = InboundMessage {
                    id: info.id.clone(),
                    from: to_relay_jid(&info.source.chat.to_string()),
                    body: message_text(&msg),
                    is_group: info.source.is_group,
                    from_me: info.source.is_from_me,
                    timestamp: info.timestamp.timestamp(),
                };
                debug!(
                    "whatsapp: message {} from {} (group={}, from_me={})",
                    message.id, message.from, message.is_group, message.from_me
                );
                self.events.on_message(message);
            }
            _ => {}
        }
    }

    fn on_pairing_code(&self, code: &str) {
        let attempt = self.qr_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        info!("whatsapp: QR code generated (attempt {attempt}), scan to pair");

        if !self.headless {
            match qr::render_terminal(code) {
                Ok(rendered) => eprintln!("\n{rendered}"),
                Err(e) => warn!("whatsapp: terminal QR failed: {e}"),
            }
        }

        match qr::render_png(code) {
            Ok(png) => self.events.on_qr(&png, attempt),
            Err(e) => {
                warn!("whatsapp: {e}");
                self.events.on_status(ClientStatus::QrReadFailed);
            }
        }
    }
}

/// Text of a message, looking through device-sent, ephemeral, and view-once
/// wrappers. Empty for media and other non-text content.
pub(crate) fn message_text(msg: &waproto::whatsapp::Message) -> String {
    let inner = msg
        .device_sent_message
        .as_ref()
        .and_then(|d| d.message.as_deref())
        .or_else(|| {
            msg.ephemeral_message
                .as_ref()
                .and_then(|e| e.message.as_deref())
        })
        .or_else(|| {
            msg.view_once_message
                .as_ref()
                .and_then(|v| v.message.as_deref())
        })
        .unwrap_or(msg);

    inner
        .conversation
        .as_deref()
        .or_else(|| {
            inner
                .extended_text_message
                .as_ref()
                .and_then(|e| e.text.as_deref())
        })
        .unwrap_or("")
        .to_string()
}
