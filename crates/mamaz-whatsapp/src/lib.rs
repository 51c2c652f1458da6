//! # mamaz-whatsapp
//!
//! WhatsApp Web automation via `whatsapp-rust`: the Noise/Signal protocol
//! runs natively, pairing happens by QR scan, and keys persist to a SQLite
//! file under the session token directory.

pub mod automation;
mod events;
pub mod qr;
pub mod send;
pub mod store;

pub use automation::{WhatsAppAutomation, WhatsAppSession, SESSION_DB};
pub use store::SessionStore;
