use crate::{error::RelayError, message::InboundMessage};
use async_trait::async_trait;
use std::{path::PathBuf, sync::Arc};

/// Automation backend trait: the external WhatsApp client.
///
/// Implementations own the protocol and the persisted token directory. The
/// relay only starts sessions, sends text, and closes them.
#[async_trait]
pub trait Automation: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Create a client and begin connecting.
    ///
    /// Lifecycle and inbound traffic are reported through `events` for as
    /// long as the returned session is alive.
    async fn start(
        &self,
        options: &StartOptions,
        events: Arc<dyn SessionEvents>,
    ) -> Result<Arc<dyn AutomationSession>, RelayError>;
}

/// A running automation client.
#[async_trait]
pub trait AutomationSession: Send + Sync {
    /// Send a text message to a chat JID (`...@c.us`).
    async fn send_text(&self, jid: &str, text: &str) -> Result<(), RelayError>;

    /// Tear the client down. Safe to call more than once.
    async fn close(&self) -> Result<(), RelayError>;
}

/// Callbacks from the automation client into the relay.
///
/// Called from the client's event task; implementations must not block.
pub trait SessionEvents: Send + Sync {
    /// A new login QR is available as PNG bytes.
    fn on_qr(&self, png: &[u8], attempt: u32);

    /// The client's coarse login status changed.
    fn on_status(&self, status: ClientStatus);

    /// The underlying socket changed state.
    fn on_state_change(&self, state: ConnectionState);

    /// An inbound chat message arrived.
    fn on_message(&self, message: InboundMessage);
}

/// Login status reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    LoggedIn,
    NotLoggedIn,
    QrScanned,
    QrReadFailed,
    ClientClosed,
    MobileDisconnected,
    TokenDeleted,
}

/// Transport-level connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Parameters for [`Automation::start`].
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub session_name: String,
    pub headless: bool,
    pub browser_executable: Option<String>,
    /// Where the client persists its session token.
    pub session_dir: PathBuf,
}
