//! The WhatsApp Web client behind the [`Automation`] trait.

use crate::{events::EventRouter, send, store::SessionStore};
use async_trait::async_trait;
use mamaz_core::{
    error::RelayError,
    traits::{Automation, AutomationSession, ClientStatus, SessionEvents, StartOptions},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};
use whatsapp_rust::{bot::Bot, client::Client};
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

/// Database file inside the session token directory.
pub const SESSION_DB: &str = "session.db";

/// Builds WhatsApp Web clients, one per session start.
pub struct WhatsAppAutomation {
    device_name: String,
}

impl WhatsAppAutomation {
    /// `device_name` is what the phone lists under "Linked devices".
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }
}

#[async_trait]
impl Automation for WhatsAppAutomation {
    fn name(&self) -> &str {
        "whatsapp-web"
    }

    async fn start(
        &self,
        options: &StartOptions,
        events: Arc<dyn SessionEvents>,
    ) -> Result<Arc<dyn AutomationSession>, RelayError> {
        std::fs::create_dir_all(&options.session_dir)?;
        let db_path = options.session_dir.join(SESSION_DB);
        info!(
            "whatsapp: starting session '{}' ({})",
            options.session_name,
            db_path.display()
        );
        if let Some(path) = &options.browser_executable {
            debug!("whatsapp: browser executable {path} not needed by the native client");
        }

        let backend = Arc::new(
            SessionStore::open(&db_path)
                .await
                .map_err(|e| RelayError::Automation(format!("session store init failed: {e}")))?,
        );

        let router = Arc::new(EventRouter::new(events.clone(), options.headless));
        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some(self.device_name.clone()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .on_event(move |event, _client| {
                let router = router.clone();
                async move { router.dispatch(event) }
            })
            .build()
            .await
            .map_err(|e| RelayError::Automation(format!("bot build failed: {e}")))?;

        let client = bot.client();
        let handle = bot
            .run()
            .await
            .map_err(|e| RelayError::Automation(format!("bot run failed: {e}")))?;

        let closed = Arc::new(AtomicBool::new(false));
        let abort = handle.abort_handle();
        tokio::spawn(watch_run(handle, closed.clone(), events));

        Ok(Arc::new(WhatsAppSession {
            client,
            abort,
            closed,
        }))
    }
}

/// Report `ClientClosed` if the run task ends without `close()`.
async fn watch_run(handle: JoinHandle<()>, closed: Arc<AtomicBool>, events: Arc<dyn SessionEvents>) {
    let result = handle.await;
    if closed.load(Ordering::SeqCst) {
        return;
    }
    match result {
        Ok(()) => warn!("whatsapp: client loop exited"),
        Err(e) => warn!("whatsapp: client loop failed: {e}"),
    }
    events.on_status(ClientStatus::ClientClosed);
}

/// A running WhatsApp Web client.
pub struct WhatsAppSession {
    client: Arc<Client>,
    abort: AbortHandle,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl AutomationSession for WhatsAppSession {
    async fn send_text(&self, jid: &str, text: &str) -> Result<(), RelayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelayError::Automation("client is closed".into()));
        }
        send::send_text(&self.client, jid, text).await
    }

    async fn close(&self) -> Result<(), RelayError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("whatsapp: closing client");
            self.abort.abort();
        }
        Ok(())
    }
}
