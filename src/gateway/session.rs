//! Session manager: drives the automation client and owns session state.
//!
//! Each client start gets a fresh epoch. Callbacks carry the epoch they were
//! registered with and are ignored once it is stale, so a closed or replaced
//! client can never move the state machine. At most one delayed restart
//! (reconnect or reset) is pending at a time; scheduling a new one or
//! resetting cancels it.

use super::pipeline::{Accepted, MessagePipeline};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use mamaz_core::{
    config::Config,
    error::RelayError,
    message::InboundMessage,
    session::{Effect, SessionEvent, SessionSnapshot, SessionState, Status},
    traits::{
        Automation, AutomationSession, ClientStatus, ConnectionState, SessionEvents, StartOptions,
    },
};
use std::path::Path;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError, Weak,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause between an explicit reset and the fresh start.
pub const RESET_DELAY: Duration = Duration::from_secs(2);

pub struct SessionManager {
    automation: Option<Arc<dyn Automation>>,
    options: StartOptions,
    pipeline: Arc<MessagePipeline>,
    state: Mutex<SessionState>,
    client: Mutex<Option<Arc<dyn AutomationSession>>>,
    pending: Mutex<Option<(u64, JoinHandle<()>)>>,
    tickets: AtomicU64,
    epoch: AtomicU64,
    reset_delay: Duration,
}

impl SessionManager {
    /// `automation` is `None` when the feature is disabled; the state then
    /// stays `disabled` for the life of the process.
    pub fn new(
        config: &Config,
        automation: Option<Arc<dyn Automation>>,
        pipeline: Arc<MessagePipeline>,
    ) -> Arc<Self> {
        Self::with_reset_delay(config, automation, pipeline, RESET_DELAY)
    }

    pub(crate) fn with_reset_delay(
        config: &Config,
        automation: Option<Arc<dyn Automation>>,
        pipeline: Arc<MessagePipeline>,
        reset_delay: Duration,
    ) -> Arc<Self> {
        let automation = automation.filter(|_| config.automation_enabled);
        Arc::new(Self {
            options: StartOptions {
                session_name: config.session_name.clone(),
                headless: config.headless,
                browser_executable: config.browser_executable.clone(),
                session_dir: config.session_token_dir(),
            },
            pipeline,
            state: Mutex::new(SessionState::new(automation.is_some())),
            automation,
            client: Mutex::new(None),
            pending: Mutex::new(None),
            tickets: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            reset_delay,
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state().snapshot()
    }

    pub fn status(&self) -> Status {
        self.state().status()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Current QR as raw base64, if one is waiting to be scanned.
    pub fn qr_base64(&self) -> Option<String> {
        self.state().qr().map(str::to_string)
    }

    pub fn token_dir(&self) -> &Path {
        &self.options.session_dir
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.state().record_error(message);
    }

    /// Like [`record_error`](Self::record_error) but gives up instead of
    /// blocking if the state is locked (used from the panic hook).
    pub fn try_record_error(&self, message: impl Into<String>) {
        let guard = match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(std::sync::TryLockError::Poisoned(p)) => Some(p.into_inner()),
            Err(std::sync::TryLockError::WouldBlock) => None,
        };
        if let Some(mut state) = guard {
            state.record_error(message);
        }
    }

    /// Run the startup procedure. No-op when automation is disabled.
    pub async fn start(self: &Arc<Self>) {
        let Some(automation) = self.automation.clone() else {
            return;
        };
        if matches!(self.status(), Status::Disabled | Status::Failed) {
            return;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.handle(epoch, SessionEvent::StartupBegan);
        info!("session: starting {} client", automation.name());

        let events: Arc<dyn SessionEvents> = Arc::new(EpochEvents {
            manager: Arc::downgrade(self),
            epoch,
        });
        match automation.start(&self.options, events).await {
            Ok(session) => {
                if self.epoch.load(Ordering::SeqCst) != epoch {
                    debug!("session: start superseded, closing new client");
                    close_quietly(session).await;
                    return;
                }
                let previous = self
                    .client
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .replace(session);
                if let Some(previous) = previous {
                    close_quietly(previous).await;
                }
            }
            Err(e) => {
                error!("session: startup failed: {e}");
                self.handle(epoch, SessionEvent::StartupFailed(e.to_string()));
            }
        }
    }

    /// Feed one lifecycle event through the state machine and act on it.
    fn handle(self: &Arc<Self>, epoch: u64, event: SessionEvent) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("session: dropping stale {event:?}");
            return;
        }

        let purge = event == SessionEvent::TokenDeleted;
        let (before, after, effect) = {
            let mut state = self.state();
            let before = state.status();
            let effect = state.apply(event);
            (before, state.status(), effect)
        };
        if before != after {
            info!("session: {before} -> {after}");
        }
        if after == Status::Connected {
            self.cancel_pending();
        }

        match effect {
            Effect::None => {}
            Effect::Reconnect(delay) => {
                warn!("session: reconnecting in {}ms", delay.as_millis());
                self.schedule(delay, purge);
            }
            Effect::GaveUp => error!("session: reconnect attempts exhausted, reset required"),
        }
    }

    /// Close the current client, optionally wipe the token directory, then
    /// start again after `delay`. Replaces any pending restart.
    fn schedule(self: &Arc<Self>, delay: Duration, purge_token: bool) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let me = Arc::clone(self);

        let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = tokio::spawn(async move {
            if let Some(old) = me.take_client() {
                close_quietly(old).await;
            }
            if purge_token {
                me.remove_token_dir().await;
            }
            tokio::time::sleep(delay).await;
            if me.claim_pending(ticket) {
                me.start().await;
            }
        });
        if let Some((_, old)) = slot.replace((ticket, handle)) {
            old.abort();
        }
    }

    /// Take ownership of the pending slot if it still belongs to `ticket`.
    fn claim_pending(&self, ticket: u64) -> bool {
        let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((t, _)) if *t == ticket => {
                slot.take();
                true
            }
            _ => false,
        }
    }

    fn cancel_pending(&self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((_, handle)) = pending {
            debug!("session: cancelling pending restart");
            handle.abort();
        }
    }

    pub fn has_pending_restart(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn take_client(&self) -> Option<Arc<dyn AutomationSession>> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn remove_token_dir(&self) {
        let dir = &self.options.session_dir;
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => info!("session: removed token directory {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("session: failed to remove {}: {e}", dir.display()),
        }
    }

    /// Explicit reset: drop the current client and token, clear state, and
    /// start fresh after a short delay.
    pub fn reset(self: &Arc<Self>) -> Result<(), RelayError> {
        if self.automation.is_none() {
            return Err(RelayError::Session("Automation is disabled".into()));
        }

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel_pending();
        self.state().reset();
        info!("session: reset requested");
        self.schedule(self.reset_delay, true);
        Ok(())
    }

    /// Stop everything; used on process shutdown.
    pub async fn shutdown(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel_pending();
        if let Some(client) = self.take_client() {
            info!("session: closing client");
            close_quietly(client).await;
        }
    }

    /// Send operator text through the live client.
    pub async fn send_text(&self, jid: &str, text: &str) -> Result<(), RelayError> {
        if !self.is_ready() {
            return Err(RelayError::Session("Bot is not connected".into()));
        }
        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| RelayError::Session("Bot is not connected".into()))?;
        client.send_text(jid, text).await
    }

    async fn respond(&self, accepted: Accepted) {
        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(client) = client else {
            warn!("pipeline: no client to reply to {}", accepted.from);
            self.record_error("onMessage: no active client");
            return;
        };
        if let Err(e) = self.pipeline.respond(accepted, client.as_ref()).await {
            error!("pipeline: {e}");
            self.record_error(format!("onMessage: {e}"));
        }
    }
}

async fn close_quietly(session: Arc<dyn AutomationSession>) {
    if let Err(e) = session.close().await {
        warn!("session: close failed: {e}");
    }
}

/// Callback sink bound to one client start.
struct EpochEvents {
    manager: Weak<SessionManager>,
    epoch: u64,
}

impl EpochEvents {
    fn live(&self) -> Option<Arc<SessionManager>> {
        self.manager
            .upgrade()
            .filter(|m| m.epoch.load(Ordering::SeqCst) == self.epoch)
    }
}

impl SessionEvents for EpochEvents {
    fn on_qr(&self, png: &[u8], attempt: u32) {
        if let Some(manager) = self.live() {
            info!("session: QR ready (attempt {attempt})");
            manager.handle(self.epoch, SessionEvent::QrGenerated(BASE64.encode(png)));
        }
    }

    fn on_status(&self, status: ClientStatus) {
        let Some(manager) = self.live() else {
            return;
        };
        debug!("session: client status {status:?}");
        let event = match status {
            ClientStatus::LoggedIn => SessionEvent::LoggedIn,
            ClientStatus::NotLoggedIn => SessionEvent::LoggedOut,
            ClientStatus::QrScanned => SessionEvent::QrScanned,
            ClientStatus::QrReadFailed => SessionEvent::QrReadFailed,
            ClientStatus::ClientClosed => SessionEvent::ClientClosed,
            ClientStatus::MobileDisconnected => SessionEvent::MobileDisconnected,
            ClientStatus::TokenDeleted => SessionEvent::TokenDeleted,
        };
        manager.handle(self.epoch, event);
    }

    fn on_state_change(&self, state: ConnectionState) {
        let Some(manager) = self.live() else {
            return;
        };
        match state {
            ConnectionState::Connected => debug!("session: transport connected"),
            ConnectionState::Disconnected => {
                // An unlinked phone waits for an explicit reset.
                if manager.status() != Status::MobileDisconnected {
                    manager.handle(self.epoch, SessionEvent::ConnectionLost("disconnected".into()));
                }
            }
        }
    }

    fn on_message(&self, message: InboundMessage) {
        let Some(manager) = self.live() else {
            return;
        };
        let id = message.id.clone();
        match manager.pipeline.accept(message) {
            Ok(accepted) => {
                tokio::spawn(async move { manager.respond(accepted).await });
            }
            Err(reason) => debug!("pipeline: skipped {id}: {reason}"),
        }
    }
}
