//! In-memory automation client for tests.

use crate::gateway::{activity::ActivityLog, pipeline::MessagePipeline};
use async_trait::async_trait;
use mamaz_core::{
    config::WebhookConfig,
    error::RelayError,
    message::InboundMessage,
    traits::{
        Automation, AutomationSession, ClientStatus, ConnectionState, SessionEvents, StartOptions,
    },
};
use mamaz_webhook::{ReplyResolver, WebhookClient};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

/// Pipeline with no webhook backend: replies fall back, logs go nowhere.
pub fn offline_pipeline() -> Arc<MessagePipeline> {
    let client = WebhookClient::new(&WebhookConfig::default()).unwrap();
    let (activity, _rx) = ActivityLog::channel(16);
    Arc::new(MessagePipeline::new(
        ReplyResolver::new(client, None),
        activity,
        100,
    ))
}

pub fn inbound(id: &str, from: &str, body: &str) -> InboundMessage {
    InboundMessage {
        id: id.to_string(),
        from: from.to_string(),
        body: body.to_string(),
        is_group: false,
        from_me: false,
        timestamp: 1_700_000_000,
    }
}

/// Records sends; optionally fails them.
#[derive(Default)]
pub struct FakeSession {
    sent: Mutex<Vec<(String, String)>>,
    fail_send: bool,
    closed: AtomicBool,
}

impl FakeSession {
    pub fn failing() -> Self {
        Self {
            fail_send: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AutomationSession for FakeSession {
    async fn send_text(&self, jid: &str, text: &str) -> Result<(), RelayError> {
        if self.fail_send {
            return Err(RelayError::Automation("connection reset".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((jid.to_string(), text.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), RelayError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out [`FakeSession`]s and keeps the latest event sink so tests can
/// play the client's side.
#[derive(Default)]
pub struct FakeAutomation {
    starts: AtomicUsize,
    /// Number of upcoming `start` calls that fail.
    failures: AtomicUsize,
    fail_sends: AtomicBool,
    events: Mutex<Vec<Arc<dyn SessionEvents>>>,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeAutomation {
    pub fn failing(times: usize) -> Self {
        let fake = Self::default();
        fake.failures.store(times, Ordering::SeqCst);
        fake
    }

    /// Sessions created from now on reject every send.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Event sink handed to the `n`th successful start (0-based).
    pub fn events(&self, n: usize) -> Arc<dyn SessionEvents> {
        self.events.lock().unwrap()[n].clone()
    }

    pub fn latest_events(&self) -> Arc<dyn SessionEvents> {
        let events = self.events.lock().unwrap();
        events[events.len() - 1].clone()
    }

    pub fn session(&self, n: usize) -> Arc<FakeSession> {
        self.sessions.lock().unwrap()[n].clone()
    }

    pub fn status(&self, status: ClientStatus) {
        self.latest_events().on_status(status);
    }

    pub fn state(&self, state: ConnectionState) {
        self.latest_events().on_state_change(state);
    }
}

#[async_trait]
impl Automation for FakeAutomation {
    fn name(&self) -> &str {
        "fake"
    }

    async fn start(
        &self,
        _options: &StartOptions,
        events: Arc<dyn SessionEvents>,
    ) -> Result<Arc<dyn AutomationSession>, RelayError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(RelayError::Automation("browser crashed".into()));
        }

        let session = Arc::new(if self.fail_sends.load(Ordering::SeqCst) {
            FakeSession::failing()
        } else {
            FakeSession::default()
        });
        self.events.lock().unwrap().push(events);
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}
