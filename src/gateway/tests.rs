use super::session::SessionManager;
use crate::testing::{inbound, offline_pipeline, FakeAutomation};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use mamaz_core::{
    config::Config,
    session::{Status, MAX_RECONNECT_ATTEMPTS},
    traits::{Automation, ClientStatus, ConnectionState, SessionEvents},
};
use std::sync::Arc;
use std::time::Duration;

fn config(tokens_dir: &str, disabled: bool) -> Config {
    let tokens_dir = tokens_dir.to_string();
    Config::from_lookup(move |key| match key {
        "TOKENS_DIR" => Some(tokens_dir.clone()),
        "DISABLE_VENOM" if disabled => Some("true".into()),
        _ => None,
    })
    .unwrap()
}

fn manager(fake: &Arc<FakeAutomation>, tokens: &tempfile::TempDir) -> Arc<SessionManager> {
    let automation: Arc<dyn Automation> = fake.clone();
    SessionManager::with_reset_delay(
        &config(tokens.path().to_str().unwrap(), false),
        Some(automation),
        offline_pipeline(),
        Duration::from_secs(2),
    )
}

/// Let spawned tasks run without moving the (paused) clock much.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_disabled_never_starts() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::default());
    let automation: Arc<dyn Automation> = fake.clone();
    let mgr = SessionManager::new(
        &config(tokens.path().to_str().unwrap(), true),
        Some(automation),
        offline_pipeline(),
    );

    mgr.start().await;
    assert_eq!(fake.starts(), 0);
    assert_eq!(mgr.status(), Status::Disabled);
    assert!(mgr.reset().is_err());
    assert!(mgr.send_text("1@c.us", "x").await.is_err());
}

#[tokio::test]
async fn test_qr_scan_login() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::default());
    let mgr = manager(&fake, &tokens);

    mgr.start().await;
    assert_eq!(mgr.status(), Status::Connecting);
    assert_eq!(mgr.qr_base64(), None);

    fake.latest_events().on_qr(b"fake-png", 1);
    assert_eq!(mgr.status(), Status::QrReady);
    assert_eq!(mgr.qr_base64(), Some(BASE64.encode(b"fake-png")));

    fake.status(ClientStatus::QrScanned);
    assert_eq!(mgr.status(), Status::Connecting);
    assert_eq!(mgr.qr_base64(), None);

    fake.status(ClientStatus::LoggedIn);
    let snap = mgr.snapshot();
    assert_eq!(snap.status, Status::Connected);
    assert!(snap.is_ready);
    assert!(!snap.has_qr);
}

#[tokio::test(start_paused = true)]
async fn test_startup_failures_exhaust_reconnects() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::failing(usize::MAX));
    let mgr = manager(&fake, &tokens);

    mgr.start().await;
    assert_eq!(mgr.status(), Status::Error);
    assert!(mgr.has_pending_restart());

    tokio::time::sleep(Duration::from_secs(300)).await;

    let snap = mgr.snapshot();
    assert_eq!(snap.status, Status::Failed);
    assert_eq!(snap.reconnect_attempts, MAX_RECONNECT_ATTEMPTS);
    assert_eq!(snap.last_error.as_deref(), Some("Max reconnect attempts reached"));
    assert_eq!(fake.starts(), 1 + MAX_RECONNECT_ATTEMPTS as usize);
    assert!(!mgr.has_pending_restart());
}

#[tokio::test(start_paused = true)]
async fn test_reset_recovers_from_failed() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::failing(1 + MAX_RECONNECT_ATTEMPTS as usize));
    let mgr = manager(&fake, &tokens);

    mgr.start().await;
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(mgr.status(), Status::Failed);

    mgr.reset().unwrap();
    assert_eq!(mgr.status(), Status::Disconnected);
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(mgr.status(), Status::Connecting);
    fake.status(ClientStatus::LoggedIn);
    assert_eq!(mgr.status(), Status::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_client_closed_reconnects_and_login_clears_counter() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::default());
    let mgr = manager(&fake, &tokens);

    mgr.start().await;
    fake.status(ClientStatus::LoggedIn);
    fake.status(ClientStatus::ClientClosed);
    assert_eq!(mgr.status(), Status::Disconnected);
    assert_eq!(mgr.snapshot().reconnect_attempts, 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(fake.starts(), 2);
    assert!(fake.session(0).is_closed());

    fake.status(ClientStatus::LoggedIn);
    assert_eq!(mgr.snapshot().reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_scheduled_reconnect() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::failing(1));
    let mgr = manager(&fake, &tokens);

    mgr.start().await;
    assert!(mgr.has_pending_restart());

    mgr.reset().unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    // The original reconnect never fired: only the reset's start ran.
    assert_eq!(fake.starts(), 2);
    assert_eq!(mgr.status(), Status::Connecting);
    assert_eq!(mgr.snapshot().reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reset_ignores_previous_client_and_wipes_token() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::default());
    let mgr = manager(&fake, &tokens);
    std::fs::create_dir_all(mgr.token_dir()).unwrap();
    std::fs::write(mgr.token_dir().join("session.db"), b"keys").unwrap();

    mgr.start().await;
    fake.status(ClientStatus::LoggedIn);
    let old_events = fake.events(0);

    mgr.reset().unwrap();
    settle().await;
    assert!(fake.session(0).is_closed());
    assert!(!mgr.token_dir().exists());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(fake.starts(), 2);

    old_events.on_status(ClientStatus::LoggedIn);
    assert_eq!(mgr.status(), Status::Connecting);

    fake.events(1).on_status(ClientStatus::LoggedIn);
    assert_eq!(mgr.status(), Status::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_unlinked_phone_waits_for_reset() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::default());
    let mgr = manager(&fake, &tokens);

    mgr.start().await;
    fake.status(ClientStatus::LoggedIn);
    fake.status(ClientStatus::MobileDisconnected);
    fake.state(ConnectionState::Disconnected);

    assert_eq!(mgr.status(), Status::MobileDisconnected);
    assert!(!mgr.has_pending_restart());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fake.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_drop_reconnects() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::default());
    let mgr = manager(&fake, &tokens);

    mgr.start().await;
    fake.status(ClientStatus::LoggedIn);
    fake.state(ConnectionState::Disconnected);
    assert_eq!(mgr.status(), Status::Disconnected);
    assert!(!mgr.is_ready());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(fake.starts(), 2);
}

#[tokio::test]
async fn test_inbound_message_answered_once() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::default());
    let mgr = manager(&fake, &tokens);

    mgr.start().await;
    fake.status(ClientStatus::LoggedIn);

    let events = fake.latest_events();
    let msg = inbound("M1", "972501234567@c.us", "hello");
    events.on_message(msg.clone());
    events.on_message(msg);
    let mut group = inbound("M2", "120363@g.us", "hi all");
    group.is_group = true;
    events.on_message(group);
    settle().await;

    let sent = fake.session(0).sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "972501234567@c.us");
}

#[tokio::test]
async fn test_send_failure_recorded_as_last_error() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::default());
    fake.fail_sends();
    let mgr = manager(&fake, &tokens);

    mgr.start().await;
    fake.status(ClientStatus::LoggedIn);
    fake.latest_events()
        .on_message(inbound("M1", "972501234567@c.us", "hello"));
    settle().await;

    let err = mgr.snapshot().last_error.unwrap();
    assert!(err.starts_with("onMessage: "), "{err}");
    assert_eq!(mgr.status(), Status::Connected);
}

#[tokio::test]
async fn test_operator_send_requires_connection() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::default());
    let mgr = manager(&fake, &tokens);

    mgr.start().await;
    let err = mgr.send_text("1@c.us", "x").await.unwrap_err();
    assert_eq!(err.to_string(), "session error: Bot is not connected");

    fake.status(ClientStatus::LoggedIn);
    mgr.send_text("972521234567@c.us", "hello").await.unwrap();
    assert_eq!(
        fake.session(0).sent(),
        vec![("972521234567@c.us".to_string(), "hello".to_string())]
    );
}

#[tokio::test]
async fn test_shutdown_closes_client_and_silences_callbacks() {
    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::default());
    let mgr = manager(&fake, &tokens);

    mgr.start().await;
    mgr.shutdown().await;
    assert!(fake.session(0).is_closed());

    fake.status(ClientStatus::ClientClosed);
    assert!(!mgr.has_pending_restart());
}

#[tokio::test]
async fn test_webhook_give_up_becomes_last_error() {
    use super::supervisor::webhook_failure_hook;
    use mamaz_core::config::WebhookConfig;
    use mamaz_webhook::WebhookClient;
    use serde_json::json;
    use std::sync::OnceLock;

    let tokens = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeAutomation::default());
    let slot = Arc::new(OnceLock::new());
    let client = WebhookClient::new(&WebhookConfig {
        base_url: Some("http://127.0.0.1:1".into()),
        api_key: Some("anon-key".into()),
    })
    .unwrap()
    .with_base_delay(Duration::from_millis(1))
    .with_failure_hook(webhook_failure_hook(slot.clone()));

    // Nobody to report to yet.
    assert!(!client.call("bot-message", &json!({}), 1).await.is_ok());

    let mgr = manager(&fake, &tokens);
    slot.set(Arc::downgrade(&mgr)).unwrap();
    assert_eq!(mgr.snapshot().last_error, None);

    assert!(!client.call("get-reply", &json!({}), 1).await.is_ok());
    let err = mgr.snapshot().last_error.unwrap();
    assert!(err.starts_with("Supabase get-reply: "), "{err}");
}
