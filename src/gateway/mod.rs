//! Gateway: wires the session manager, message pipeline, background loops
//! and the HTTP control surface together, and owns graceful shutdown.

pub mod activity;
pub mod cleanup;
pub mod pipeline;
pub mod session;
pub mod supervisor;

#[cfg(test)]
mod tests;

use crate::api::{self, ratelimit::RateLimiter, ApiState};
use activity::{ActivityLog, ACTIVITY_QUEUE_CAPACITY};
use mamaz_core::{config::Config, traits::Automation};
use mamaz_webhook::{ReplyResolver, WebhookClient};
use pipeline::MessagePipeline;
use session::SessionManager;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{error, info};

/// The relay process: one session, one pipeline, one HTTP surface.
pub struct Gateway {
    config: Config,
    automation: Option<Arc<dyn Automation>>,
}

impl Gateway {
    /// `automation` is ignored when the config disables it.
    pub fn new(config: Config, automation: Option<Arc<dyn Automation>>) -> Self {
        Self { config, automation }
    }

    /// Run until a termination signal arrives or the HTTP server dies.
    pub async fn run(self) -> anyhow::Result<()> {
        let config = Arc::new(self.config);
        let session_slot = Arc::new(OnceLock::new());
        let webhook = WebhookClient::new(&config.webhook)?
            .with_failure_hook(supervisor::webhook_failure_hook(session_slot.clone()));
        info!(
            "mamaz gateway running | automation: {} | webhook: {} | business phone: {}",
            if config.automation_enabled {
                "enabled"
            } else {
                "disabled"
            },
            if webhook.is_configured() {
                "configured"
            } else {
                "skipped"
            },
            config.business_phone.as_deref().unwrap_or("unset"),
        );

        let (activity, activity_rx) = ActivityLog::channel(ACTIVITY_QUEUE_CAPACITY);
        let activity_handle = tokio::spawn(activity::run_worker(
            activity_rx,
            webhook.clone(),
            config.business_phone.clone(),
        ));

        let pipeline = Arc::new(MessagePipeline::new(
            ReplyResolver::new(webhook, config.business_phone.clone()),
            activity,
            config.max_processed_messages,
        ));
        let sessions = SessionManager::new(&config, self.automation, pipeline.clone());
        let _ = session_slot.set(Arc::downgrade(&sessions));
        supervisor::install_panic_hook(Arc::downgrade(&sessions));

        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        let cleanup_handle = tokio::spawn(cleanup::cleanup_loop(
            limiter.clone(),
            pipeline.clone(),
            cleanup::CLEANUP_INTERVAL,
        ));

        let state = ApiState {
            sessions: sessions.clone(),
            pipeline,
            limiter,
            config: config.clone(),
            uptime: Instant::now(),
        };
        let listener = api::bind(&config.host, config.port).await?;
        let mut api_handle = tokio::spawn(api::serve(listener, state));

        let starter = sessions.clone();
        let start_handle = tokio::spawn(async move { starter.start().await });

        let result = tokio::select! {
            _ = supervisor::shutdown_signal() => {
                info!("Received shutdown signal");
                Ok(())
            }
            joined = &mut api_handle => match joined {
                Ok(Ok(())) => Err(anyhow::anyhow!("API server stopped unexpectedly")),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(anyhow::anyhow!("API server task failed: {e}")),
            },
        };

        info!("Shutting down...");
        start_handle.abort();
        sessions.shutdown().await;
        api_handle.abort();
        cleanup_handle.abort();
        activity_handle.abort();
        if let Err(e) = &result {
            error!("gateway: {e}");
        }
        info!("Shutdown complete.");
        result
    }
}
