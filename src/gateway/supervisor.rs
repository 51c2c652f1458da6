//! Process-level supervision: termination signals, the panic hook and
//! webhook give-up reporting.

use super::session::SessionManager;
use mamaz_webhook::FailureHook;
use std::panic::PanicHookInfo;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{error, info, warn};

/// Resolve on SIGINT, SIGTERM or SIGUSR2 (ctrl-c on non-unix targets).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("supervisor: ctrl-c handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let others = async {
        use tokio::signal::unix::{signal, SignalKind};

        let streams = (
            signal(SignalKind::terminate()),
            signal(SignalKind::user_defined2()),
        );
        match streams {
            (Ok(mut term), Ok(mut usr2)) => {
                tokio::select! {
                    _ = term.recv() => info!("supervisor: SIGTERM"),
                    _ = usr2.recv() => info!("supervisor: SIGUSR2"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("supervisor: signal handlers unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let others = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("supervisor: SIGINT"),
        _ = others => {}
    }
}

/// Log panics and surface them as the session's last error.
///
/// A panic inside a spawned task only kills that task, so the service keeps
/// answering requests afterwards.
pub fn install_panic_hook(sessions: Weak<SessionManager>) {
    std::panic::set_hook(Box::new(move |info| {
        let message = panic_message(info);
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(location = %location, "panic: {message}");

        if let Some(sessions) = sessions.upgrade() {
            sessions.try_record_error(format!("panic: {message}"));
        }
    }));
}

/// Surface exhausted webhook calls as the session's last error.
///
/// The client is built before the session manager exists, so the manager is
/// looked up through `slot` once it has been filled.
pub fn webhook_failure_hook(slot: Arc<OnceLock<Weak<SessionManager>>>) -> FailureHook {
    Arc::new(move |function: &str, error: &str| {
        if let Some(sessions) = slot.get().and_then(Weak::upgrade) {
            sessions.record_error(format!("Supabase {function}: {error}"));
        }
    })
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
