//! Session lifecycle state machine.
//!
//! Pure and synchronous: the caller feeds [`SessionEvent`]s in and performs
//! the returned [`Effect`]. Timers, the automation client, and locking live
//! in the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Reconnect attempts allowed before the session gives up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

const RECONNECT_BASE_MS: u64 = 1_000;
const RECONNECT_CAP_MS: u64 = 30_000;

/// Connection status of the automated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Disabled,
    Disconnected,
    Connecting,
    QrReady,
    Connected,
    QrFailed,
    MobileDisconnected,
    TokenDeleted,
    Error,
    Failed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Disabled => "disabled",
            Status::Disconnected => "disconnected",
            Status::Connecting => "connecting",
            Status::QrReady => "qr_ready",
            Status::Connected => "connected",
            Status::QrFailed => "qr_failed",
            Status::MobileDisconnected => "mobile_disconnected",
            Status::TokenDeleted => "token_deleted",
            Status::Error => "error",
            Status::Failed => "failed",
        }
    }

    /// States that only an explicit reset (or a config change) leaves.
    fn is_inert(self) -> bool {
        matches!(self, Status::Disabled | Status::Failed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle input, mapped from the automation client's callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StartupBegan,
    /// A fresh QR was rendered; payload is base64 PNG without a data-URL prefix.
    QrGenerated(String),
    QrScanned,
    LoggedIn,
    LoggedOut,
    ClientClosed,
    MobileDisconnected,
    QrReadFailed,
    TokenDeleted,
    StartupFailed(String),
    ConnectionLost(String),
}

/// What the caller must do after applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Re-run startup after the delay.
    Reconnect(Duration),
    /// Attempt budget exhausted; the session is now `failed`.
    GaveUp,
}

/// Process-wide session state.
#[derive(Debug, Clone)]
pub struct SessionState {
    status: Status,
    is_ready: bool,
    qr: Option<String>,
    last_error: Option<String>,
    reconnect_attempts: u32,
}

/// Read-only copy for the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub status: Status,
    pub is_ready: bool,
    pub has_qr: bool,
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
}

impl SessionState {
    pub fn new(automation_enabled: bool) -> Self {
        Self {
            status: if automation_enabled {
                Status::Disconnected
            } else {
                Status::Disabled
            },
            is_ready: false,
            qr: None,
            last_error: None,
            reconnect_attempts: 0,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn qr(&self) -> Option<&str> {
        self.qr.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            is_ready: self.is_ready,
            has_qr: self.qr.is_some(),
            last_error: self.last_error.clone(),
            reconnect_attempts: self.reconnect_attempts,
        }
    }

    /// Record an error without changing status.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Explicit reset: back to `disconnected` with every field cleared.
    pub fn reset(&mut self) {
        self.status = Status::Disconnected;
        self.is_ready = false;
        self.qr = None;
        self.last_error = None;
        self.reconnect_attempts = 0;
    }

    /// Apply one lifecycle event.
    pub fn apply(&mut self, event: SessionEvent) -> Effect {
        if self.status.is_inert() {
            return Effect::None;
        }

        match event {
            SessionEvent::StartupBegan => {
                self.set_status(Status::Connecting);
                Effect::None
            }
            SessionEvent::QrGenerated(qr) => {
                if matches!(
                    self.status,
                    Status::Disconnected | Status::Connecting | Status::QrReady | Status::QrFailed
                ) {
                    self.set_status(Status::QrReady);
                    self.qr = Some(qr);
                    self.last_error = None;
                }
                Effect::None
            }
            SessionEvent::QrScanned => {
                if self.status == Status::QrReady {
                    self.set_status(Status::Connecting);
                }
                Effect::None
            }
            SessionEvent::LoggedIn => {
                if matches!(
                    self.status,
                    Status::Connecting | Status::QrReady | Status::Disconnected | Status::Error
                ) {
                    self.set_status(Status::Connected);
                    self.is_ready = true;
                    self.reconnect_attempts = 0;
                    self.last_error = None;
                }
                Effect::None
            }
            SessionEvent::LoggedOut => {
                if self.status == Status::Connected {
                    self.set_status(Status::Disconnected);
                }
                Effect::None
            }
            SessionEvent::ClientClosed | SessionEvent::ConnectionLost(_) => {
                self.set_status(Status::Disconnected);
                self.next_attempt()
            }
            SessionEvent::MobileDisconnected => {
                self.set_status(Status::MobileDisconnected);
                self.last_error = Some("Mobile device disconnected".to_string());
                Effect::None
            }
            SessionEvent::QrReadFailed => {
                self.set_status(Status::QrFailed);
                self.last_error = Some("QR code read failed".to_string());
                Effect::None
            }
            SessionEvent::TokenDeleted => {
                self.set_status(Status::TokenDeleted);
                self.last_error = Some("Session token deleted".to_string());
                self.next_attempt()
            }
            SessionEvent::StartupFailed(message) => {
                self.set_status(Status::Error);
                self.last_error = Some(format!("startup: {message}"));
                self.next_attempt()
            }
        }
    }

    fn set_status(&mut self, status: Status) {
        self.status = status;
        if status != Status::QrReady {
            self.qr = None;
        }
        if status != Status::Connected {
            self.is_ready = false;
        }
    }

    fn next_attempt(&mut self) -> Effect {
        if self.reconnect_attempts < MAX_RECONNECT_ATTEMPTS {
            self.reconnect_attempts += 1;
            Effect::Reconnect(reconnect_delay(self.reconnect_attempts))
        } else {
            self.set_status(Status::Failed);
            self.last_error = Some("Max reconnect attempts reached".to_string());
            Effect::GaveUp
        }
    }
}

/// `min(1000 * 2^attempts, 30000)` milliseconds.
pub fn reconnect_delay(attempts: u32) -> Duration {
    let ms = RECONNECT_BASE_MS
        .saturating_mul(1u64.checked_shl(attempts).unwrap_or(u64::MAX))
        .min(RECONNECT_CAP_MS);
    Duration::from_millis(ms)
}
