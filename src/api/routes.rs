//! Route handlers.

use super::ApiState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{SecondsFormat, Utc};
use mamaz_core::{error::RelayError, jid::normalize_destination, session::Status};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

type ApiError = (StatusCode, Json<Value>);

const NO_QR: &str = "No QR code available";
const NOT_CONNECTED: &str = "Bot is not connected";

/// Operator send request body.
#[derive(Debug, Deserialize)]
pub(super) struct SendRequest {
    to: Option<String>,
    text: Option<String>,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn send_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({"ok": false, "error": message.into()})))
}

/// `GET /`: Liveness.
pub(super) async fn alive() -> Json<Value> {
    Json(json!({"ok": true, "message": "Bot is alive"}))
}

/// `GET /health`: Readiness.
pub(super) async fn health(State(state): State<ApiState>) -> Json<Value> {
    let snapshot = state.sessions.snapshot();
    let status = if snapshot.is_ready {
        "ready"
    } else if snapshot.status == Status::Disabled {
        "disabled"
    } else {
        "not_ready"
    };
    Json(json!({
        "ok": status != "not_ready",
        "status": status,
        "business_phone": state.config.business_phone,
        "reconnect_attempts": snapshot.reconnect_attempts,
        "timestamp": now_iso(),
    }))
}

/// `GET /status`: Full session snapshot.
pub(super) async fn status(State(state): State<ApiState>) -> Json<Value> {
    let snapshot = state.sessions.snapshot();
    Json(json!({
        "status": snapshot.status,
        "isReady": snapshot.is_ready,
        "businessPhone": state.config.business_phone,
        "hasQR": snapshot.has_qr,
        "lastError": snapshot.last_error,
        "reconnectAttempts": snapshot.reconnect_attempts,
        "timestamp": now_iso(),
    }))
}

/// `GET /qr`: QR as raw base64 and as a data URL.
pub(super) async fn qr(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let qr = state
        .sessions
        .qr_base64()
        .ok_or((StatusCode::NOT_FOUND, Json(json!({"error": NO_QR}))))?;
    let data_url = format!("data:image/png;base64,{qr}");
    Ok(Json(json!({"base64": qr, "dataUrl": data_url})))
}

/// `GET /qr.png`: QR image bytes, never cached.
pub(super) async fn qr_png(State(state): State<ApiState>) -> Response {
    let Some(qr) = state.sessions.qr_base64() else {
        return (StatusCode::NOT_FOUND, NO_QR).into_response();
    };
    match BASE64.decode(qr) {
        Ok(png) => (
            [
                (header::CONTENT_TYPE, "image/png"),
                (
                    header::CACHE_CONTROL,
                    "no-store, no-cache, must-revalidate, proxy-revalidate",
                ),
                (header::PRAGMA, "no-cache"),
                (header::EXPIRES, "0"),
            ],
            png,
        )
            .into_response(),
        Err(e) => {
            error!("api: stored QR is not valid base64: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "QR decode failed"})),
            )
                .into_response()
        }
    }
}

/// `GET /qr-view`: Self-refreshing linking page.
pub(super) async fn qr_view() -> Html<&'static str> {
    Html(include_str!("qr_view.html"))
}

/// `POST /send`: Relay an operator message.
pub(super) async fn send(
    State(state): State<ApiState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    if !state.sessions.is_ready() {
        return Err(send_error(StatusCode::CONFLICT, NOT_CONNECTED));
    }

    let Json(request) = body.map_err(|e| {
        send_error(StatusCode::BAD_REQUEST, format!("invalid request: {e}"))
    })?;

    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(to), Some(text)) = (non_empty(request.to), non_empty(request.text)) else {
        return Err(send_error(StatusCode::BAD_REQUEST, "Missing 'to' or 'text'"));
    };

    let jid = normalize_destination(&to, &state.config.default_country_code).ok_or_else(|| {
        send_error(
            StatusCode::BAD_REQUEST,
            format!("Invalid destination '{to}'"),
        )
    })?;

    match state.sessions.send_text(&jid, &text).await {
        Ok(()) => {
            info!("api: operator message sent to {jid}");
            Ok(Json(json!({"ok": true, "to": jid})))
        }
        Err(RelayError::Session(message)) => Err(send_error(StatusCode::CONFLICT, message)),
        Err(e) => {
            warn!("api: operator send to {jid} failed: {e}");
            Err(send_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// `POST /reset-session`: Wipe the session and start over.
pub(super) async fn reset_session(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    state.sessions.reset().map_err(|e| match e {
        RelayError::Session(message) => send_error(StatusCode::CONFLICT, message),
        other => send_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    })?;
    Ok(Json(json!({
        "ok": true,
        "message": "Session reset, restarting shortly",
    })))
}

/// `GET /debug`: Diagnostic dump. Contains no secrets.
pub(super) async fn debug(State(state): State<ApiState>) -> Json<Value> {
    let token_dir = state.sessions.token_dir();
    let token_dir_exists = tokio::fs::try_exists(token_dir).await.unwrap_or(false);
    Json(json!({
        "session": state.sessions.snapshot(),
        "pending_restart": state.sessions.has_pending_restart(),
        "processed_messages": state.pipeline.processed_len(),
        "rate_limited_clients": state.limiter.clients(),
        "uptime_secs": state.uptime.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "config": state.config.summary(),
        "token_dir": token_dir.display().to_string(),
        "token_dir_exists": token_dir_exists,
        "timestamp": now_iso(),
    }))
}

pub(super) async fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})))
}
