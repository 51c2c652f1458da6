//! HTTP control surface: status, QR retrieval, operator send, session reset
//! and diagnostics.
//!
//! Every route sits behind a per-address sliding-window rate limit keyed on
//! the peer IP (or the forwarded client IP behind a trusted proxy). Errors
//! are JSON bodies with an `error` field.

pub mod ratelimit;
mod routes;


use crate::gateway::{pipeline::MessagePipeline, session::SessionManager};
use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use mamaz_core::config::Config;
use ratelimit::RateLimiter;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<SessionManager>,
    pub pipeline: Arc<MessagePipeline>,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
    pub uptime: Instant,
}

/// Build the axum router with shared state.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(routes::alive))
        .route("/health", get(routes::health))
        .route("/status", get(routes::status))
        .route("/qr", get(routes::qr))
        .route("/qr.png", get(routes::qr_png))
        .route("/qr-view", get(routes::qr_view))
        .route("/send", post(routes::send))
        .route("/reset-session", post(routes::reset_session))
        .route("/debug", get(routes::debug))
        .fallback(routes::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn bind(host: &str, port: u16) -> std::io::Result<TcpListener> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("API server listening on {addr}");
    Ok(listener)
}

/// Serve until the listener fails. Called from `Gateway::run()`.
pub async fn serve(listener: TcpListener, state: ApiState) -> std::io::Result<()> {
    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

async fn rate_limit(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let client = client_key(&req, state.config.trust_proxy);
    if !state.limiter.check(&client) {
        warn!("api: rate limit hit for {client}");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "Too many requests"})),
        )
            .into_response();
    }
    next.run(req).await
}

/// Peer IP. With `trust_proxy`, the first `X-Forwarded-For` hop when it is a
/// valid address.
fn client_key(req: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
