//! Retrying client for the backend's JSON functions.

use crate::retry::{retry_with_backoff, RetryPolicy};
use mamaz_core::{config::WebhookConfig, error::RelayError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Function that produces the AI reply.
pub const GET_REPLY: &str = "get-reply";
/// Function that records chat activity.
pub const BOT_MESSAGE: &str = "bot-message";
/// Attempts per call unless the caller asks otherwise.
pub const DEFAULT_RETRIES: u32 = 3;

/// Per-attempt limit; a timed-out attempt counts as a failure.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Called with `(function, error)` when a call gives up.
pub type FailureHook = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Result of a webhook call. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Backend not configured; nothing was sent.
    Skipped,
    /// Parsed JSON body of a 2xx response.
    Success(Value),
    /// All attempts failed; holds the last error message.
    Failed(String),
}

impl CallOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self, CallOutcome::Failed(_))
    }

    /// The wire-shaped result: `{ok:true,skipped:true}`, the response body,
    /// or `{ok:false,error}`.
    pub fn into_value(self) -> Value {
        match self {
            CallOutcome::Skipped => json!({ "ok": true, "skipped": true }),
            CallOutcome::Success(body) => body,
            CallOutcome::Failed(error) => json!({ "ok": false, "error": error }),
        }
    }
}

/// Client for `{base_url}/functions/v1/{name}`.
#[derive(Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
    endpoint: Option<(String, String)>,
    base_delay: Duration,
    timeout: Duration,
    on_failure: Option<FailureHook>,
}

impl WebhookClient {
    pub fn new(config: &WebhookConfig) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::Webhook(format!("failed to build http client: {e}")))?;

        let endpoint = match (&config.base_url, &config.api_key) {
            (Some(url), Some(key)) => Some((url.trim_end_matches('/').to_string(), key.clone())),
            _ => None,
        };

        Ok(Self {
            http,
            endpoint,
            base_delay: RetryPolicy::default().base_delay,
            timeout: REQUEST_TIMEOUT,
            on_failure: None,
        })
    }

    /// Override the backoff unit (tests use milliseconds).
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Override the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Report calls that exhausted their retries.
    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// POST `payload` to the named function, retrying up to `retries` times.
    pub async fn call(&self, function: &str, payload: &Value, retries: u32) -> CallOutcome {
        let Some((base_url, api_key)) = &self.endpoint else {
            debug!("webhook: {function} skipped, backend not configured");
            return CallOutcome::Skipped;
        };

        let url = format!("{base_url}/functions/v1/{function}");
        let url = url.as_str();
        let policy = RetryPolicy::new(retries, self.base_delay);

        let result =
            retry_with_backoff(policy, function, move |_| self.post(url, api_key, payload)).await;
        match result {
            Ok(body) => CallOutcome::Success(body),
            Err(e) => {
                warn!("webhook: {function} gave up: {e}");
                let error = e.to_string();
                if let Some(hook) = &self.on_failure {
                    hook(function, &error);
                }
                CallOutcome::Failed(error)
            }
        }
    }

    async fn post(&self, url: &str, api_key: &str, payload: &Value) -> Result<Value, RelayError> {
        let resp = self
            .http
            .post(url)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Webhook(format!("timed out after {}ms", self.timeout.as_millis()))
                } else {
                    RelayError::Webhook(format!("request failed: {e}"))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RelayError::Webhook(format!("HTTP {}: {text}", status.as_u16())));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| RelayError::Webhook(format!("failed to read body: {e}")))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    /// Serve `/functions/v1/get-reply`, failing the first `failures` calls.
    async fn flaky_backend(failures: usize) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/functions/v1/get-reply",
                post(
                    |State((hits, failures)): State<(Arc<AtomicUsize>, usize)>,
                     headers: axum::http::HeaderMap,
                     Json(body): Json<Value>| async move {
                        let n = hits.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(
                            headers.get("authorization").and_then(|v| v.to_str().ok()),
                            Some("Bearer anon-key")
                        );
                        if n < failures {
                            (StatusCode::BAD_GATEWAY, Json(json!({ "boom": n })))
                        } else {
                            (StatusCode::OK, Json(json!({ "reply": "hi", "echo": body })))
                        }
                    },
                ),
            )
            .with_state((hits.clone(), failures));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), hits)
    }

    /// Serve `/functions/v1/get-reply` slower than any sane timeout.
    async fn stalled_backend(stall: Duration) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/functions/v1/get-reply",
                post(move |State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(stall).await;
                    Json(json!({ "reply": "too late" }))
                }),
            )
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), hits)
    }

    fn client_for(base_url: String) -> WebhookClient {
        WebhookClient::new(&WebhookConfig {
            base_url: Some(base_url),
            api_key: Some("anon-key".into()),
        })
        .unwrap()
        .with_base_delay(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_unconfigured_call_is_skipped() {
        let client = WebhookClient::new(&WebhookConfig::default()).unwrap();
        assert!(!client.is_configured());
        for function in [GET_REPLY, BOT_MESSAGE, "anything"] {
            let outcome = client.call(function, &json!({}), DEFAULT_RETRIES).await;
            assert_eq!(outcome, CallOutcome::Skipped);
            assert_eq!(outcome.into_value(), json!({ "ok": true, "skipped": true }));
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let (url, hits) = flaky_backend(2).await;
        let client = client_for(url);

        let outcome = client.call(GET_REPLY, &json!({ "message": "yo" }), 3).await;

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        let body = outcome.into_value();
        assert_eq!(body["reply"], "hi");
        assert_eq!(body["echo"]["message"], "yo");
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_failure_value() {
        let (url, hits) = flaky_backend(usize::MAX).await;
        let client = client_for(url);

        let outcome = client.call(GET_REPLY, &json!({}), 2).await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(!outcome.is_ok());
        let value = outcome.into_value();
        assert_eq!(value["ok"], false);
        let error = value["error"].as_str().unwrap();
        assert!(error.contains("HTTP 502"), "{error}");
        assert!(error.contains("boom"), "{error}");
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails_without_panic() {
        let client = client_for("http://127.0.0.1:1".into());
        let outcome = client.call(BOT_MESSAGE, &json!({}), 1).await;
        assert!(matches!(outcome, CallOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out_and_retries() {
        let (url, hits) = stalled_backend(Duration::from_secs(5)).await;
        let client = client_for(url).with_timeout(Duration::from_millis(100));

        let outcome = client.call(GET_REPLY, &json!({}), 2).await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        match outcome {
            CallOutcome::Failed(error) => assert!(error.contains("timed out"), "{error}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_hook_fires_once_on_give_up() {
        let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
        let sink = seen.clone();
        let hook: FailureHook = Arc::new(move |function: &str, error: &str| {
            sink.lock().unwrap().push((function.into(), error.into()));
        });

        let (url, _) = flaky_backend(usize::MAX).await;
        let client = client_for(url).with_failure_hook(hook.clone());
        client.call(GET_REPLY, &json!({}), 3).await;

        let (url, _) = flaky_backend(1).await;
        let client = client_for(url).with_failure_hook(hook);
        assert!(client.call(GET_REPLY, &json!({}), 3).await.is_ok());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, GET_REPLY);
        assert!(seen[0].1.contains("HTTP 502"), "{:?}", seen[0]);
    }
}
