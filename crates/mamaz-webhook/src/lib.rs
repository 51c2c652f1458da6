//! # mamaz-webhook
//!
//! Outbound calls to the backend's JSON functions: a backoff helper, the
//! retrying webhook client, and the AI reply resolver built on top of it.

pub mod client;
pub mod reply;
pub mod retry;

pub use client::{CallOutcome, FailureHook, WebhookClient};
pub use reply::{ReplyResolver, FALLBACK_REPLY};
pub use retry::{retry_with_backoff, RetryPolicy};
