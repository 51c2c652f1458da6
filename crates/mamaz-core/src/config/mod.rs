//! Environment-driven configuration.
//!
//! Every setting is read once at startup through a lookup function, so tests
//! can feed a map instead of touching the process environment. Only an
//! unusable `PORT` fails immediately. Every other malformed or missing value
//! falls back to its default and is reported by [`Config::validate`]; the
//! caller decides whether those problems are fatal.

mod defaults;


pub use defaults::*;

use crate::error::RelayError;
use serde::Serialize;
use std::path::PathBuf;

/// Top-level relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The business WhatsApp number, `+` followed by 10-15 digits.
    pub business_phone: Option<String>,
    pub session_name: String,
    pub headless: bool,
    pub webhook: WebhookConfig,
    /// Browser executable override. Reported for diagnostics only.
    pub browser_executable: Option<String>,
    pub host: String,
    pub port: u16,
    /// When false only the HTTP surface runs (safe mode).
    pub automation_enabled: bool,
    /// Parent directory of the per-session token directories.
    pub tokens_dir: String,
    pub default_country_code: String,
    pub rate_limit: RateLimitConfig,
    /// Capacity of the processed-message set.
    pub max_processed_messages: usize,
    /// Directory for the rolling log file. `None` = stdout only.
    pub log_dir: Option<String>,
    /// Key rate limits on the first `X-Forwarded-For` hop instead of the peer.
    pub trust_proxy: bool,
    /// Values that could not be parsed and were replaced by defaults.
    parse_problems: Vec<String>,
}

/// Webhook backend endpoint and credential.
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl WebhookConfig {
    /// Both the base URL and the credential are present.
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && self.api_key.is_some()
    }
}

/// Sliding-window limit applied per caller address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
        }
    }
}

/// Secret-free view of the configuration for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub business_phone: Option<String>,
    pub session_name: String,
    pub headless: bool,
    pub automation_enabled: bool,
    pub webhook_url: Option<String>,
    pub webhook_key_set: bool,
    pub browser_executable: Option<String>,
    pub host: String,
    pub port: u16,
    pub tokens_dir: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: usize,
    pub max_processed_messages: usize,
    pub trust_proxy: bool,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = match get("PORT") {
            None => DEFAULT_PORT,
            Some(raw) => raw
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| {
                    RelayError::Config(format!("PORT must be between 1 and 65535, got '{raw}'"))
                })?,
        };

        let mut problems = Vec::new();
        // Anything but an explicit "off" keeps the client headless.
        let headless = get("HEADLESS").map_or(true, |raw| parse_bool(&raw) != Some(false));
        let disabled = flag(&get, "DISABLE_VENOM", false, &mut problems);
        let trust_proxy = flag(&get, "TRUST_PROXY", false, &mut problems);
        let rate_limit = RateLimitConfig {
            window_secs: positive(
                &get,
                "RATE_LIMIT_WINDOW_SECS",
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
                &mut problems,
            ),
            max_requests: positive(
                &get,
                "RATE_LIMIT_MAX_REQUESTS",
                DEFAULT_RATE_LIMIT_MAX_REQUESTS as u64,
                &mut problems,
            ) as usize,
        };
        let max_processed_messages = positive(
            &get,
            "MAX_PROCESSED_MESSAGES",
            DEFAULT_MAX_PROCESSED_MESSAGES as u64,
            &mut problems,
        ) as usize;

        Ok(Self {
            business_phone: get("BUSINESS_PHONE"),
            session_name: get("SESSION_NAME").unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string()),
            headless,
            webhook: WebhookConfig {
                base_url: get("SUPABASE_URL").map(|u| u.trim_end_matches('/').to_string()),
                api_key: get("SUPABASE_ANON_KEY"),
            },
            browser_executable: get("PUPPETEER_EXECUTABLE_PATH"),
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            automation_enabled: !disabled,
            tokens_dir: get("TOKENS_DIR").unwrap_or_else(|| DEFAULT_TOKENS_DIR.to_string()),
            default_country_code: get("DEFAULT_COUNTRY_CODE")
                .unwrap_or_else(|| DEFAULT_COUNTRY_CODE.to_string()),
            rate_limit,
            max_processed_messages,
            log_dir: get("LOG_DIR"),
            trust_proxy,
            parse_problems: problems,
        })
    }

    /// Report unparseable values and check the settings the automation
    /// pipeline depends on.
    ///
    /// Returns one human-readable line per problem; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.parse_problems.clone();

        match self.business_phone.as_deref() {
            None => problems.push("BUSINESS_PHONE is required".to_string()),
            Some(phone) if !is_valid_business_phone(phone) => problems.push(format!(
                "BUSINESS_PHONE must be '+' followed by 10-15 digits, got '{phone}'"
            )),
            Some(_) => {}
        }

        match self.webhook.base_url.as_deref() {
            None => problems.push("SUPABASE_URL is required".to_string()),
            Some(url) if !url.starts_with("https://") => {
                problems.push(format!("SUPABASE_URL must use https, got '{url}'"))
            }
            Some(_) => {}
        }

        if self.webhook.api_key.is_none() {
            problems.push("SUPABASE_ANON_KEY is required".to_string());
        }

        problems
    }

    /// Directory holding the automation client's persisted session token.
    pub fn session_token_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand(&self.tokens_dir)).join(&self.session_name)
    }

    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            business_phone: self.business_phone.clone(),
            session_name: self.session_name.clone(),
            headless: self.headless,
            automation_enabled: self.automation_enabled,
            webhook_url: self.webhook.base_url.clone(),
            webhook_key_set: self.webhook.api_key.is_some(),
            browser_executable: self.browser_executable.clone(),
            host: self.host.clone(),
            port: self.port,
            tokens_dir: self.tokens_dir.clone(),
            rate_limit_window_secs: self.rate_limit.window_secs,
            rate_limit_max_requests: self.rate_limit.max_requests,
            max_processed_messages: self.max_processed_messages,
            trust_proxy: self.trust_proxy,
        }
    }
}

/// `+` followed by 10 to 15 ASCII digits.
pub fn is_valid_business_phone(phone: &str) -> bool {
    match phone.strip_prefix('+') {
        Some(digits) => {
            (10..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Parse a boolean setting (`true/false/1/0/yes/no`, case-insensitive).
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Boolean setting; a malformed value is reported and `default` used.
fn flag<G>(get: &G, key: &str, default: bool, problems: &mut Vec<String>) -> bool
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => default,
        Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
            problems.push(format!("{key} must be true or false, got '{raw}'"));
            default
        }),
    }
}

/// Positive integer setting; a malformed value is reported and `default` used.
fn positive<G>(get: &G, key: &str, default: u64, problems: &mut Vec<String>) -> u64
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => default,
        Some(raw) => raw.parse::<u64>().ok().filter(|n| *n > 0).unwrap_or_else(|| {
            problems.push(format!("{key} must be a positive integer, got '{raw}'"));
            default
        }),
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}
