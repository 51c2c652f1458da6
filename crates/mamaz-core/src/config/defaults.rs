//! Default values for settings absent from the environment.

pub const DEFAULT_SESSION_NAME: &str = "mamaz-ai-bot";

pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 3000;

pub const DEFAULT_TOKENS_DIR: &str = "tokens";

/// Country code substituted for a leading national `0` in outbound numbers.
pub const DEFAULT_COUNTRY_CODE: &str = "972";

pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: usize = 100;

pub const DEFAULT_MAX_PROCESSED_MESSAGES: usize = 1000;
