//! WhatsApp chat identifier helpers.

/// The status-broadcast pseudo-chat.
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Suffix for direct chats.
pub const DIRECT_SUFFIX: &str = "@c.us";

/// Turn an operator-supplied destination into a direct-chat JID.
///
/// Anything already containing `@` is taken verbatim. Otherwise all non-digit
/// characters are dropped, a leading national `0` is replaced by
/// `country_code`, and `@c.us` is appended. Returns `None` when no digits
/// remain.
pub fn normalize_destination(to: &str, country_code: &str) -> Option<String> {
    let to = to.trim();
    if to.contains('@') {
        return Some(to.to_string());
    }

    let digits: String = to.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    let international = match digits.strip_prefix('0') {
        Some(national) => format!("{country_code}{national}"),
        None => digits,
    };
    Some(format!("{international}{DIRECT_SUFFIX}"))
}
