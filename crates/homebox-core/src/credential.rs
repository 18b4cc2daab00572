//! # Bearer Credentials
//!
//! Pure helpers for the token held by the sync layer's token store.
//!
//! The stored token never carries an authorization scheme; exactly one
//! `Bearer ` prefix is added when the header is built.

/// Scheme prefix used in the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Tokens shorter than this are never shown, even partially.
const REDACT_MIN_LEN: usize = 14;

/// Number of leading characters kept by [`redact`].
const REDACT_VISIBLE: usize = 10;

/// Normalizes a raw token as received from configuration or the server.
///
/// Leading `"Bearer "` prefixes are stripped (case-sensitive, repeatedly, so
/// the result never carries one), and surrounding whitespace is removed.
/// `None` and empty input both yield an empty string.
///
/// ## Example
/// ```rust
/// use homebox_core::credential::sanitize_token;
///
/// assert_eq!(sanitize_token(Some("Bearer abc")), "abc");
/// assert_eq!(sanitize_token(Some("abc")), "abc");
/// assert_eq!(sanitize_token(None), "");
/// ```
pub fn sanitize_token(raw: Option<&str>) -> String {
    let mut token = raw.unwrap_or_default().trim_start();
    while let Some(rest) = token.strip_prefix(BEARER_PREFIX) {
        token = rest.trim_start();
    }
    token.trim_end().to_string()
}

/// Builds the `Authorization` header value for a sanitized token.
pub fn bearer_header(token: &str) -> String {
    format!("{}{}", BEARER_PREFIX, sanitize_token(Some(token)))
}

/// Shortens a token for logging: the first ten characters and `...`, or
/// `[none]` when the token is too short to show safely.
pub fn redact(token: &str) -> String {
    if token.chars().count() < REDACT_MIN_LEN {
        return "[none]".to_string();
    }
    let visible: String = token.chars().take(REDACT_VISIBLE).collect();
    format!("{}...", visible)
}
