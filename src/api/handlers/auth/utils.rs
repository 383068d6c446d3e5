//! Small helpers for auth validation and token handling.

use anyhow::{anyhow, Result};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use regex::Regex;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Pull the bearer token out of the `Authorization` header, if present.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Parse a lifetime like `"24h"`, `"30m"`, `"90s"` or `"60"` into seconds.
///
/// # Errors
/// Returns an error for empty input, a non-numeric count, or an unknown
/// suffix.
pub(crate) fn parse_duration_seconds(value: &str) -> Result<u64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("empty duration"));
    }

    let (count, multiplier) = match trimmed.as_bytes()[trimmed.len() - 1] {
        b'h' => (&trimmed[..trimmed.len() - 1], 3600),
        b'm' => (&trimmed[..trimmed.len() - 1], 60),
        b's' => (&trimmed[..trimmed.len() - 1], 1),
        _ => (trimmed, 1),
    };

    let count: u64 = count
        .parse()
        .map_err(|_| anyhow!("invalid duration: {trimmed:?}"))?;
    Ok(count * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn extract_bearer_token_reads_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def".to_string()));
    }

    #[test]
    fn extract_bearer_token_rejects_other_schemes_and_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);

        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn parse_duration_seconds_accepts_suffixes() {
        assert_eq!(parse_duration_seconds("24h").ok(), Some(86_400));
        assert_eq!(parse_duration_seconds("30m").ok(), Some(1_800));
        assert_eq!(parse_duration_seconds("90s").ok(), Some(90));
        assert_eq!(parse_duration_seconds("60").ok(), Some(60));
    }

    #[test]
    fn parse_duration_seconds_rejects_junk() {
        assert!(parse_duration_seconds("").is_err());
        assert!(parse_duration_seconds("soon").is_err());
        assert!(parse_duration_seconds("h").is_err());
        assert!(parse_duration_seconds("-5m").is_err());
    }
}
