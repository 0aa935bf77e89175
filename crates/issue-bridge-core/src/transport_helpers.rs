use std::time::Duration;

use reqwest::header::HeaderMap;

/// Header carrying the 0-based index of the request within one retried call.
pub const REQUEST_ATTEMPT_HEADER: &str = "x-bridge-request-attempt";

pub const USER_AGENT: &str = "DiscordIssueBridge/1.0";

/// Returns true for status codes worth retrying with backoff.
pub fn is_retryable_status(status: u16) -> bool {
    (500..600).contains(&status)
}

/// Returns true for transport failures that are not caused by a malformed request.
pub fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    !error.is_builder() && !error.is_decode()
}

/// Reads `Retry-After` as (fractional) seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, "retry-after").and_then(parse_seconds)
}

/// Returns a trimmed header value when it is present and valid UTF-8.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn parse_seconds(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(Duration::from_secs_f64)
}

pub fn truncate_for_error(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut truncated = trimmed.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
