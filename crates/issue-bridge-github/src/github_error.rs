use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("missing github token (set GITHUB_TOKEN or use --dry-run)")]
    MissingToken,
    #[error("invalid github repository '{0}', expected owner/repo")]
    InvalidRepo(String),
    #[error("invalid github authorization header")]
    InvalidToken,
    #[error("failed to create github api client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("github api rate limit exhausted (resets at {})", display_reset(.reset_at))]
    QuotaExhausted { reset_at: Option<DateTime<Utc>> },
    #[error("github api create issue failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("github api create issue request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("failed to decode github create issue response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl GithubError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::QuotaExhausted { .. } => Some(403),
            _ => None,
        }
    }
}

fn display_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    reset_at
        .map(issue_bridge_core::format_iso8601_utc)
        .unwrap_or_else(|| "an unknown time".to_string())
}
