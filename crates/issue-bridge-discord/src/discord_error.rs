use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading threads from Discord or from a fixture.
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("missing discord bot token (set DISCORD_BOT_TOKEN or use an offline fixture)")]
    MissingToken,
    #[error("discord channel id cannot be empty")]
    MissingChannel,
    #[error("invalid discord bot token header")]
    InvalidToken,
    #[error("failed to create discord api client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("discord api {operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("discord api {operation} request failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode discord {operation}: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid discord payload: {0}")]
    InvalidPayload(String),
    #[error("failed to read fixture {}: {source}", path.display())]
    FixtureRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse fixture {}: {source}", path.display())]
    FixtureParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl DiscordError {
    /// HTTP status of a failed API response, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
