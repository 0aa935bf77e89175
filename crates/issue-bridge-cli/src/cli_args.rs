use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser};
use issue_bridge_core::parse_iso8601_utc;
use issue_bridge_discord::DEFAULT_DISCORD_API_BASE;
use issue_bridge_github::DEFAULT_GITHUB_API_BASE;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_since(value: &str) -> Result<DateTime<Utc>, String> {
    parse_iso8601_utc(value).map_err(|error| format!("{error:#}"))
}

#[derive(Debug, Parser)]
#[command(
    name = "discord-issue-bridge",
    about = "Create GitHub issues from new Discord forum threads",
    version
)]
pub struct Cli {
    #[arg(long, help = "Path to the bridge JSON config file.")]
    pub config: PathBuf,

    #[arg(long, help = "Override the ledger path from the config file.")]
    pub state: Option<PathBuf>,

    #[arg(
        long,
        value_parser = parse_since,
        help = "Only sync threads created strictly after this ISO-8601 timestamp (UTC when no offset is given)."
    )]
    pub since: Option<DateTime<Utc>>,

    #[arg(
        long = "max-threads",
        value_parser = parse_positive_usize,
        help = "Maximum threads to fetch this run. Defaults to max_threads_per_run from the config."
    )]
    pub max_threads: Option<usize>,

    #[arg(
        long = "dry-run",
        action = ArgAction::SetTrue,
        help = "Log issue payloads instead of creating them; the ledger is not rewritten."
    )]
    pub dry_run: bool,

    #[arg(
        long = "offline-sample",
        help = "Read threads from a JSON fixture instead of the Discord API."
    )]
    pub offline_sample: Option<PathBuf>,

    #[arg(short, long, action = ArgAction::SetTrue, help = "Enable debug logging.")]
    pub verbose: bool,

    #[arg(long = "discord-api-base", default_value = DEFAULT_DISCORD_API_BASE)]
    pub discord_api_base: String,

    #[arg(long = "github-api-base", default_value = DEFAULT_GITHUB_API_BASE)]
    pub github_api_base: String,

    #[arg(
        long = "request-timeout-ms",
        default_value_t = 15_000,
        value_parser = parse_positive_u64,
        help = "Per-request socket timeout for both APIs."
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        default_value_t = 5,
        value_parser = parse_positive_usize
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        default_value_t = 1_000,
        value_parser = parse_positive_u64
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long = "retry-max-delay-ms",
        default_value_t = 30_000,
        value_parser = parse_positive_u64
    )]
    pub retry_max_delay_ms: u64,

    #[arg(long = "discord-bot-token", env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    pub discord_bot_token: Option<String>,

    #[arg(long = "github-token", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}
