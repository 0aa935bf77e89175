use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use issue_bridge_core::{current_unix_timestamp_ms, RetryPolicy, RunTelemetry};
use issue_bridge_discord::{DiscordClientConfig, DiscordForumClient, ForumFixture};
use issue_bridge_github::{GithubIssueClient, GithubIssueClientConfig};
use issue_bridge_sync::{BridgeConfig, IssueSyncer, SyncLedger, SyncRunReport, SyncSettings};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::cli_args::Cli;

pub(crate) fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn build_retry_policy(cli: &Cli) -> RetryPolicy {
    RetryPolicy::new(
        cli.retry_max_attempts,
        Duration::from_millis(cli.retry_base_delay_ms),
        Duration::from_millis(cli.retry_max_delay_ms),
    )
}

fn resolve_state_path(cli: &Cli, config: &BridgeConfig) -> PathBuf {
    cli.state
        .clone()
        .unwrap_or_else(|| config.state_file.clone())
}

fn build_thread_source(
    cli: &Cli,
    config: &BridgeConfig,
    retry: RetryPolicy,
    telemetry: RunTelemetry,
) -> Result<DiscordForumClient> {
    if let Some(path) = cli.offline_sample.as_deref() {
        let fixture = ForumFixture::load(path)?;
        tracing::info!(
            parent: telemetry.span(),
            fixture = %path.display(),
            threads = fixture.thread_count(),
            "using offline thread fixture"
        );
        return Ok(DiscordForumClient::from_fixture(
            &config.discord_channel_id,
            fixture,
            telemetry,
        ));
    }
    let mut discord_config = DiscordClientConfig::new(
        config.discord_channel_id.clone(),
        cli.discord_bot_token.clone(),
    );
    discord_config.api_base = cli.discord_api_base.clone();
    discord_config.request_timeout_ms = cli.request_timeout_ms;
    DiscordForumClient::new(discord_config, retry, telemetry)
        .context("failed to create discord client")
}

fn build_issue_sink(
    cli: &Cli,
    config: &BridgeConfig,
    retry: RetryPolicy,
    telemetry: RunTelemetry,
) -> Result<GithubIssueClient> {
    let mut github_config =
        GithubIssueClientConfig::new(config.github_repo.clone(), cli.github_token.clone());
    github_config.api_base = cli.github_api_base.clone();
    github_config.request_timeout_ms = cli.request_timeout_ms;
    github_config.dry_run = cli.dry_run;
    GithubIssueClient::new(github_config, retry, telemetry).context("failed to create github client")
}

/// Wires config, clients and ledger together and runs one sync batch.
pub(crate) fn run_bridge(cli: &Cli) -> Result<SyncRunReport> {
    let config = BridgeConfig::load(&cli.config)?;
    let run_id = format!("run-{}", current_unix_timestamp_ms());
    let telemetry = RunTelemetry::new(&run_id);
    let retry = build_retry_policy(cli);

    let source = build_thread_source(cli, &config, retry.clone(), telemetry.clone())?;
    let sink = build_issue_sink(cli, &config, retry, telemetry.clone())?;
    let state_path = resolve_state_path(cli, &config);
    let mut ledger = SyncLedger::load(&state_path, config.state_backup_enabled)?;
    if cli.dry_run {
        ledger = ledger.into_read_only();
    }
    tracing::info!(
        parent: telemetry.span(),
        repo = %config.github_repo,
        channel_id = %config.discord_channel_id,
        ledger = %state_path.display(),
        dry_run = cli.dry_run,
        offline = source.is_offline(),
        "starting sync run"
    );

    let mut syncer = IssueSyncer::new(
        SyncSettings::from_config(&config),
        source,
        sink,
        ledger,
        telemetry.clone(),
    );
    let report = syncer.run(cli.since, cli.max_threads)?;
    let counters = telemetry.snapshot();
    tracing::info!(
        parent: telemetry.span(),
        requests_sent = counters.requests_sent,
        retry_attempts = counters.retry_attempts,
        rate_limit_waits = counters.rate_limit_waits,
        empty_threads_skipped = counters.empty_threads_skipped,
        "transport summary"
    );
    Ok(report)
}
