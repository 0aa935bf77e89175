use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use issue_bridge_core::{format_iso8601_utc, RunTelemetry};
use issue_bridge_discord::{DiscordError, DiscordForumClient, ForumThread};
use issue_bridge_github::{GithubError, GithubIssueClient, IssueCreation, IssueDraft};

use crate::bridge_config::BridgeConfig;
use crate::labels::LabelPolicy;
use crate::ledger::SyncLedger;
use crate::template::render_template;

const NO_CONTENT_MARKER: &str = "(no content)";
const NO_ATTACHMENTS_MARKER: &str = "- none";

/// Where candidate threads come from.
pub trait ThreadSource {
    fn fetch_threads(
        &mut self,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<ForumThread>, DiscordError>;
}

impl ThreadSource for DiscordForumClient {
    fn fetch_threads(
        &mut self,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<ForumThread>, DiscordError> {
        DiscordForumClient::fetch_threads(self, since, limit)
    }
}

/// Where rendered issues go.
pub trait IssueSink {
    fn create_issue(&self, draft: IssueDraft) -> Result<IssueCreation, GithubError>;
}

impl IssueSink for GithubIssueClient {
    fn create_issue(&self, draft: IssueDraft) -> Result<IssueCreation, GithubError> {
        GithubIssueClient::create_issue(self, draft)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub issue_title_prefix: String,
    pub issue_body_template: String,
    pub labels: LabelPolicy,
    pub assignees: Vec<String>,
    pub max_threads_per_run: usize,
}

impl SyncSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            issue_title_prefix: config.issue_title_prefix.clone(),
            issue_body_template: config.issue_body_template.clone(),
            labels: config.label_policy(),
            assignees: config.assignees.clone(),
            max_threads_per_run: config.max_threads_per_run,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncRunReport {
    /// Threads returned by the source.
    pub fetched: usize,
    /// Threads already present in the ledger.
    pub skipped: usize,
    /// Issues newly created on the destination.
    pub created: usize,
    /// Dry-run submissions that produced only a preview.
    pub previewed: usize,
}

pub struct IssueSyncer<S, W> {
    settings: SyncSettings,
    source: S,
    sink: W,
    ledger: SyncLedger,
    telemetry: RunTelemetry,
}

impl<S: ThreadSource, W: IssueSink> IssueSyncer<S, W> {
    pub fn new(
        settings: SyncSettings,
        source: S,
        sink: W,
        ledger: SyncLedger,
        telemetry: RunTelemetry,
    ) -> Self {
        Self {
            settings,
            source,
            sink,
            ledger,
            telemetry,
        }
    }

    pub fn ledger(&self) -> &SyncLedger {
        &self.ledger
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    /// Runs one batch. Any fetch, render, submit or persist failure aborts
    /// the run; threads recorded before the failure stay in the saved ledger.
    pub fn run(
        &mut self,
        since: Option<DateTime<Utc>>,
        max_threads: Option<usize>,
    ) -> Result<SyncRunReport> {
        let limit = max_threads
            .filter(|limit| *limit > 0)
            .unwrap_or(self.settings.max_threads_per_run);
        let mut threads = self
            .source
            .fetch_threads(since, Some(limit))
            .context("failed to fetch forum threads")?;
        threads.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        tracing::info!(
            parent: self.telemetry.span(),
            fetched = threads.len(),
            limit,
            "fetched forum threads"
        );

        let mut report = SyncRunReport {
            fetched: threads.len(),
            ..SyncRunReport::default()
        };
        for thread in &threads {
            if self.ledger.has_processed(&thread.id) {
                report.skipped += 1;
                self.telemetry.record_processed_thread_skipped();
                tracing::debug!(
                    parent: self.telemetry.span(),
                    thread_id = %thread.id,
                    "thread already processed, skipping"
                );
                continue;
            }

            let labels = self.settings.labels.build_labels(&thread.applied_tags);
            let body = render_template(&self.settings.issue_body_template, &issue_body_context(thread))
                .with_context(|| format!("failed to render issue body for thread {}", thread.id))?;
            let draft = IssueDraft {
                title: issue_title(&self.settings.issue_title_prefix, thread),
                body,
                labels,
                assignees: self.settings.assignees.clone(),
            };
            let outcome = self
                .sink
                .create_issue(draft)
                .with_context(|| format!("failed to create issue for thread {}", thread.id))?;
            match outcome {
                IssueCreation::Created(_) => report.created += 1,
                IssueCreation::Preview(_) => report.previewed += 1,
            }
            self.ledger.mark_processed(&thread.id, thread.created_at);
            self.ledger.save().with_context(|| {
                format!("failed to persist ledger after thread {}", thread.id)
            })?;
        }

        if report.created + report.previewed == 0 && self.ledger.last_synced_at().is_some() {
            self.ledger.touch(Utc::now());
        }
        self.ledger.save().context("failed to persist ledger")?;
        tracing::info!(
            parent: self.telemetry.span(),
            fetched = report.fetched,
            skipped = report.skipped,
            created = report.created,
            previewed = report.previewed,
            "sync run finished"
        );
        Ok(report)
    }
}

/// Prefix plus the trimmed thread name.
pub(crate) fn issue_title(prefix: &str, thread: &ForumThread) -> String {
    format!("{prefix}{}", thread.name.trim()).trim().to_string()
}

pub(crate) fn issue_body_context(thread: &ForumThread) -> BTreeMap<String, String> {
    let first_message = &thread.first_message;
    let content = if first_message.content.trim().is_empty() {
        NO_CONTENT_MARKER.to_string()
    } else {
        first_message.content.clone()
    };
    BTreeMap::from([
        ("title".to_string(), thread.name.clone()),
        ("author".to_string(), first_message.author_name.clone()),
        ("message_url".to_string(), thread.jump_url()),
        ("content".to_string(), content),
        ("attachments".to_string(), format_attachments(thread)),
        ("created_at".to_string(), format_iso8601_utc(thread.created_at)),
        ("thread_id".to_string(), thread.id.clone()),
    ])
}

fn format_attachments(thread: &ForumThread) -> String {
    let attachments = &thread.first_message.attachments;
    if attachments.is_empty() {
        return NO_ATTACHMENTS_MARKER.to_string();
    }
    attachments
        .iter()
        .map(|attachment| format!("- [{}]({})", attachment.filename, attachment.url))
        .collect::<Vec<_>>()
        .join("\n")
}
