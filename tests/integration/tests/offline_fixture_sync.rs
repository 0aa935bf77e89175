//! End-to-end sync runs over the sample forum fixture.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use issue_bridge_core::{parse_iso8601_utc, RecordingSleeper, RetryPolicy, RunTelemetry};
use issue_bridge_discord::{DiscordForumClient, ForumFixture};
use issue_bridge_github::{
    GithubError, GithubIssueClient, GithubIssueClientConfig, IssueCreation, IssueDraft, RepoRef,
};
use issue_bridge_sync::{IssueSink, IssueSyncer, LabelPolicy, SyncLedger, SyncSettings};
use serde_json::json;
use tempfile::tempdir;

const CHANNEL_ID: &str = "1100000000000000000";
const ISSUES_PATH: &str = "/repos/acme/widgets/issues";
const BODY_TEMPLATE: &str = "Reported by {{author}} at {{created_at}}\n\n{{content}}\n\n### Attachments\n{{attachments}}\n\n[Open on Discord]({{message_url}}) (thread {{thread_id}})";

fn fixture() -> ForumFixture {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/sample_threads.json");
    ForumFixture::load(&path).expect("sample fixture")
}

fn settings() -> SyncSettings {
    SyncSettings {
        issue_title_prefix: "[Discord] ".to_string(),
        issue_body_template: BODY_TEMPLATE.to_string(),
        labels: LabelPolicy {
            default_labels: vec!["discord".to_string(), "triage".to_string()],
            tag_label_map: BTreeMap::from([(
                "7001".to_string(),
                vec!["bug".to_string(), "discord".to_string()],
            )]),
            fallback_label_prefix: "discord/tag/".to_string(),
        },
        assignees: vec!["octocat".to_string()],
        max_threads_per_run: 20,
    }
}

fn github_client(server: &MockServer, telemetry: RunTelemetry, dry_run: bool) -> GithubIssueClient {
    let mut config = GithubIssueClientConfig::new(
        RepoRef::parse("acme/widgets").expect("repo"),
        (!dry_run).then(|| "gh-token".to_string()),
    );
    config.api_base = server.base_url();
    config.dry_run = dry_run;
    let retry = RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(20))
        .with_sleeper(Arc::new(RecordingSleeper::default()));
    GithubIssueClient::new(config, retry, telemetry).expect("github client")
}

fn syncer(
    server: &MockServer,
    ledger_path: &Path,
    dry_run: bool,
) -> (IssueSyncer<DiscordForumClient, GithubIssueClient>, RunTelemetry) {
    let telemetry = RunTelemetry::new("integration");
    let source = DiscordForumClient::from_fixture(CHANNEL_ID, fixture(), telemetry.clone());
    let sink = github_client(server, telemetry.clone(), dry_run);
    let mut ledger = SyncLedger::load(ledger_path, true).expect("ledger");
    if dry_run {
        ledger = ledger.into_read_only();
    }
    (
        IssueSyncer::new(settings(), source, sink, ledger, telemetry.clone()),
        telemetry,
    )
}

#[test]
fn integration_sample_fixture_creates_two_issues_then_nothing_on_rerun() {
    let server = MockServer::start();
    let crash_issue = server.mock(|when, then| {
        when.method(POST)
            .path(ISSUES_PATH)
            .header("authorization", "Bearer gh-token")
            .json_body_includes(json!({"labels": ["discord", "triage", "bug"]}).to_string())
            .body_includes("crash-log.txt");
        then.status(201).json_body(json!({
            "number": 11,
            "html_url": "https://github.com/acme/widgets/issues/11"
        }));
    });
    let feature_issue = server.mock(|when, then| {
        when.method(POST)
            .path(ISSUES_PATH)
            .json_body_includes(json!({
                "labels": ["discord", "triage", "discord/tag/feature-request"]
            }).to_string())
            .body_includes("photo mode");
        then.status(201).json_body(json!({
            "number": 12,
            "html_url": "https://github.com/acme/widgets/issues/12"
        }));
    });
    let temp = tempdir().expect("tempdir");
    let ledger_path = temp.path().join("state").join("ledger.json");

    let (mut first, telemetry) = syncer(&server, &ledger_path, false);
    let first_report = first.run(None, None).expect("first run");

    assert_eq!(first_report.fetched, 2);
    assert_eq!(first_report.created, 2);
    crash_issue.assert_calls(1);
    feature_issue.assert_calls(1);
    assert_eq!(telemetry.snapshot().empty_threads_skipped, 1);
    assert_eq!(
        first.ledger().thread_ids().collect::<Vec<_>>(),
        vec!["1100000000000000300", "1100000000000000400"]
    );
    assert_eq!(
        first.ledger().processed_at("1100000000000000400"),
        Some("2025-03-03T17:59:30+00:00")
    );
    assert!(!ledger_path.with_extension("json.bak").exists());

    let (mut second, _) = syncer(&server, &ledger_path, false);
    let second_report = second.run(None, None).expect("second run");

    assert_eq!(second_report.created, 0);
    assert_eq!(second_report.skipped, 2);
    crash_issue.assert_calls(1);
    feature_issue.assert_calls(1);
    assert!(ledger_path.with_extension("json.bak").exists());
}

struct PreviewRecorder {
    inner: GithubIssueClient,
    outcomes: RefCell<Vec<IssueCreation>>,
}

impl IssueSink for PreviewRecorder {
    fn create_issue(&self, draft: IssueDraft) -> Result<IssueCreation, GithubError> {
        let outcome = self.inner.create_issue(draft)?;
        self.outcomes.borrow_mut().push(outcome.clone());
        Ok(outcome)
    }
}

#[test]
fn integration_dry_run_previews_rendered_payloads_without_side_effects() {
    let server = MockServer::start();
    let any_post = server.mock(|when, then| {
        when.method(POST);
        then.status(500);
    });
    let temp = tempdir().expect("tempdir");
    let ledger_path = temp.path().join("ledger.json");
    let telemetry = RunTelemetry::new("integration-dry-run");
    let recorder = PreviewRecorder {
        inner: github_client(&server, telemetry.clone(), true),
        outcomes: RefCell::new(Vec::new()),
    };
    let ledger = SyncLedger::load(&ledger_path, true)
        .expect("ledger")
        .into_read_only();
    let mut syncer = IssueSyncer::new(
        settings(),
        DiscordForumClient::from_fixture(CHANNEL_ID, fixture(), telemetry.clone()),
        recorder,
        ledger,
        telemetry.clone(),
    );

    let report = syncer.run(None, None).expect("dry run");

    assert_eq!(report.previewed, 2);
    assert_eq!(report.created, 0);
    any_post.assert_calls(0);
    assert!(!ledger_path.exists());
    assert_eq!(telemetry.snapshot().dry_run_previews, 2);

    let outcomes = syncer.sink().outcomes.borrow().clone();
    let IssueCreation::Preview(first) = &outcomes[0] else {
        panic!("dry run must preview");
    };
    assert_eq!(first.title, "[Discord] Game crashes after loading a save");
    assert_eq!(first.labels, vec!["discord", "triage", "bug"]);
    assert_eq!(first.assignees, vec!["octocat"]);
    assert!(first.body.starts_with("Reported by Mika at 2025-03-02T09:15:00+00:00"));
    assert!(first
        .body
        .contains("- [crash-log.txt](https://cdn.discordapp.com/attachments/1/9001/crash-log.txt)"));
    assert!(first.body.contains(
        "https://discord.com/channels/1000000000000000001/1100000000000000300/1100000000000000301"
    ));
    let IssueCreation::Preview(second) = &outcomes[1] else {
        panic!("dry run must preview");
    };
    assert!(second.body.contains("### Attachments\n- none"));
}

#[test]
fn integration_since_cutoff_limits_run_to_newer_threads() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
        when.method(POST).path(ISSUES_PATH).body_includes("photo mode");
        then.status(201).json_body(json!({
            "number": 12,
            "html_url": "https://github.com/acme/widgets/issues/12"
        }));
    });
    let temp = tempdir().expect("tempdir");
    let ledger_path = temp.path().join("ledger.json");
    let (mut syncer, _) = syncer(&server, &ledger_path, false);
    let since = parse_iso8601_utc("2025-03-03T00:00:00Z").expect("since");

    let report = syncer.run(Some(since), None).expect("run");

    assert_eq!(report.fetched, 1);
    assert_eq!(report.created, 1);
    create.assert_calls(1);
}

#[test]
fn integration_quota_exhaustion_aborts_run_and_keeps_ledger_empty() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
        when.method(POST).path(ISSUES_PATH);
        then.status(403)
            .header("x-ratelimit-remaining", "0")
            .header("x-ratelimit-reset", "1741000000")
            .json_body(json!({"message": "API rate limit exceeded"}));
    });
    let temp = tempdir().expect("tempdir");
    let ledger_path = temp.path().join("ledger.json");
    let (mut syncer, _) = syncer(&server, &ledger_path, false);

    let error = syncer.run(None, None).expect_err("quota exhausted");

    create.assert_calls(1);
    assert!(format!("{error:#}").contains("rate limit exhausted"));
    assert!(syncer.ledger().is_empty());
    assert!(!ledger_path.exists());
}
