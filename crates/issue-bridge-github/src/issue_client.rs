use std::time::Duration;

use chrono::{DateTime, Utc};
use issue_bridge_core::transport_helpers::{
    header_str, is_retryable_status, is_retryable_transport_error, truncate_for_error,
    REQUEST_ATTEMPT_HEADER, USER_AGENT,
};
use issue_bridge_core::{AttemptFailure, RetryPolicy, RunTelemetry};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::github_error::GithubError;
use crate::repo_ref::RepoRef;

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const ERROR_BODY_MAX_CHARS: usize = 800;
const GITHUB_API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone)]
pub struct GithubIssueClientConfig {
    pub api_base: String,
    pub token: Option<String>,
    pub repo: RepoRef,
    pub dry_run: bool,
    pub request_timeout_ms: u64,
}

impl GithubIssueClientConfig {
    pub fn new(repo: RepoRef, token: Option<String>) -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            token,
            repo,
            dry_run: false,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

/// Issue content ready for submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueDraft {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
}

/// JSON body of `POST /repos/{owner}/{repo}/issues`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuePayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
}

impl From<IssueDraft> for IssuePayload {
    fn from(draft: IssueDraft) -> Self {
        Self {
            title: draft.title,
            body: draft.body,
            labels: draft.labels,
            assignees: draft.assignees,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedIssue {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueCreation {
    Created(CreatedIssue),
    /// Dry run: the payload that would have been submitted.
    Preview(IssuePayload),
}

impl IssueCreation {
    pub fn is_preview(&self) -> bool {
        matches!(self, Self::Preview(_))
    }

    pub fn issue_number(&self) -> Option<u64> {
        match self {
            Self::Created(issue) => Some(issue.number),
            Self::Preview(_) => None,
        }
    }
}

enum IssueTransport {
    Live { http: Client, endpoint: String },
    DryRun,
}

pub struct GithubIssueClient {
    repo: RepoRef,
    transport: IssueTransport,
    retry: RetryPolicy,
    telemetry: RunTelemetry,
}

impl GithubIssueClient {
    pub fn new(
        config: GithubIssueClientConfig,
        retry: RetryPolicy,
        telemetry: RunTelemetry,
    ) -> Result<Self, GithubError> {
        let transport = if config.dry_run {
            IssueTransport::DryRun
        } else {
            let token = config
                .token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .ok_or(GithubError::MissingToken)?;
            let mut headers = HeaderMap::new();
            headers.insert(
                reqwest::header::USER_AGENT,
                HeaderValue::from_static(USER_AGENT),
            );
            headers.insert(
                ACCEPT,
                HeaderValue::from_static("application/vnd.github+json"),
            );
            headers.insert(
                "x-github-api-version",
                HeaderValue::from_static(GITHUB_API_VERSION),
            );
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| GithubError::InvalidToken)?,
            );
            let http = Client::builder()
                .default_headers(headers)
                .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
                .build()
                .map_err(GithubError::ClientBuild)?;
            let endpoint = format!(
                "{}/repos/{}/{}/issues",
                config.api_base.trim().trim_end_matches('/'),
                config.repo.owner,
                config.repo.name
            );
            IssueTransport::Live { http, endpoint }
        };
        Ok(Self {
            repo: config.repo,
            transport,
            retry,
            telemetry,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self.transport, IssueTransport::DryRun)
    }

    pub fn create_issue(&self, draft: IssueDraft) -> Result<IssueCreation, GithubError> {
        let payload = IssuePayload::from(draft);
        let (http, endpoint) = match &self.transport {
            IssueTransport::DryRun => {
                self.telemetry.record_dry_run_preview();
                tracing::info!(
                    parent: self.telemetry.span(),
                    repo = %self.repo,
                    title = %payload.title,
                    labels = ?payload.labels,
                    assignees = ?payload.assignees,
                    "dry run, issue not created"
                );
                return Ok(IssueCreation::Preview(payload));
            }
            IssueTransport::Live { http, endpoint } => (http, endpoint),
        };

        let created = self
            .retry
            .run(&self.telemetry, "create issue", |request_index| {
                let response = http
                    .post(endpoint.as_str())
                    .header(REQUEST_ATTEMPT_HEADER, request_index.to_string())
                    .json(&payload)
                    .send();
                classify_response(response)
            })?;
        self.telemetry.record_issue_created();
        tracing::info!(
            parent: self.telemetry.span(),
            repo = %self.repo,
            issue_number = created.number,
            url = %created.html_url,
            "created issue"
        );
        Ok(IssueCreation::Created(created))
    }
}

fn classify_response(
    response: reqwest::Result<Response>,
) -> Result<CreatedIssue, AttemptFailure<GithubError>> {
    let response = match response {
        Ok(response) => response,
        Err(source) => {
            return Err(if is_retryable_transport_error(&source) {
                AttemptFailure::Transient(GithubError::Transport(source))
            } else {
                AttemptFailure::Permanent(GithubError::Transport(source))
            });
        }
    };

    let status = response.status();
    let quota_exhausted = header_str(response.headers(), "x-ratelimit-remaining") == Some("0");
    let reset_at = rate_limit_reset(response.headers());
    let body = response
        .text()
        .map_err(|source| AttemptFailure::Transient(GithubError::Transport(source)))?;
    if status.is_success() {
        return serde_json::from_str(&body)
            .map_err(|source| AttemptFailure::Permanent(GithubError::Decode(source)));
    }
    if status == StatusCode::FORBIDDEN && quota_exhausted {
        return Err(AttemptFailure::Permanent(GithubError::QuotaExhausted {
            reset_at,
        }));
    }

    let error = GithubError::Status {
        status: status.as_u16(),
        body: truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
    };
    if is_retryable_status(status.as_u16()) {
        Err(AttemptFailure::Transient(error))
    } else {
        Err(AttemptFailure::Permanent(error))
    }
}

/// `X-RateLimit-Reset` is epoch seconds.
fn rate_limit_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    header_str(headers, "x-ratelimit-reset")
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
}
