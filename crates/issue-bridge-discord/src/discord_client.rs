use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use issue_bridge_core::transport_helpers::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, parse_seconds,
    truncate_for_error, REQUEST_ATTEMPT_HEADER, USER_AGENT,
};
use issue_bridge_core::{AttemptFailure, RetryPolicy, RunTelemetry};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::discord_error::DiscordError;
use crate::discord_fixture::ForumFixture;
use crate::discord_types::{
    build_forum_thread, compare_discord_ids, AppliedTag, ChannelPayload, ForumMessage,
    ForumThread, MessagePayload, ThreadListPayload, ThreadPayload,
};

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_MESSAGE_PAGE_SIZE: usize = 50;
const DEFAULT_RATE_LIMIT_RETRY_AFTER: Duration = Duration::from_secs(1);
const ERROR_BODY_MAX_CHARS: usize = 800;

#[derive(Debug, Clone)]
pub struct DiscordClientConfig {
    pub api_base: String,
    pub bot_token: Option<String>,
    pub channel_id: String,
    pub request_timeout_ms: u64,
    pub message_page_size: usize,
}

impl DiscordClientConfig {
    pub fn new(channel_id: impl Into<String>, bot_token: Option<String>) -> Self {
        Self {
            api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            bot_token,
            channel_id: channel_id.into(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            message_page_size: DEFAULT_MESSAGE_PAGE_SIZE,
        }
    }
}

struct LiveApi {
    http: Client,
    api_base: String,
    message_page_size: usize,
}

enum ThreadBackend {
    Live(LiveApi),
    Fixture(ForumFixture),
}

/// Reads forum threads of one channel, live or from an offline fixture.
pub struct DiscordForumClient {
    channel_id: String,
    backend: ThreadBackend,
    retry: RetryPolicy,
    telemetry: RunTelemetry,
    tag_names: Option<BTreeMap<String, String>>,
}

impl DiscordForumClient {
    pub fn new(
        config: DiscordClientConfig,
        retry: RetryPolicy,
        telemetry: RunTelemetry,
    ) -> Result<Self, DiscordError> {
        let channel_id = config.channel_id.trim().to_string();
        if channel_id.is_empty() {
            return Err(DiscordError::MissingChannel);
        }
        let token = config
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(DiscordError::MissingToken)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(USER_AGENT),
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bot {token}")).map_err(|_| DiscordError::InvalidToken)?,
        );
        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(DiscordError::ClientBuild)?;

        Ok(Self {
            channel_id,
            backend: ThreadBackend::Live(LiveApi {
                http,
                api_base: config.api_base.trim().trim_end_matches('/').to_string(),
                message_page_size: config.message_page_size.clamp(1, 100),
            }),
            retry,
            telemetry,
            tag_names: None,
        })
    }

    /// Serves every read from `fixture`; no credentials or network needed.
    pub fn from_fixture(channel_id: &str, fixture: ForumFixture, telemetry: RunTelemetry) -> Self {
        let channel_id = Some(channel_id.trim().to_string())
            .filter(|id| !id.is_empty())
            .or_else(|| fixture.channel_id())
            .unwrap_or_default();
        let tag_names = fixture.tag_names().collect();
        Self {
            channel_id,
            backend: ThreadBackend::Fixture(fixture),
            retry: RetryPolicy::default(),
            telemetry,
            tag_names: Some(tag_names),
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.backend, ThreadBackend::Fixture(_))
    }

    /// Threads strictly newer than `since`, at most `limit` of them, ordered by
    /// (clamped) creation time ascending.
    pub fn fetch_threads(
        &mut self,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<ForumThread>, DiscordError> {
        let limit = limit.filter(|limit| *limit > 0);
        self.ensure_channel_metadata()?;
        let candidates = match &self.backend {
            ThreadBackend::Fixture(fixture) => fixture.threads.clone(),
            ThreadBackend::Live(api) => self.collect_live_candidates(api, limit)?,
        };
        tracing::debug!(
            parent: self.telemetry.span(),
            candidates = candidates.len(),
            "collected candidate threads"
        );

        let mut threads = Vec::new();
        for candidate in &candidates {
            let reported_created_at = candidate.reported_created_at()?;
            if is_not_newer(reported_created_at, since) {
                continue;
            }
            let thread_id = candidate.thread_id();
            let messages = self.fetch_thread_messages(&thread_id)?;
            let Some(first_message) = messages.into_iter().min_by_key(|message| message.timestamp)
            else {
                self.telemetry.record_empty_thread_skipped();
                tracing::info!(
                    parent: self.telemetry.span(),
                    thread_id = %thread_id,
                    "thread has no messages, skipping"
                );
                continue;
            };
            let applied_tags = self.resolve_applied_tags(candidate);
            let thread = build_forum_thread(
                candidate,
                &self.channel_id,
                reported_created_at,
                first_message,
                applied_tags,
            );
            if is_not_newer(Some(thread.created_at), since) {
                continue;
            }
            threads.push(thread);
            if limit.is_some_and(|limit| threads.len() >= limit) {
                break;
            }
        }
        threads.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| compare_discord_ids(&left.id, &right.id))
        });
        Ok(threads)
    }

    /// Message history of one thread, in the order the platform returned it.
    pub fn fetch_thread_messages(&self, thread_id: &str) -> Result<Vec<ForumMessage>, DiscordError> {
        let payloads = match &self.backend {
            ThreadBackend::Fixture(fixture) => fixture
                .messages_for(thread_id)
                .map(<[MessagePayload]>::to_vec)
                .unwrap_or_default(),
            ThreadBackend::Live(api) => self.get_json::<Vec<MessagePayload>>(
                api,
                "list thread messages",
                &format!("/channels/{}/messages", thread_id.trim()),
                &[("limit", api.message_page_size.to_string())],
            )?,
        };
        payloads.into_iter().map(ForumMessage::from_payload).collect()
    }

    /// Display name of a forum tag; unknown ids resolve to themselves.
    pub fn resolve_tag_name(&self, tag_id: &str) -> String {
        self.tag_names
            .as_ref()
            .and_then(|names| names.get(tag_id))
            .filter(|name| !name.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| tag_id.to_string())
    }

    fn resolve_applied_tags(&self, payload: &ThreadPayload) -> Vec<AppliedTag> {
        payload
            .applied_tags
            .iter()
            .cloned()
            .map(|tag_id| {
                let id = tag_id.into_string();
                let name = self.resolve_tag_name(&id);
                AppliedTag { id, name }
            })
            .collect()
    }

    fn ensure_channel_metadata(&mut self) -> Result<(), DiscordError> {
        if self.tag_names.is_some() {
            return Ok(());
        }
        let ThreadBackend::Live(api) = &self.backend else {
            return Ok(());
        };
        let channel: ChannelPayload = self.get_json(
            api,
            "get channel",
            &format!("/channels/{}", self.channel_id),
            &[],
        )?;
        let names = channel
            .available_tags
            .into_iter()
            .map(|tag| (tag.id.into_string(), tag.name))
            .collect::<BTreeMap<_, _>>();
        tracing::debug!(
            parent: self.telemetry.span(),
            tags = names.len(),
            "cached forum tag names"
        );
        self.tag_names = Some(names);
        Ok(())
    }

    fn collect_live_candidates(
        &self,
        api: &LiveApi,
        limit: Option<usize>,
    ) -> Result<Vec<ThreadPayload>, DiscordError> {
        let active: ThreadListPayload = self.get_json(
            api,
            "list active threads",
            &format!("/channels/{}/threads/active", self.channel_id),
            &[],
        )?;
        let mut seen = HashSet::new();
        let mut collected = Vec::new();
        for thread in active.threads {
            let belongs_here = thread
                .parent_id
                .clone()
                .map(|parent| parent.into_string() == self.channel_id)
                .unwrap_or(true);
            if belongs_here && seen.insert(thread.thread_id()) {
                collected.push(thread);
            }
        }
        if limit.is_some_and(|limit| collected.len() >= limit) {
            return Ok(collected);
        }

        let archived_path = format!("/channels/{}/threads/archived/public", self.channel_id);
        let archived = collect_archived_pages(limit, collected.len(), |before| {
            let query = before
                .map(|cursor| vec![("before", cursor.to_string())])
                .unwrap_or_default();
            self.get_json(api, "list archived threads", &archived_path, &query)
        })?;
        for thread in archived {
            if seen.insert(thread.thread_id()) {
                collected.push(thread);
            }
        }
        Ok(collected)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        api: &LiveApi,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, DiscordError> {
        let url = format!("{}{}", api.api_base, path);
        self.retry.run(&self.telemetry, operation, |request_index| {
            let response = api
                .http
                .get(url.as_str())
                .query(query)
                .header(REQUEST_ATTEMPT_HEADER, request_index.to_string())
                .send();
            classify_response(operation, response)
        })
    }
}

/// Walks archived pages with a before-cursor until the platform reports no
/// more pages, a page comes back empty, or `limit` is met counting
/// `already_collected` threads gathered elsewhere.
pub(crate) fn collect_archived_pages<F>(
    limit: Option<usize>,
    already_collected: usize,
    mut fetch_page: F,
) -> Result<Vec<ThreadPayload>, DiscordError>
where
    F: FnMut(Option<&str>) -> Result<ThreadListPayload, DiscordError>,
{
    let mut collected = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = fetch_page(cursor.as_deref())?;
        let has_more = page.has_more;
        let oldest = page
            .threads
            .iter()
            .map(ThreadPayload::thread_id)
            .min_by(|left, right| compare_discord_ids(left, right));
        collected.extend(page.threads);
        if limit.is_some_and(|limit| already_collected + collected.len() >= limit) {
            break;
        }
        match oldest {
            Some(oldest) if has_more => cursor = Some(oldest),
            _ => break,
        }
    }
    Ok(collected)
}

fn is_not_newer(created_at: Option<DateTime<Utc>>, since: Option<DateTime<Utc>>) -> bool {
    matches!((created_at, since), (Some(created_at), Some(since)) if created_at <= since)
}

fn classify_response<T: DeserializeOwned>(
    operation: &str,
    response: reqwest::Result<Response>,
) -> Result<T, AttemptFailure<DiscordError>> {
    let response = match response {
        Ok(response) => response,
        Err(source) => {
            let retryable = is_retryable_transport_error(&source);
            let error = DiscordError::Transport {
                operation: operation.to_string(),
                source,
            };
            return Err(if retryable {
                AttemptFailure::Transient(error)
            } else {
                AttemptFailure::Permanent(error)
            });
        }
    };

    let status = response.status();
    let header_retry_after = parse_retry_after(response.headers());
    let body = response.text().map_err(|source| {
        AttemptFailure::Transient(DiscordError::Transport {
            operation: operation.to_string(),
            source,
        })
    })?;
    if status.is_success() {
        return serde_json::from_str(&body).map_err(|source| {
            AttemptFailure::Permanent(DiscordError::Decode {
                operation: operation.to_string(),
                source,
            })
        });
    }

    let error = DiscordError::Status {
        operation: operation.to_string(),
        status: status.as_u16(),
        body: truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
    };
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = header_retry_after
            .or_else(|| body_retry_after(&body))
            .unwrap_or(DEFAULT_RATE_LIMIT_RETRY_AFTER);
        return Err(AttemptFailure::RateLimited { retry_after, error });
    }
    if is_retryable_status(status.as_u16()) {
        return Err(AttemptFailure::Transient(error));
    }
    Err(AttemptFailure::Permanent(error))
}

/// Discord repeats the wait in the JSON body as `retry_after` seconds.
fn body_retry_after(body: &str) -> Option<Duration> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    let raw = match value.get("retry_after")? {
        Value::Number(number) => number.as_f64()?.to_string(),
        Value::String(text) => text.clone(),
        _ => return None,
    };
    parse_seconds(&raw)
}
