use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use issue_bridge_core::parse_iso8601_utc;
use serde::Deserialize;

use crate::discord_error::DiscordError;

const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;
const DEFAULT_THREAD_NAME: &str = "(no title)";
const DEFAULT_ATTACHMENT_NAME: &str = "attachment";
const DEFAULT_AUTHOR_NAME: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumAttachment {
    pub id: String,
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumMessage {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    /// Whitespace-trimmed message text.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub attachments: Vec<ForumAttachment>,
}

/// A forum tag applied to a thread, with its display name resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTag {
    pub id: String,
    pub name: String,
}

/// Snapshot of one forum thread and its starter message.
///
/// `created_at` is never later than `first_message.timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumThread {
    pub id: String,
    pub guild_id: Option<String>,
    pub channel_id: String,
    pub name: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub applied_tags: Vec<AppliedTag>,
    pub first_message: ForumMessage,
}

impl ForumThread {
    /// Link to the starter message of the thread.
    pub fn jump_url(&self) -> String {
        let guild = self.guild_id.as_deref().unwrap_or("@me");
        format!(
            "https://discord.com/channels/{guild}/{}/{}",
            self.id, self.first_message.id
        )
    }
}

/// Discord encodes ids as strings, hand-written fixtures often use numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawId {
    Text(String),
    Number(u64),
}

impl RawId {
    pub(crate) fn into_string(self) -> String {
        match self {
            Self::Text(value) => value.trim().to_string(),
            Self::Number(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TagPayload {
    pub(crate) id: RawId,
    #[serde(default)]
    pub(crate) name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ChannelPayload {
    #[serde(default)]
    pub(crate) id: Option<RawId>,
    #[serde(default)]
    pub(crate) available_tags: Vec<TagPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ThreadMetadataPayload {
    #[serde(default)]
    pub(crate) create_timestamp: Option<String>,
    #[serde(default)]
    pub(crate) archive_timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ThreadPayload {
    pub(crate) id: RawId,
    #[serde(default)]
    pub(crate) guild_id: Option<RawId>,
    #[serde(default)]
    pub(crate) parent_id: Option<RawId>,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) owner_id: Option<RawId>,
    #[serde(default)]
    pub(crate) applied_tags: Vec<RawId>,
    #[serde(default)]
    pub(crate) thread_metadata: Option<ThreadMetadataPayload>,
    #[serde(default)]
    pub(crate) created_at: Option<String>,
    #[serde(default)]
    pub(crate) timestamp: Option<String>,
    /// Only present in offline fixtures.
    #[serde(default)]
    pub(crate) messages: Vec<MessagePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ThreadListPayload {
    #[serde(default)]
    pub(crate) threads: Vec<ThreadPayload>,
    #[serde(default)]
    pub(crate) has_more: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AuthorPayload {
    #[serde(default)]
    pub(crate) id: Option<RawId>,
    #[serde(default)]
    pub(crate) username: Option<String>,
    #[serde(default)]
    pub(crate) global_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AttachmentPayload {
    #[serde(default)]
    pub(crate) id: Option<RawId>,
    #[serde(default)]
    pub(crate) url: Option<String>,
    #[serde(default)]
    pub(crate) filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessagePayload {
    #[serde(default)]
    pub(crate) id: Option<RawId>,
    #[serde(default)]
    pub(crate) author: Option<AuthorPayload>,
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) timestamp: Option<String>,
    #[serde(default)]
    pub(crate) attachments: Vec<AttachmentPayload>,
}

impl ThreadPayload {
    pub(crate) fn thread_id(&self) -> String {
        self.id.clone().into_string()
    }

    /// Creation time as reported by the platform, before clamping.
    pub(crate) fn reported_created_at(&self) -> Result<Option<DateTime<Utc>>, DiscordError> {
        let metadata = self.thread_metadata.as_ref();
        let candidate = metadata
            .and_then(|metadata| metadata.create_timestamp.as_deref())
            .or_else(|| metadata.and_then(|metadata| metadata.archive_timestamp.as_deref()))
            .or(self.created_at.as_deref())
            .or(self.timestamp.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        match candidate {
            Some(raw) => parse_timestamp(raw, "thread").map(Some),
            None => Ok(snowflake_timestamp(&self.thread_id())),
        }
    }
}

impl ForumMessage {
    pub(crate) fn from_payload(payload: MessagePayload) -> Result<Self, DiscordError> {
        let id = payload
            .id
            .map(RawId::into_string)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DiscordError::InvalidPayload("message is missing an id".to_string()))?;
        let raw_timestamp = payload.timestamp.ok_or_else(|| {
            DiscordError::InvalidPayload(format!("message {id} is missing a timestamp"))
        })?;
        let timestamp = parse_timestamp(&raw_timestamp, "message")?;
        let author = payload.author.unwrap_or_default();
        let author_name = author
            .global_name
            .filter(|name| !name.trim().is_empty())
            .or(author.username.filter(|name| !name.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string());
        let attachments = payload
            .attachments
            .into_iter()
            .map(|attachment| ForumAttachment {
                id: attachment.id.map(RawId::into_string).unwrap_or_default(),
                url: attachment.url.unwrap_or_default(),
                filename: attachment
                    .filename
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_ATTACHMENT_NAME.to_string()),
            })
            .collect();
        Ok(Self {
            id,
            author_id: author.id.map(RawId::into_string).unwrap_or_default(),
            author_name,
            content: payload.content.unwrap_or_default().trim().to_string(),
            timestamp,
            attachments,
        })
    }
}

/// Builds a thread from its payload, starter message and resolved tags.
pub(crate) fn build_forum_thread(
    payload: &ThreadPayload,
    channel_id: &str,
    reported_created_at: Option<DateTime<Utc>>,
    first_message: ForumMessage,
    applied_tags: Vec<AppliedTag>,
) -> ForumThread {
    let created_at = match reported_created_at {
        Some(reported) => reported.min(first_message.timestamp),
        None => first_message.timestamp,
    };
    ForumThread {
        id: payload.thread_id(),
        guild_id: payload
            .guild_id
            .clone()
            .map(RawId::into_string)
            .filter(|id| !id.is_empty()),
        channel_id: channel_id.to_string(),
        name: payload
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_THREAD_NAME.to_string()),
        owner_id: payload
            .owner_id
            .clone()
            .map(RawId::into_string)
            .unwrap_or_default(),
        created_at,
        applied_tags,
        first_message,
    }
}

fn parse_timestamp(raw: &str, subject: &str) -> Result<DateTime<Utc>, DiscordError> {
    parse_iso8601_utc(raw)
        .map_err(|error| DiscordError::InvalidPayload(format!("{subject} timestamp: {error}")))
}

/// Creation time encoded in a Discord snowflake id.
pub(crate) fn snowflake_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let raw = id.trim().parse::<u64>().ok()?;
    let millis = (raw >> 22).checked_add(DISCORD_EPOCH_MS)?;
    DateTime::from_timestamp_millis(i64::try_from(millis).ok()?)
}

/// Orders snowflake ids numerically, falling back to lexical order.
pub(crate) fn compare_discord_ids(left: &str, right: &str) -> Ordering {
    match (left.parse::<u128>(), right.parse::<u128>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => left.cmp(right),
    }
}
