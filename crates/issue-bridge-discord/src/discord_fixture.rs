use std::path::Path;

use serde::Deserialize;

use crate::discord_error::DiscordError;
use crate::discord_types::{ChannelPayload, MessagePayload, RawId, ThreadPayload};

/// Static snapshot standing in for the live thread, message and channel APIs.
///
/// ```json
/// {
///   "channel": {"id": "100", "available_tags": [{"id": "7", "name": "Bug"}]},
///   "threads": [{"id": "200", "name": "...", "created_at": "...", "applied_tags": ["7"],
///                "messages": [{"id": "201", "timestamp": "...", "content": "..."}]}]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForumFixture {
    #[serde(default)]
    pub(crate) channel: ChannelPayload,
    #[serde(default)]
    pub(crate) threads: Vec<ThreadPayload>,
}

impl ForumFixture {
    pub fn load(path: &Path) -> Result<Self, DiscordError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DiscordError::FixtureRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| DiscordError::FixtureParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub(crate) fn tag_names(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.channel
            .available_tags
            .iter()
            .map(|tag| (tag.id.clone().into_string(), tag.name.clone()))
    }

    pub(crate) fn channel_id(&self) -> Option<String> {
        self.channel.id.clone().map(RawId::into_string)
    }

    pub(crate) fn messages_for(&self, thread_id: &str) -> Option<&[MessagePayload]> {
        self.threads
            .iter()
            .find(|thread| thread.thread_id() == thread_id.trim())
            .map(|thread| thread.messages.as_slice())
    }
}
