//! Read side of the issue bridge: forum threads from the Discord REST API.
//!
//! Live responses and offline fixtures are mapped at the boundary into the
//! typed [`ForumThread`] model, so callers never see raw payloads.

pub mod discord_client;
pub mod discord_error;
pub mod discord_fixture;
pub mod discord_types;

pub use discord_client::{DiscordClientConfig, DiscordForumClient, DEFAULT_DISCORD_API_BASE};
pub use discord_error::DiscordError;
pub use discord_fixture::ForumFixture;
pub use discord_types::{AppliedTag, ForumAttachment, ForumMessage, ForumThread};
