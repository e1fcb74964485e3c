//! Chat platform collaborator.
//!
//! Everything the relay needs from Discord goes through [`ChatPlatform`], so
//! the assembly, dispatch and scheduling logic can run against a fake in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, ChannelType, GetMessages, GuildId, Message};
use serenity::http::{Http, HttpError};
use std::num::NonZeroU64;
use std::sync::Arc;
use tracing::debug;

use crate::discord_text::clean_content;
use crate::error::{RelayError, RelayResult, ResourceKind};
use crate::retry::{retry, RetryPolicy};

/// Milliseconds between the Unix epoch and the first second of 2015.
const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// Maximum page size of the message history endpoint.
const MAX_HISTORY_PAGE: usize = 100;

/// A message read from a channel's history.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Written by the bot account itself.
    pub from_self: bool,
}

/// A message the relay published.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub id: u64,
    pub channel_id: u64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuildInfo {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
}

/// A custom emote a guild makes available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmoteCatalogEntry {
    pub name: String,
    pub id: u64,
    pub animated: bool,
}

impl EmoteCatalogEntry {
    /// The inline token the platform renders as the emote.
    pub fn token(&self) -> String {
        let prefix = if self.animated { "a" } else { "" };
        format!("<{}:{}:{}>", prefix, self.name, self.id)
    }
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn guild(&self, guild_id: u64) -> RelayResult<GuildInfo>;

    /// Resolves a text channel, failing with `NotFound` for the guild or the channel.
    async fn text_channel(&self, guild_id: u64, channel_id: u64) -> RelayResult<ChannelInfo>;

    /// Up to `limit` most recent messages, in whatever order the platform returns them.
    async fn recent_messages(&self, channel_id: u64, limit: usize)
        -> RelayResult<Vec<ChannelMessage>>;

    async fn guild_emotes(&self, guild_id: u64) -> RelayResult<Vec<EmoteCatalogEntry>>;

    async fn send_message(&self, channel_id: u64, content: &str) -> RelayResult<PublishedMessage>;
}

/// Creation time encoded in a snowflake id.
pub fn snowflake_timestamp(id: u64) -> DateTime<Utc> {
    let millis = (id >> 22) + DISCORD_EPOCH_MS;
    DateTime::<Utc>::from_timestamp_millis(millis as i64).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Discord over serenity's REST client.
pub struct SerenityPlatform {
    http: Arc<Http>,
    bot_id: u64,
    retry: RetryPolicy,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, bot_id: u64, retry: RetryPolicy) -> Self {
        Self {
            http,
            bot_id,
            retry,
        }
    }

    fn convert_message(&self, message: &Message) -> ChannelMessage {
        ChannelMessage {
            id: message.id.get(),
            author_id: message.author.id.get(),
            author_name: message.author.name.clone(),
            content: clean_content(message),
            timestamp: snowflake_timestamp(message.id.get()),
            from_self: message.author.id.get() == self.bot_id,
        }
    }
}

fn status_of(error: &serenity::Error) -> Option<u16> {
    match error {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            Some(response.status_code.as_u16())
        }
        _ => None,
    }
}

/// Client errors will not get better by asking again.
fn is_retryable(error: &serenity::Error) -> bool {
    !matches!(status_of(error), Some(status) if (400..500).contains(&status))
}

fn map_lookup_error(error: serenity::Error, kind: ResourceKind, id: u64) -> RelayError {
    match status_of(&error) {
        Some(404) => RelayError::not_found(kind, id),
        _ => RelayError::Upstream(error.to_string()),
    }
}

/// Guild channel kinds the relay can read history from and post into.
pub fn accepts_messages(kind: ChannelType) -> bool {
    matches!(
        kind,
        ChannelType::Text
            | ChannelType::News
            | ChannelType::PublicThread
            | ChannelType::PrivateThread
            | ChannelType::NewsThread
    )
}

fn nonzero(id: u64, kind: ResourceKind) -> RelayResult<NonZeroU64> {
    NonZeroU64::new(id).ok_or(RelayError::not_found(kind, id))
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn guild(&self, guild_id: u64) -> RelayResult<GuildInfo> {
        let id = GuildId::from(nonzero(guild_id, ResourceKind::Guild)?);
        let guild = retry(self.retry, "get guild", is_retryable, || {
            id.to_partial_guild(&self.http)
        })
        .await
        .map_err(|e| map_lookup_error(e, ResourceKind::Guild, guild_id))?;

        Ok(GuildInfo {
            id: guild_id,
            name: guild.name,
        })
    }

    async fn text_channel(&self, guild_id: u64, channel_id: u64) -> RelayResult<ChannelInfo> {
        self.guild(guild_id).await?;

        let cid = ChannelId::from(nonzero(channel_id, ResourceKind::Channel)?);
        let channel = retry(self.retry, "get channel", is_retryable, || {
            cid.to_channel(&*self.http)
        })
        .await
        .map_err(|e| map_lookup_error(e, ResourceKind::Channel, channel_id))?;

        let channel = channel
            .guild()
            .filter(|c| c.guild_id.get() == guild_id && accepts_messages(c.kind))
            .ok_or(RelayError::not_found(ResourceKind::Channel, channel_id))?;

        Ok(ChannelInfo {
            id: channel_id,
            guild_id,
            name: channel.name,
        })
    }

    async fn recent_messages(
        &self,
        channel_id: u64,
        limit: usize,
    ) -> RelayResult<Vec<ChannelMessage>> {
        let cid = ChannelId::from(nonzero(channel_id, ResourceKind::Channel)?);
        let limit = limit.clamp(1, MAX_HISTORY_PAGE) as u8;

        let messages = retry(self.retry, "get channel messages", is_retryable, || {
            cid.messages(&self.http, GetMessages::new().limit(limit))
        })
        .await
        .map_err(|e| map_lookup_error(e, ResourceKind::Channel, channel_id))?;

        debug!("Fetched {} messages from channel {}", messages.len(), channel_id);
        Ok(messages.iter().map(|m| self.convert_message(m)).collect())
    }

    async fn guild_emotes(&self, guild_id: u64) -> RelayResult<Vec<EmoteCatalogEntry>> {
        let gid = GuildId::from(nonzero(guild_id, ResourceKind::Guild)?);

        let emojis = retry(self.retry, "get guild emojis", is_retryable, || {
            gid.emojis(&self.http)
        })
        .await
        .map_err(|e| map_lookup_error(e, ResourceKind::Guild, guild_id))?;

        Ok(emojis
            .into_iter()
            .map(|e| EmoteCatalogEntry {
                name: e.name,
                id: e.id.get(),
                animated: e.animated,
            })
            .collect())
    }

    async fn send_message(&self, channel_id: u64, content: &str) -> RelayResult<PublishedMessage> {
        let cid = ChannelId::from(nonzero(channel_id, ResourceKind::Channel)?);

        let sent = retry(self.retry, "send message", is_retryable, || {
            cid.say(&self.http, content)
        })
        .await
        .map_err(|e| map_lookup_error(e, ResourceKind::Channel, channel_id))?;

        Ok(PublishedMessage {
            id: sent.id.get(),
            channel_id,
            content: sent.content,
        })
    }
}
