//! Conversation assembly for the completion API.
//!
//! A request is described by [`AssembleRequest`], a plain configuration value
//! with optional parts. [`assemble`] turns it plus the fetched channel history
//! into the ordered message list; [`ConversationAssembler`] does the fetching.
//!
//! Ordering guarantee: the leading prompt is always first, the trailing prompt
//! always last, and everything in between is non-decreasing by timestamp, no
//! matter what order the platform returned history in.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::{RelayError, RelayResult};
use crate::platform::{ChannelMessage, ChatPlatform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the sequence sent to the completion API.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }
}

/// Where the history part of a conversation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSource {
    pub guild_id: u64,
    pub channel_id: u64,
    pub limit: usize,
    /// Only messages with an id strictly greater than this are kept.
    pub after: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct AssembleRequest {
    pub prompt: Option<String>,
    pub tail_prompt: Option<String>,
    pub reply_to: Option<ChannelMessage>,
    pub source: Option<ChannelSource>,
}

impl AssembleRequest {
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_tail_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.tail_prompt = Some(prompt.into());
        self
    }

    pub fn in_reply_to(mut self, message: ChannelMessage) -> Self {
        self.reply_to = Some(message);
        self
    }

    pub fn from_channel(mut self, guild_id: u64, channel_id: u64, limit: usize) -> Self {
        self.source = Some(ChannelSource {
            guild_id,
            channel_id,
            limit,
            after: self.source.and_then(|s| s.after),
        });
        self
    }

    /// Drops history at or before `message_id`. Has no effect without a channel source.
    pub fn after_message(mut self, message_id: Option<u64>) -> Self {
        if let Some(source) = self.source.as_mut() {
            source.after = message_id;
        }
        self
    }
}

/// Result of assembling a conversation.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub messages: Vec<ConversationMessage>,
    /// Highest message id that made it into the history part.
    pub newest_message_id: Option<u64>,
    /// History entries written by someone other than the bot itself.
    pub foreign_messages: usize,
}

/// Builds the ordered message list from a request and already fetched history.
pub fn assemble(
    request: &AssembleRequest,
    history: Vec<ChannelMessage>,
    now: DateTime<Utc>,
) -> RelayResult<Assembled> {
    if let Some(prompt) = &request.prompt {
        if prompt.trim().is_empty() {
            return Err(RelayError::InvalidInput("prompt must not be empty".to_string()));
        }
    }
    if let Some(tail) = &request.tail_prompt {
        if tail.trim().is_empty() {
            return Err(RelayError::InvalidInput("tail prompt must not be empty".to_string()));
        }
    }

    let after = request.source.and_then(|s| s.after);
    let mut history: Vec<ChannelMessage> = history
        .into_iter()
        .filter(|m| after.map_or(true, |marker| m.id > marker))
        .filter(|m| !m.content.trim().is_empty())
        .collect();

    if let Some(anchor) = &request.reply_to {
        if !anchor.content.trim().is_empty() && !history.iter().any(|m| m.id == anchor.id) {
            history.push(anchor.clone());
        }
    }

    history.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

    let newest_message_id = history.iter().map(|m| m.id).max();
    let foreign_messages = history.iter().filter(|m| !m.from_self).count();
    let last_timestamp = history.last().map(|m| m.timestamp);

    let mut messages = Vec::with_capacity(history.len() + 2);

    if let Some(prompt) = &request.prompt {
        messages.push(ConversationMessage::new(
            Role::System,
            prompt.clone(),
            DateTime::<Utc>::MIN_UTC,
        ));
    }

    messages.extend(
        history
            .into_iter()
            .map(|m| ConversationMessage::new(Role::User, m.content, m.timestamp)),
    );

    if let Some(tail) = &request.tail_prompt {
        let timestamp = last_timestamp.map_or(now, |last| last.max(now));
        messages.push(ConversationMessage::new(Role::System, tail.clone(), timestamp));
    }

    Ok(Assembled {
        messages,
        newest_message_id,
        foreign_messages,
    })
}

/// Fetches channel history from the platform and assembles the conversation.
pub struct ConversationAssembler {
    platform: Arc<dyn ChatPlatform>,
}

impl ConversationAssembler {
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Self {
        Self { platform }
    }

    /// Fails with `NotFound` when the source guild or channel cannot be resolved.
    pub async fn build(&self, request: &AssembleRequest) -> RelayResult<Assembled> {
        let history = match request.source {
            Some(source) => {
                self.platform
                    .text_channel(source.guild_id, source.channel_id)
                    .await?;
                self.platform
                    .recent_messages(source.channel_id, source.limit)
                    .await?
            }
            None => Vec::new(),
        };

        assemble(request, history, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::FakePlatform;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn msg(id: u64, secs: i64, content: &str) -> ChannelMessage {
        ChannelMessage {
            id,
            author_id: 7,
            author_name: "user".to_string(),
            content: content.to_string(),
            timestamp: at(secs),
            from_self: false,
        }
    }

    fn assert_ordered(messages: &[ConversationMessage]) {
        for pair in messages.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp, "out of order: {:?}", pair);
        }
    }

    #[test]
    fn test_unsorted_history_is_ordered_between_prompts() {
        let request = AssembleRequest::default()
            .with_tail_prompt("tail")
            .with_prompt("lead");
        let history = vec![msg(3, 30, "third"), msg(1, 10, "first"), msg(2, 20, "second")];

        let assembled = assemble(&request, history, at(100)).unwrap();
        let contents: Vec<_> = assembled.messages.iter().map(|m| m.content.as_str()).collect();

        assert_eq!(contents, vec!["lead", "first", "second", "third", "tail"]);
        assert_eq!(assembled.messages[0].role, Role::System);
        assert_eq!(assembled.messages[1].role, Role::User);
        assert_eq!(assembled.messages[4].role, Role::System);
        assert_eq!(assembled.newest_message_id, Some(3));
        assert_ordered(&assembled.messages);
    }

    #[test]
    fn test_tail_stays_last_when_history_is_in_the_future() {
        let request = AssembleRequest::default().with_prompt("lead").with_tail_prompt("tail");
        let history = vec![msg(1, 500, "from a skewed clock")];

        let assembled = assemble(&request, history, at(0)).unwrap();

        assert_eq!(assembled.messages.last().unwrap().content, "tail");
        assert_ordered(&assembled.messages);
    }

    #[test]
    fn test_reply_anchor_added_once() {
        let anchor = msg(9, 90, "hey @bot");
        let request = AssembleRequest::default().in_reply_to(anchor.clone());

        let without = assemble(&request, vec![msg(1, 10, "a")], at(100)).unwrap();
        assert_eq!(without.messages.len(), 2);
        assert_eq!(without.messages[1].content, "hey @bot");

        let with = assemble(&request, vec![msg(1, 10, "a"), anchor], at(100)).unwrap();
        assert_eq!(with.messages.len(), 2);
    }

    #[test]
    fn test_marker_filters_seen_history() {
        let request = AssembleRequest::default()
            .from_channel(1, 2, 20)
            .after_message(Some(5));
        let history = vec![msg(4, 4, "old"), msg(5, 5, "answered"), msg(6, 6, "new")];

        let assembled = assemble(&request, history, at(100)).unwrap();

        assert_eq!(assembled.messages.len(), 1);
        assert_eq!(assembled.messages[0].content, "new");
        assert_eq!(assembled.newest_message_id, Some(6));
    }

    #[test]
    fn test_empty_and_self_messages() {
        let mut own = msg(3, 3, "my last take");
        own.from_self = true;
        let history = vec![msg(1, 1, "   "), msg(2, 2, "hello"), own];

        let assembled = assemble(&AssembleRequest::default(), history, at(100)).unwrap();

        assert_eq!(assembled.messages.len(), 2);
        assert_eq!(assembled.foreign_messages, 1);
    }

    #[test]
    fn test_blank_prompt_rejected() {
        let request = AssembleRequest::default().with_prompt("  ");
        let result = assemble(&request, Vec::new(), at(0));
        assert!(matches!(result, Err(RelayError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_build_fetches_channel_history() {
        let platform = Arc::new(FakePlatform::new());
        platform.add_channel(1, 2);
        platform.push_message(2, msg(11, 11, "one"));
        platform.push_message(2, msg(12, 12, "two"));

        let assembler = ConversationAssembler::new(platform.clone());
        let request = AssembleRequest::default()
            .with_prompt("lead")
            .from_channel(1, 2, 20);

        let assembled = assembler.build(&request).await.unwrap();
        assert_eq!(assembled.messages.len(), 3);
        assert_eq!(assembled.newest_message_id, Some(12));
    }

    #[tokio::test]
    async fn test_build_reports_missing_channel() {
        let platform = Arc::new(FakePlatform::new());
        platform.add_channel(1, 2);

        let assembler = ConversationAssembler::new(platform);
        let request = AssembleRequest::default().from_channel(1, 99, 20);

        let err = assembler.build(&request).await.unwrap_err();
        assert_eq!(err.missing_resource(), Some(crate::error::ResourceKind::Channel));
    }
}
