use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::conversation::ConversationMessage;
use crate::discord_text::truncate_for_discord;
use crate::emote::EmotePostProcessor;
use crate::llm::CompletionClient;
use crate::platform::{ChatPlatform, PublishedMessage};

/// What a dispatch produced. Failures never escape as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Published(PublishedMessage),
    NoResponse { reason: String },
}

impl DispatchOutcome {
    pub fn published(&self) -> Option<&PublishedMessage> {
        match self {
            DispatchOutcome::Published(message) => Some(message),
            DispatchOutcome::NoResponse { .. } => None,
        }
    }

    fn none(reason: impl Into<String>) -> Self {
        DispatchOutcome::NoResponse {
            reason: reason.into(),
        }
    }
}

/// Completion API call, post-processing and publish, in that order.
pub struct ResponseDispatcher {
    completion: Arc<dyn CompletionClient>,
    platform: Arc<dyn ChatPlatform>,
    formatter: EmotePostProcessor,
}

impl ResponseDispatcher {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        platform: Arc<dyn ChatPlatform>,
        formatter: EmotePostProcessor,
    ) -> Self {
        Self {
            completion,
            platform,
            formatter,
        }
    }

    pub async fn send(
        &self,
        guild_id: u64,
        channel_id: u64,
        messages: &[ConversationMessage],
    ) -> DispatchOutcome {
        let raw = match self.completion.complete(messages).await {
            Ok(text) => text,
            Err(e) => {
                error!(guild_id, channel_id, "Completion failed: {}", e);
                return DispatchOutcome::none(e.to_string());
            }
        };

        let text = match self.formatter.format(guild_id, &raw).await {
            Ok(formatted) => formatted.text,
            Err(e) => {
                warn!(guild_id, "Emote catalog unavailable, sending without emotes: {}", e);
                self.formatter.clean(&raw)
            }
        };

        let text = text.trim();
        if text.is_empty() {
            warn!(guild_id, channel_id, "Completion was empty after cleanup: {:?}", raw);
            return DispatchOutcome::none("completion was empty after cleanup");
        }

        let text = truncate_for_discord(text, DISCORD_MESSAGE_LIMIT);
        match self.platform.send_message(channel_id, &text).await {
            Ok(published) => {
                info!(guild_id, channel_id, message_id = published.id, "Published reply");
                DispatchOutcome::Published(published)
            }
            Err(e) => {
                error!(guild_id, channel_id, "Failed to publish reply: {}", e);
                DispatchOutcome::none(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emote::EmoteCatalog;
    use crate::llm::client::testing::FakeCompletion;
    use crate::platform::testing::FakePlatform;
    use crate::platform::EmoteCatalogEntry;
    use chrono::Utc;
    use std::time::Duration;

    fn dispatcher(completion: Arc<FakeCompletion>, platform: Arc<FakePlatform>) -> ResponseDispatcher {
        let catalog = EmoteCatalog::new(platform.clone(), None, Duration::from_secs(3600));
        ResponseDispatcher::new(completion, platform, EmotePostProcessor::new(catalog, "Alex"))
    }

    fn conversation() -> Vec<ConversationMessage> {
        vec![ConversationMessage::new(
            crate::conversation::Role::User,
            "anyone up",
            Utc::now(),
        )]
    }

    #[tokio::test]
    async fn test_publishes_formatted_reply() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_emotes(
            1,
            vec![EmoteCatalogEntry {
                name: "kekw".to_string(),
                id: 123,
                animated: true,
            }],
        );
        let completion = Arc::new(FakeCompletion::replying("\"Alex: lmao :kekw:\""));
        let dispatcher = dispatcher(completion.clone(), platform.clone());

        let outcome = dispatcher.send(1, 2, &conversation()).await;

        let published = outcome.published().unwrap();
        assert_eq!(published.content, "lmao <a:kekw:123>");
        assert_eq!(published.channel_id, 2);
        assert_eq!(completion.call_count(), 1);
        assert_eq!(platform.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_completion_failure_is_no_response() {
        let platform = Arc::new(FakePlatform::new());
        let completion = Arc::new(FakeCompletion::failing("502 bad gateway"));
        let dispatcher = dispatcher(completion, platform.clone());

        let outcome = dispatcher.send(1, 2, &conversation()).await;

        match outcome {
            DispatchOutcome::NoResponse { reason } => assert!(reason.contains("502")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(platform.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_reply_empty_after_cleanup_is_not_sent() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_emotes(1, Vec::new());
        let completion = Arc::new(FakeCompletion::replying("\"Alex: 1234567890\""));
        let dispatcher = dispatcher(completion, platform.clone());

        let outcome = dispatcher.send(1, 2, &conversation()).await;

        assert!(outcome.published().is_none());
        assert!(platform.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_missing_catalog_still_publishes() {
        let platform = Arc::new(FakePlatform::new());
        let completion = Arc::new(FakeCompletion::replying("\"no emotes :kekw:\""));
        let dispatcher = dispatcher(completion, platform.clone());

        let outcome = dispatcher.send(1, 2, &conversation()).await;

        assert_eq!(outcome.published().unwrap().content, "no emotes :kekw:");
    }

    #[tokio::test]
    async fn test_long_reply_is_truncated() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_emotes(1, Vec::new());
        let long = "a".repeat(DISCORD_MESSAGE_LIMIT + 50);
        let completion = Arc::new(FakeCompletion::replying(&long));
        let dispatcher = dispatcher(completion, platform.clone());

        let outcome = dispatcher.send(1, 2, &conversation()).await;

        assert_eq!(
            outcome.published().unwrap().content.chars().count(),
            DISCORD_MESSAGE_LIMIT
        );
    }

    #[tokio::test]
    async fn test_publish_failure_is_no_response() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_emotes(1, Vec::new());
        *platform.fail_sends.lock().unwrap() = true;
        let completion = Arc::new(FakeCompletion::replying("hello"));
        let dispatcher = dispatcher(completion, platform);

        let outcome = dispatcher.send(1, 2, &conversation()).await;

        assert!(matches!(outcome, DispatchOutcome::NoResponse { .. }));
    }
}
