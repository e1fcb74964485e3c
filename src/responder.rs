//! Glue between the persona store, the assembler and the dispatcher.
//!
//! Both the scheduler and the mention handler end up here; they differ only
//! in the trailing prompt, the reply anchor and how they treat the marker.

use std::sync::Arc;
use tracing::{debug, info};

use crate::conversation::{AssembleRequest, ConversationAssembler};
use crate::dispatch::{DispatchOutcome, ResponseDispatcher};
use crate::error::{RelayError, RelayResult, ResourceKind};
use crate::persona::{build_persona_prompt, channel_tail_prompt, default_facts, reply_tail_prompt};
use crate::platform::{ChannelMessage, ChatPlatform, PublishedMessage};
use crate::store::PersonaStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome {
    /// Nothing written by anyone else since the marker.
    NothingNew,
    Responded {
        newest_message_id: Option<u64>,
        message: PublishedMessage,
    },
    NoResponse {
        reason: String,
    },
}

pub struct Responder {
    store: Arc<dyn PersonaStore>,
    assembler: ConversationAssembler,
    dispatcher: ResponseDispatcher,
    persona_name: String,
    history_limit: usize,
}

impl Responder {
    pub fn new(
        store: Arc<dyn PersonaStore>,
        platform: Arc<dyn ChatPlatform>,
        dispatcher: ResponseDispatcher,
        persona_name: impl Into<String>,
        history_limit: usize,
    ) -> Self {
        Self {
            store,
            assembler: ConversationAssembler::new(platform),
            dispatcher,
            persona_name: persona_name.into(),
            history_limit,
        }
    }

    pub fn store(&self) -> &Arc<dyn PersonaStore> {
        &self.store
    }

    /// Fails with `NotFound(PersonaFacts)` when the guild has no facts configured.
    pub async fn persona_prompt(&self, guild_id: u64) -> RelayResult<String> {
        let facts: Vec<String> = self
            .store
            .persona_facts(guild_id)
            .await?
            .into_iter()
            .map(|f| f.fact)
            .collect();

        if facts.is_empty() {
            return Err(RelayError::not_found(ResourceKind::PersonaFacts, guild_id));
        }

        Ok(build_persona_prompt(&self.persona_name, &facts))
    }

    /// Seeds the guild with the default fact set, replacing whatever it had.
    pub async fn reset_persona_facts(&self, guild_id: u64) -> RelayResult<usize> {
        let count = self
            .store
            .replace_persona_facts(guild_id, default_facts())
            .await?;
        info!(guild_id, "Seeded {} default persona facts", count);
        Ok(count)
    }

    /// Unprompted message for a channel, built from history newer than `after`.
    pub async fn respond_to_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
        after: Option<u64>,
    ) -> RelayResult<ChannelOutcome> {
        let prompt = self.persona_prompt(guild_id).await?;
        let request = AssembleRequest::default()
            .with_prompt(prompt)
            .with_tail_prompt(channel_tail_prompt(&self.persona_name))
            .from_channel(guild_id, channel_id, self.history_limit)
            .after_message(after);

        let assembled = self.assembler.build(&request).await?;
        if assembled.foreign_messages == 0 {
            debug!(guild_id, channel_id, "No new messages since last response");
            return Ok(ChannelOutcome::NothingNew);
        }

        let outcome = match self
            .dispatcher
            .send(guild_id, channel_id, &assembled.messages)
            .await
        {
            DispatchOutcome::Published(message) => ChannelOutcome::Responded {
                newest_message_id: assembled.newest_message_id,
                message,
            },
            DispatchOutcome::NoResponse { reason } => ChannelOutcome::NoResponse { reason },
        };
        Ok(outcome)
    }

    /// Reply to a message that mentioned the bot.
    pub async fn respond_to_mention(
        &self,
        guild_id: u64,
        channel_id: u64,
        anchor: ChannelMessage,
    ) -> RelayResult<Option<PublishedMessage>> {
        let prompt = self.persona_prompt(guild_id).await?;
        let request = AssembleRequest::default()
            .with_prompt(prompt)
            .with_tail_prompt(reply_tail_prompt(&self.persona_name))
            .from_channel(guild_id, channel_id, self.history_limit)
            .in_reply_to(anchor);

        let assembled = self.assembler.build(&request).await?;
        let outcome = self
            .dispatcher
            .send(guild_id, channel_id, &assembled.messages)
            .await;

        Ok(outcome.published().cloned())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::db::Database;
    use crate::emote::{EmoteCatalog, EmotePostProcessor};
    use crate::llm::client::testing::FakeCompletion;
    use crate::platform::testing::FakePlatform;
    use std::time::Duration;

    pub fn memory_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    pub fn responder(
        db: &Database,
        platform: Arc<FakePlatform>,
        completion: Arc<FakeCompletion>,
    ) -> Responder {
        let catalog = EmoteCatalog::new(platform.clone(), None, Duration::from_secs(3600));
        let dispatcher = ResponseDispatcher::new(
            completion,
            platform.clone(),
            EmotePostProcessor::new(catalog, "Alex"),
        );
        Responder::new(Arc::new(db.clone()), platform, dispatcher, "Alex", 20)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{memory_db, responder};
    use super::*;
    use crate::llm::client::testing::FakeCompletion;
    use crate::platform::testing::FakePlatform;
    use chrono::{TimeZone, Utc};

    fn msg(id: u64, content: &str, from_self: bool) -> ChannelMessage {
        ChannelMessage {
            id,
            author_id: if from_self { 1 } else { 2 },
            author_name: "someone".to_string(),
            content: content.to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
            from_self,
        }
    }

    fn seeded(db: &crate::db::Database, guild_id: u64) {
        db.add_persona_facts(guild_id, &["You like trains.".to_string()])
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_facts_is_not_found() {
        let db = memory_db();
        let platform = Arc::new(FakePlatform::new());
        platform.add_channel(1, 2);
        platform.push_message(2, msg(10, "hi", false));
        let completion = Arc::new(FakeCompletion::replying("hey"));
        let responder = responder(&db, platform, completion.clone());

        let err = responder.respond_to_channel(1, 2, None).await.unwrap_err();

        assert_eq!(err.missing_resource(), Some(ResourceKind::PersonaFacts));
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_response_reports_newest_id() {
        let db = memory_db();
        seeded(&db, 1);
        let platform = Arc::new(FakePlatform::new());
        platform.add_channel(1, 2);
        platform.set_emotes(1, Vec::new());
        platform.push_message(2, msg(10, "old", false));
        platform.push_message(2, msg(11, "new one", false));
        let completion = Arc::new(FakeCompletion::replying("nah"));
        let responder = responder(&db, platform, completion.clone());

        let outcome = responder.respond_to_channel(1, 2, Some(10)).await.unwrap();

        match outcome {
            ChannelOutcome::Responded {
                newest_message_id,
                message,
            } => {
                assert_eq!(newest_message_id, Some(11));
                assert_eq!(message.content, "nah");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(completion.last_request().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_only_own_messages_is_nothing_new() {
        let db = memory_db();
        seeded(&db, 1);
        let platform = Arc::new(FakePlatform::new());
        platform.add_channel(1, 2);
        platform.push_message(2, msg(10, "answered", false));
        platform.push_message(2, msg(11, "my own take", true));
        let completion = Arc::new(FakeCompletion::replying("hey"));
        let responder = responder(&db, platform, completion.clone());

        let outcome = responder.respond_to_channel(1, 2, Some(10)).await.unwrap();

        assert_eq!(outcome, ChannelOutcome::NothingNew);
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mention_reply_includes_anchor() {
        let db = memory_db();
        seeded(&db, 1);
        let platform = Arc::new(FakePlatform::new());
        platform.add_channel(1, 2);
        platform.set_emotes(1, Vec::new());
        platform.push_message(2, msg(10, "earlier", false));
        let completion = Arc::new(FakeCompletion::replying("what"));
        let responder = responder(&db, platform.clone(), completion.clone());

        let published = responder
            .respond_to_mention(1, 2, msg(12, "@Alex thoughts?", false))
            .await
            .unwrap();

        assert!(published.is_some());
        let request = completion.last_request().unwrap();
        assert_eq!(request.len(), 4);
        assert_eq!(request[2].content, "@Alex thoughts?");
    }

    #[tokio::test]
    async fn test_reset_seeds_defaults() {
        let db = memory_db();
        seeded(&db, 1);
        let platform = Arc::new(FakePlatform::new());
        let responder = responder(&db, platform, Arc::new(FakeCompletion::replying("x")));

        let count = responder.reset_persona_facts(1).await.unwrap();

        assert_eq!(count, crate::persona::DEFAULT_FACTS.len());
        let prompt = responder.persona_prompt(1).await.unwrap();
        assert!(!prompt.contains("You like trains."));
    }
}
