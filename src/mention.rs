use poise::serenity_prelude as serenity;
use tracing::{error, info, warn};

use crate::discord_text::clean_content;
use crate::error::{RelayResult, ResourceKind};
use crate::platform::{snowflake_timestamp, ChannelMessage, PublishedMessage};
use crate::responder::Responder;
use crate::{Data, Error};

const PERSONA_RESEEDED_NOTICE: &str = "I didn't have a persona set up for this server yet, \
so I loaded the default one. Mention me again!";

#[derive(Debug, Clone, PartialEq)]
pub enum MentionOutcome {
    NotRegistered,
    Replied(PublishedMessage),
    NoReply,
    /// The guild had no persona facts; defaults were loaded instead of replying.
    Reseeded,
}

/// Answers a mention in a registered channel, healing a guild without persona facts.
pub async fn answer_mention(
    responder: &Responder,
    guild_id: u64,
    channel_id: u64,
    anchor: ChannelMessage,
) -> RelayResult<MentionOutcome> {
    if !responder.store().is_registered(guild_id, channel_id).await? {
        warn!(guild_id, channel_id, "Mentioned in an unregistered channel, ignoring");
        return Ok(MentionOutcome::NotRegistered);
    }

    match responder
        .respond_to_mention(guild_id, channel_id, anchor)
        .await
    {
        Ok(Some(published)) => Ok(MentionOutcome::Replied(published)),
        Ok(None) => Ok(MentionOutcome::NoReply),
        Err(e) if e.missing_resource() == Some(ResourceKind::PersonaFacts) => {
            warn!(guild_id, "Mentioned without persona facts, reseeding defaults");
            responder.reset_persona_facts(guild_id).await?;
            Ok(MentionOutcome::Reseeded)
        }
        Err(e) => Err(e),
    }
}

/// Handle a message where the bot is mentioned/tagged.
pub async fn handle_mention(
    ctx: &serenity::Context,
    new_message: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    if new_message.author.bot {
        return Ok(());
    }
    let Some(guild_id) = new_message.guild_id.map(|id| id.get()) else {
        return Ok(());
    };
    let channel_id = new_message.channel_id.get();

    info!(
        "Handling mention from {} in channel {}",
        new_message.author.name, channel_id
    );

    let anchor = ChannelMessage {
        id: new_message.id.get(),
        author_id: new_message.author.id.get(),
        author_name: new_message.author.name.clone(),
        content: clean_content(new_message),
        timestamp: snowflake_timestamp(new_message.id.get()),
        from_self: false,
    };

    let typing = new_message.channel_id.start_typing(&ctx.http);
    let outcome = answer_mention(&data.responder, guild_id, channel_id, anchor).await;
    drop(typing);

    match outcome {
        Ok(MentionOutcome::Reseeded) => {
            new_message.reply(ctx, PERSONA_RESEEDED_NOTICE).await?;
        }
        Ok(MentionOutcome::NoReply) => {
            warn!(guild_id, channel_id, "Mention produced no reply");
        }
        Ok(_) => {}
        Err(e) => {
            error!(guild_id, channel_id, "Failed to answer mention: {}", e);
        }
    }

    Ok(())
}
