use crate::platform::accepts_messages;
use crate::{Context, Error};
use tracing::info;

/// Let the bot post in this channel on its own
#[poise::command(slash_command, required_permissions = "MANAGE_CHANNELS", guild_only)]
pub async fn register(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    let channel_id = ctx.channel_id().get();
    let store = ctx.data().responder.store();

    let postable = ctx
        .guild_channel()
        .await
        .is_some_and(|channel| accepts_messages(channel.kind));
    if !postable {
        ctx.say("❌ I can only chat in text channels, announcement channels and threads.")
            .await?;
        return Ok(());
    }

    if store.is_registered(guild_id, channel_id).await? {
        ctx.say("ℹ️ This channel is already registered.").await?;
        return Ok(());
    }

    let registration = store.register(guild_id, channel_id).await?;
    info!("Channel {} registered by {}", registration.key(), ctx.author().name);
    ctx.say("✅ Registered. I'll chime in here from time to time.")
        .await?;
    Ok(())
}

/// Stop the bot from posting in this channel
#[poise::command(slash_command, required_permissions = "MANAGE_CHANNELS", guild_only)]
pub async fn unregister(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    let channel_id = ctx.channel_id().get();

    if ctx
        .data()
        .responder
        .store()
        .unregister(guild_id, channel_id)
        .await?
    {
        ctx.data().markers.forget(guild_id, channel_id);
        info!("Channel {}:{} unregistered by {}", guild_id, channel_id, ctx.author().name);
        ctx.say("✅ Unregistered. I'll stay quiet here.").await?;
    } else {
        ctx.say("ℹ️ This channel was not registered.").await?;
    }
    Ok(())
}
