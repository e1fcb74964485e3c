use crate::config::DISCORD_EMBED_LIMIT;
use crate::discord_text::truncate_for_discord;
use crate::store::PersonaFact;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Manage the persona facts for this server
#[poise::command(
    slash_command,
    subcommands("list", "add", "update", "delete", "reset"),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn facts(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// One `#id fact` line per fact, in id order.
pub fn render_facts(facts: &[PersonaFact]) -> String {
    facts
        .iter()
        .map(|f| format!("`#{}` {}", f.id, f.fact))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Looks up a fact and checks it belongs to the guild.
fn guild_fact(ctx: &Context<'_>, guild_id: u64, id: i64) -> Result<Option<PersonaFact>, Error> {
    let fact = ctx.data().db.get_persona_fact(id)?;
    Ok(fact.filter(|f| f.guild_id == guild_id))
}

/// Show the persona facts
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    let facts = ctx.data().db.list_persona_facts(guild_id)?;

    if facts.is_empty() {
        ctx.say("📭 No persona facts yet. Use `/facts add` or `/facts reset`.")
            .await?;
        return Ok(());
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!("🎭 {}", ctx.data().config.persona_name))
        .description(truncate_for_discord(&render_facts(&facts), DISCORD_EMBED_LIMIT))
        .footer(serenity::CreateEmbedFooter::new(format!("{} facts", facts.len())))
        .color(0x5865F2);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Add a persona fact
#[poise::command(slash_command)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Something the persona believes or does"] fact: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    let fact = fact.trim();
    if fact.is_empty() {
        ctx.say("❌ Fact cannot be empty.").await?;
        return Ok(());
    }

    let stored = ctx.data().db.add_persona_fact(guild_id, fact)?;
    ctx.say(format!("✅ Added fact `#{}`.", stored.id)).await?;
    Ok(())
}

/// Change the text of a persona fact
#[poise::command(slash_command)]
pub async fn update(
    ctx: Context<'_>,
    #[description = "Fact id from /facts list"] id: i64,
    #[description = "New text"] fact: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    let fact = fact.trim();
    if fact.is_empty() {
        ctx.say("❌ Fact cannot be empty.").await?;
        return Ok(());
    }

    if guild_fact(&ctx, guild_id, id)?.is_none() {
        ctx.say(format!("❌ No fact `#{}` in this server.", id)).await?;
        return Ok(());
    }

    ctx.data().db.update_persona_fact(id, fact)?;
    ctx.say(format!("✅ Updated fact `#{}`.", id)).await?;
    Ok(())
}

/// Delete a persona fact
#[poise::command(slash_command)]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Fact id from /facts list"] id: i64,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();

    if guild_fact(&ctx, guild_id, id)?.is_none() {
        ctx.say(format!("❌ No fact `#{}` in this server.", id)).await?;
        return Ok(());
    }

    ctx.data().db.delete_persona_fact(id)?;
    ctx.say(format!("✅ Deleted fact `#{}`.", id)).await?;
    Ok(())
}

/// Replace all persona facts with the defaults
#[poise::command(slash_command)]
pub async fn reset(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    ctx.defer().await?;

    let count = ctx.data().responder.reset_persona_facts(guild_id).await?;
    info!("Persona facts of guild {} reset by {}", guild_id, ctx.author().name);
    ctx.say(format!("✅ Restored the {} default facts.", count))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_facts() {
        let facts = vec![
            PersonaFact {
                id: 3,
                guild_id: 1,
                fact: "You like trains.".to_string(),
            },
            PersonaFact {
                id: 7,
                guild_id: 1,
                fact: "You hate mondays.".to_string(),
            },
        ];
        assert_eq!(
            render_facts(&facts),
            "`#3` You like trains.\n`#7` You hate mondays."
        );
    }
}
