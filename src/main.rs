use arc_swap::ArcSwap;
use persona_relay::cache::MarkerCache;
use persona_relay::config::Config;
use persona_relay::db::Database;
use persona_relay::dispatch::ResponseDispatcher;
use persona_relay::emote::{EmoteCatalog, EmotePostProcessor};
use persona_relay::llm::{CompletionClient, LlmClient};
use persona_relay::mention::handle_mention;
use persona_relay::platform::{ChatPlatform, SerenityPlatform};
use persona_relay::responder::Responder;
use persona_relay::scheduler::watch::watch_settings;
use persona_relay::scheduler::{AutonomousPostingScheduler, SchedulerSettings};
use persona_relay::{commands, Data};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration: {:?}", config);
    let discord_token = config.discord_token.clone();

    let db = Database::new(&config)?;
    db.execute_init()?;

    let http = Arc::new(serenity::Http::new(&discord_token));
    let me = http
        .get_current_user()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to authenticate with Discord: {}", e))?;
    let bot_id = me.id.get();
    let bot_name = me.name.clone();
    info!("Authenticated as {} ({})", bot_name, bot_id);

    let platform: Arc<dyn ChatPlatform> = Arc::new(SerenityPlatform::new(
        http.clone(),
        bot_id,
        config.retry_policy(),
    ));
    let completion: Arc<dyn CompletionClient> = Arc::new(LlmClient::new(&config)?);
    let catalog = EmoteCatalog::new(
        platform.clone(),
        config.emote_master_guild_id,
        Duration::from_secs(config.emote_cache_ttl_secs),
    );
    let dispatcher = ResponseDispatcher::new(
        completion,
        platform.clone(),
        EmotePostProcessor::new(catalog, bot_name),
    );
    let responder = Arc::new(Responder::new(
        Arc::new(db.clone()),
        platform,
        dispatcher,
        config.persona_name.clone(),
        config.context_message_limit,
    ));
    let markers = MarkerCache::new(config.marker_cache_capacity);

    // Scheduler settings: env defaults, overridden by the watched file
    let base_settings = SchedulerSettings::from_config(&config)?;
    let initial = SchedulerSettings::load(&base_settings, &config.scheduler_config).unwrap_or_else(|e| {
        warn!("Ignoring {:?}: {}", config.scheduler_config, e);
        base_settings.clone()
    });
    let settings = Arc::new(ArcSwap::from_pointee(initial));
    let _settings_watcher =
        match watch_settings(config.scheduler_config.clone(), base_settings, settings.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Scheduler settings will not hot-reload: {}", e);
                None
            }
        };

    let scheduler = Arc::new(AutonomousPostingScheduler::new(
        responder.clone(),
        markers.clone(),
        settings,
    ));
    let scheduler_handle = scheduler.spawn();

    let status_message = config.status_message.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    if let serenity::FullEvent::Message { new_message } = event {
                        if !new_message.author.bot
                            && new_message.mentions_user_id(serenity::UserId::new(data.bot_id))
                        {
                            if let Err(e) = handle_mention(ctx, new_message, data).await {
                                error!("Error handling mention: {}", e);
                            }
                        }
                    }
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&status_message)));

                Ok(Data {
                    config,
                    db,
                    responder,
                    markers,
                    bot_id,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutting down...");
        scheduler_handle.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
