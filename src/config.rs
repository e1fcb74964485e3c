use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::persona::DEFAULT_PERSONA_NAME;
use crate::retry::RetryPolicy;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub llm_api_key: String,
    pub llm_url: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub upstream_retry_attempts: u32,
    pub upstream_retry_base_ms: u64,
    pub database_url: String,
    pub persona_name: String,
    pub context_message_limit: usize,
    pub status_message: String,

    // Emotes
    pub emote_master_guild_id: Option<u64>,
    pub emote_cache_ttl_secs: u64,

    // Autonomous posting
    pub marker_cache_capacity: usize,
    pub scheduler_config: PathBuf,
    pub scheduler_interval: Duration,
    pub scheduler_chance: u32,
    pub sleep_start: String,
    pub sleep_end: String,
}

const DEFAULT_SCHEDULER_INTERVAL: Duration = Duration::from_secs(600);

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn required_env(key: &str) -> anyhow::Result<String> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("{} must be set", key))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: required_env("DISCORD_TOKEN")?,
            llm_api_key: required_env("LLM_API_KEY")?,
            llm_url: env::var("LLM_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string()),
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS", 120),
            upstream_retry_attempts: parse_env("UPSTREAM_RETRY_ATTEMPTS", 3),
            upstream_retry_base_ms: parse_env("UPSTREAM_RETRY_BASE_MS", 1000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/persona_relay.db".to_string()),
            persona_name: env::var("PERSONA_NAME")
                .ok()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PERSONA_NAME.to_string()),
            context_message_limit: parse_env("CONTEXT_MESSAGE_LIMIT", 20usize).clamp(1, 100),
            status_message: env::var("STATUS_MESSAGE").unwrap_or_else(|_| "Lurking".to_string()),
            emote_master_guild_id: env::var("EMOTE_MASTER_GUILD_ID")
                .ok()
                .and_then(|id| id.parse().ok()),
            emote_cache_ttl_secs: parse_env("EMOTE_CACHE_TTL_SECS", 3600),
            marker_cache_capacity: parse_env("MARKER_CACHE_CAPACITY", 1000),
            scheduler_config: env::var("SCHEDULER_CONFIG")
                .unwrap_or_else(|_| "scheduler.toml".to_string())
                .into(),
            scheduler_interval: env::var("SCHEDULER_INTERVAL")
                .ok()
                .and_then(|value| humantime::parse_duration(value.trim()).ok())
                .unwrap_or(DEFAULT_SCHEDULER_INTERVAL),
            scheduler_chance: parse_env("SCHEDULER_CHANCE", 30u32).min(100),
            sleep_start: env::var("SLEEP_START").unwrap_or_else(|_| "22:00".to_string()),
            sleep_end: env::var("SLEEP_END").unwrap_or_else(|_| "09:00".to_string()),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.upstream_retry_attempts,
            Duration::from_millis(self.upstream_retry_base_ms),
        )
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("llm_api_key", &"[REDACTED]")
            .field("llm_url", &self.llm_url)
            .field("llm_model", &self.llm_model)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("upstream_retry_attempts", &self.upstream_retry_attempts)
            .field("upstream_retry_base_ms", &self.upstream_retry_base_ms)
            .field("database_url", &self.database_url)
            .field("persona_name", &self.persona_name)
            .field("context_message_limit", &self.context_message_limit)
            .field("status_message", &self.status_message)
            .field("emote_master_guild_id", &self.emote_master_guild_id)
            .field("emote_cache_ttl_secs", &self.emote_cache_ttl_secs)
            .field("marker_cache_capacity", &self.marker_cache_capacity)
            .field("scheduler_config", &self.scheduler_config)
            .field("scheduler_interval", &self.scheduler_interval)
            .field("scheduler_chance", &self.scheduler_chance)
            .field("sleep_start", &self.sleep_start)
            .field("sleep_end", &self.sleep_end)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
/// Embed description limit is 4096 characters
pub const DISCORD_EMBED_LIMIT: usize = 4096;
