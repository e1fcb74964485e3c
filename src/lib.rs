pub mod cache;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod db;
pub mod discord_text;
pub mod dispatch;
pub mod emote;
pub mod error;
pub mod llm;
pub mod mention;
pub mod persona;
pub mod platform;
pub mod responder;
pub mod retry;
pub mod scheduler;
pub mod store;

use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub responder: Arc<responder::Responder>,
    pub markers: cache::MarkerCache,
    /// Bot's own user ID, used to recognise mentions
    pub bot_id: u64,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
