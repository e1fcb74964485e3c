//! Storage contract used by the scheduler and the responder.
//!
//! Commands talk to [`crate::db::Database`] directly; the async paths go
//! through [`PersonaStore`] so blocking SQLite work stays off the runtime.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRegistration {
    pub guild_id: u64,
    pub channel_id: u64,
    pub created_at: String,
}

impl ChannelRegistration {
    /// Composite `guild:channel` key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.guild_id, self.channel_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaFact {
    pub id: i64,
    pub guild_id: u64,
    pub fact: String,
}

#[async_trait]
pub trait PersonaStore: Send + Sync {
    async fn registrations(&self) -> anyhow::Result<Vec<ChannelRegistration>>;

    async fn is_registered(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool>;

    /// Inserts the registration unless it exists; returns the stored row either way.
    async fn register(&self, guild_id: u64, channel_id: u64)
        -> anyhow::Result<ChannelRegistration>;

    async fn unregister(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool>;

    /// Facts of a guild in insertion order.
    async fn persona_facts(&self, guild_id: u64) -> anyhow::Result<Vec<PersonaFact>>;

    /// Drops every fact of the guild and inserts `facts` in one transaction.
    async fn replace_persona_facts(&self, guild_id: u64, facts: Vec<String>)
        -> anyhow::Result<usize>;
}
