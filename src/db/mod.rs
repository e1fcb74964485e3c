pub mod schema;

use anyhow::anyhow;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::Config;
use crate::store::{ChannelRegistration, PersonaFact, PersonaStore};

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

fn registration_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRegistration> {
    Ok(ChannelRegistration {
        guild_id: row.get(0)?,
        channel_id: row.get(1)?,
        created_at: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
    })
}

fn fact_from_row(row: &Row<'_>) -> rusqlite::Result<PersonaFact> {
    Ok(PersonaFact {
        id: row.get(0)?,
        guild_id: row.get(1)?,
        fact: row.get(2)?,
    })
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        if config.database_url != ":memory:" {
            if let Some(parent) = Path::new(&config.database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        self.lock()?.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Runs blocking database work on the blocking thread pool.
    pub async fn run_blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub fn add_channel_registration(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> anyhow::Result<ChannelRegistration> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO channel_registrations (guild_id, channel_id) VALUES (?1, ?2)",
            (guild_id, channel_id),
        )?;
        if inserted > 0 {
            info!("Database: Registered channel {} in guild {}", channel_id, guild_id);
        }

        let registration = conn.query_row(
            "SELECT guild_id, channel_id, created_at FROM channel_registrations
             WHERE guild_id = ?1 AND channel_id = ?2",
            (guild_id, channel_id),
            registration_from_row,
        )?;
        Ok(registration)
    }

    pub fn remove_channel_registration(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool> {
        let removed = self.lock()?.execute(
            "DELETE FROM channel_registrations WHERE guild_id = ?1 AND channel_id = ?2",
            (guild_id, channel_id),
        )?;
        Ok(removed > 0)
    }

    pub fn get_channel_registration(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> anyhow::Result<Option<ChannelRegistration>> {
        let registration = self
            .lock()?
            .query_row(
                "SELECT guild_id, channel_id, created_at FROM channel_registrations
                 WHERE guild_id = ?1 AND channel_id = ?2",
                (guild_id, channel_id),
                registration_from_row,
            )
            .optional()?;
        Ok(registration)
    }

    pub fn is_channel_registered(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool> {
        Ok(self.get_channel_registration(guild_id, channel_id)?.is_some())
    }

    pub fn list_channel_registrations(&self) -> anyhow::Result<Vec<ChannelRegistration>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT guild_id, channel_id, created_at FROM channel_registrations
             ORDER BY guild_id, channel_id",
        )?;
        let rows = stmt.query_map([], registration_from_row)?;

        let mut registrations = Vec::new();
        for row in rows {
            registrations.push(row?);
        }
        Ok(registrations)
    }

    pub fn get_persona_fact(&self, id: i64) -> anyhow::Result<Option<PersonaFact>> {
        let fact = self
            .lock()?
            .query_row(
                "SELECT id, guild_id, fact FROM persona_facts WHERE id = ?1",
                [id],
                fact_from_row,
            )
            .optional()?;
        Ok(fact)
    }

    pub fn list_persona_facts(&self, guild_id: u64) -> anyhow::Result<Vec<PersonaFact>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, guild_id, fact FROM persona_facts WHERE guild_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map([guild_id], fact_from_row)?;

        let mut facts = Vec::new();
        for row in rows {
            facts.push(row?);
        }
        Ok(facts)
    }

    pub fn add_persona_fact(&self, guild_id: u64, fact: &str) -> anyhow::Result<PersonaFact> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO persona_facts (guild_id, fact) VALUES (?1, ?2)",
            (guild_id, fact),
        )?;
        Ok(PersonaFact {
            id: conn.last_insert_rowid(),
            guild_id,
            fact: fact.to_string(),
        })
    }

    pub fn update_persona_fact(&self, id: i64, fact: &str) -> anyhow::Result<bool> {
        let updated = self
            .lock()?
            .execute("UPDATE persona_facts SET fact = ?1 WHERE id = ?2", (fact, id))?;
        Ok(updated > 0)
    }

    pub fn delete_persona_fact(&self, id: i64) -> anyhow::Result<bool> {
        let deleted = self
            .lock()?
            .execute("DELETE FROM persona_facts WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    pub fn delete_persona_facts(&self, guild_id: u64) -> anyhow::Result<usize> {
        let deleted = self
            .lock()?
            .execute("DELETE FROM persona_facts WHERE guild_id = ?1", [guild_id])?;
        Ok(deleted)
    }

    pub fn add_persona_facts(&self, guild_id: u64, facts: &[String]) -> anyhow::Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO persona_facts (guild_id, fact) VALUES (?1, ?2)")?;
            for fact in facts {
                stmt.execute((guild_id, fact))?;
            }
        }
        tx.commit()?;
        Ok(facts.len())
    }

    /// Replaces the guild's fact list atomically.
    pub fn replace_persona_facts(&self, guild_id: u64, facts: &[String]) -> anyhow::Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM persona_facts WHERE guild_id = ?1", [guild_id])?;
        {
            let mut stmt = tx.prepare("INSERT INTO persona_facts (guild_id, fact) VALUES (?1, ?2)")?;
            for fact in facts {
                stmt.execute((guild_id, fact))?;
            }
        }
        tx.commit()?;

        debug!(
            "Database: Replaced {} facts with {} for guild {}",
            removed,
            facts.len(),
            guild_id
        );
        Ok(facts.len())
    }
}

#[async_trait]
impl PersonaStore for Database {
    async fn registrations(&self) -> anyhow::Result<Vec<ChannelRegistration>> {
        self.run_blocking(|db| db.list_channel_registrations()).await
    }

    async fn is_registered(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool> {
        self.run_blocking(move |db| db.is_channel_registered(guild_id, channel_id))
            .await
    }

    async fn register(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> anyhow::Result<ChannelRegistration> {
        self.run_blocking(move |db| db.add_channel_registration(guild_id, channel_id))
            .await
    }

    async fn unregister(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<bool> {
        self.run_blocking(move |db| db.remove_channel_registration(guild_id, channel_id))
            .await
    }

    async fn persona_facts(&self, guild_id: u64) -> anyhow::Result<Vec<PersonaFact>> {
        self.run_blocking(move |db| db.list_persona_facts(guild_id)).await
    }

    async fn replace_persona_facts(
        &self,
        guild_id: u64,
        facts: Vec<String>,
    ) -> anyhow::Result<usize> {
        self.run_blocking(move |db| db.replace_persona_facts(guild_id, &facts))
            .await
    }
}
