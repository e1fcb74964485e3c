/// Tables for channel registrations and per-guild persona facts.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS channel_registrations (
        guild_id INTEGER NOT NULL,
        channel_id INTEGER NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (guild_id, channel_id)
    );

    CREATE TABLE IF NOT EXISTS persona_facts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guild_id INTEGER NOT NULL,
        fact TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_persona_facts_guild ON persona_facts (guild_id);
";
