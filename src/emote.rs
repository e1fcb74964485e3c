//! Emote catalog and the post-processing applied to model output before it is
//! published.
//!
//! The model writes emotes as `:name:` shortcodes. [`EmotePostProcessor`]
//! expands those into the platform's `<:name:id>` / `<a:name:id>` tokens using
//! the guild's catalog, after stripping the usual noise models add around a
//! chat reply.

use moka::future::Cache;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{RelayError, RelayResult};
use crate::platform::{ChatPlatform, EmoteCatalogEntry};

static SHORTCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([A-Za-z0-9_]{2,32}):").expect("shortcode pattern"));

/// An already expanded emote token, or a bare id-looking digit run.
static NUMBER_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<token><a?:[A-Za-z0-9_]{2,32}:[0-9]+>)|[0-9]{8,22}").expect("number pattern")
});

const CATALOG_CAPACITY: u64 = 10_000;

/// Per-guild emote lists fetched from the platform, cached with an absolute TTL.
pub struct EmoteCatalog {
    platform: Arc<dyn ChatPlatform>,
    master_guild: Option<u64>,
    cache: Cache<u64, Arc<Vec<EmoteCatalogEntry>>>,
}

impl EmoteCatalog {
    pub fn new(platform: Arc<dyn ChatPlatform>, master_guild: Option<u64>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(CATALOG_CAPACITY)
            .time_to_live(ttl)
            .build();

        Self {
            platform,
            master_guild,
            cache,
        }
    }

    /// One guild's own emotes. Concurrent misses for the same guild share one fetch.
    async fn guild_entries(&self, guild_id: u64) -> RelayResult<Arc<Vec<EmoteCatalogEntry>>> {
        let platform = self.platform.clone();
        self.cache
            .try_get_with(guild_id, async move {
                debug!("Fetching emote catalog for guild {}", guild_id);
                platform.guild_emotes(guild_id).await.map(Arc::new)
            })
            .await
            .map_err(|e: Arc<RelayError>| match e.as_ref() {
                RelayError::NotFound { kind, id } => RelayError::not_found(*kind, *id),
                other => RelayError::Upstream(other.to_string()),
            })
    }

    /// The guild's emotes followed by the master guild's; the guild's own wins on a name clash.
    pub async fn entries(&self, guild_id: u64) -> RelayResult<Vec<EmoteCatalogEntry>> {
        let mut merged: Vec<EmoteCatalogEntry> = self.guild_entries(guild_id).await?.to_vec();

        if let Some(master) = self.master_guild.filter(|m| *m != guild_id) {
            match self.guild_entries(master).await {
                Ok(extra) => {
                    let known: HashSet<String> = merged.iter().map(|e| e.name.clone()).collect();
                    merged.extend(extra.iter().filter(|e| !known.contains(&e.name)).cloned());
                }
                Err(e) => warn!("Master guild {} emotes unavailable: {}", master, e),
            }
        }

        Ok(merged)
    }
}

/// Post-processed reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatted {
    pub text: String,
    /// Distinct shortcode names that were expanded.
    pub replaced: usize,
}

pub struct EmotePostProcessor {
    catalog: EmoteCatalog,
    bot_name: String,
}

impl EmotePostProcessor {
    pub fn new(catalog: EmoteCatalog, bot_name: impl Into<String>) -> Self {
        Self {
            catalog,
            bot_name: bot_name.into(),
        }
    }

    /// Quote, name-prefix and number cleanup, without touching the catalog.
    pub fn clean(&self, text: &str) -> String {
        let text = trim_quotes(text);
        let text = trim_name_prefix(text, &self.bot_name);
        remove_number_strings(text)
    }

    pub async fn format(&self, guild_id: u64, text: &str) -> RelayResult<Formatted> {
        let cleaned = self.clean(text);
        let catalog = self.catalog.entries(guild_id).await?;
        let (text, replaced) = replace_emotes(&cleaned, &catalog);

        if replaced > 0 {
            debug!(guild_id, replaced, "Expanded emote shortcodes");
        }

        Ok(Formatted { text, replaced })
    }
}

/// Strips one pair of wrapping double quotes.
pub fn trim_quotes(text: &str) -> &str {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// Drops an echoed `Name:` at the start of the reply.
pub fn trim_name_prefix<'a>(text: &'a str, name: &str) -> &'a str {
    text.strip_prefix(name)
        .and_then(|rest| rest.strip_prefix(':'))
        .map(str::trim_start)
        .unwrap_or(text)
}

/// Removes raw id-looking digit runs. Ids inside emote tokens are kept.
pub fn remove_number_strings(text: &str) -> String {
    NUMBER_STRING
        .replace_all(text, |caps: &regex::Captures| {
            caps.name("token")
                .map(|token| token.as_str().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

fn followed_by_id(rest: &str) -> bool {
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    digits > 0 && rest[digits..].starts_with('>')
}

/// Expands every known `:name:` shortcode that is not already part of a token.
///
/// Returns the new text and the number of distinct names expanded. Catalog
/// lookup is exact and case-sensitive; the first entry with a name wins.
pub fn replace_emotes(text: &str, catalog: &[EmoteCatalogEntry]) -> (String, usize) {
    let mut by_name: HashMap<&str, &EmoteCatalogEntry> = HashMap::new();
    for entry in catalog {
        by_name.entry(entry.name.as_str()).or_insert(entry);
    }

    let mut output = String::with_capacity(text.len());
    let mut replaced: HashSet<&str> = HashSet::new();
    let mut copied = 0;
    let mut pos = 0;

    while let Some(caps) = SHORTCODE.captures_at(text, pos) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };

        let expanded = text[..whole.start()].ends_with("<a") || followed_by_id(&text[whole.end()..]);
        match by_name.get(name.as_str()) {
            Some(entry) if !expanded => {
                output.push_str(&text[copied..whole.start()]);
                output.push_str(&entry.token());
                replaced.insert(name.as_str());
                copied = whole.end();
                pos = whole.end();
            }
            // The closing colon may open the next shortcode.
            _ => pos = whole.start() + 1,
        }
    }

    output.push_str(&text[copied..]);
    (output, replaced.len())
}
