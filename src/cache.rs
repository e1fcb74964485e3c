use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

type ChannelKey = (u64, u64);

/// Last message id the bot has already answered, per (guild, channel).
///
/// Lives in memory only; after a restart every channel starts without a marker.
#[derive(Clone)]
pub struct MarkerCache {
    cache: Arc<Mutex<LruCache<ChannelKey, u64>>>,
}

impl MarkerCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(cap))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<ChannelKey, u64>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, guild_id: u64, channel_id: u64) -> Option<u64> {
        self.lock().get(&(guild_id, channel_id)).copied()
    }

    /// Moves the marker forward; never moves it back.
    pub fn advance(&self, guild_id: u64, channel_id: u64, message_id: u64) {
        let mut cache = self.lock();
        let key = (guild_id, channel_id);
        let next = cache
            .get(&key)
            .map_or(message_id, |current| (*current).max(message_id));
        cache.put(key, next);
    }

    pub fn forget(&self, guild_id: u64, channel_id: u64) {
        self.lock().pop(&(guild_id, channel_id));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
