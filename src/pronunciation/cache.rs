use crate::clock::{Clock, SystemClock};
use crate::store::{self, keys, SharedStore, StoreError};
use crate::util::normalize_key;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_TTL_DAYS: i64 = 30;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("word text must not be empty")]
    EmptyWord,

    #[error("pronunciation cache persistence failed: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Synthesized audio for one word. The payload is base64 inside the JSON blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPronunciation {
    #[serde(with = "base64_audio")]
    pub audio: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub access_count: u32,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub capacity: usize,
    pub ttl: Duration,
}

impl CacheSettings {
    pub fn new(capacity: usize, ttl_days: i64) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl: Duration::days(ttl_days.max(0)),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL_DAYS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub count: usize,
    pub total_bytes: usize,
    pub total_accesses: u64,
    pub most_accessed_word: Option<String>,
}

/// Bounded audio cache keyed by case-folded word text. When full, the entry
/// with the fewest accesses goes first, the least recently used among equals.
pub struct PronunciationCache {
    store: SharedStore,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    entries: HashMap<String, CachedPronunciation>,
}

impl PronunciationCache {
    pub fn load(store: SharedStore) -> std::result::Result<Self, StoreError> {
        Self::load_with(store, CacheSettings::default(), Arc::new(SystemClock))
    }

    /// Load the persisted cache and drop expired entries
    pub fn load_with(
        store: SharedStore,
        settings: CacheSettings,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Self, StoreError> {
        let entries = match store::load_json(store.as_ref(), keys::PRONUNCIATION_CACHE) {
            Ok(found) => found.unwrap_or_default(),
            Err(StoreError::Json(e)) => {
                warn!("discarding unreadable pronunciation cache: {e}");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };

        let mut cache = Self {
            store,
            clock,
            settings,
            entries,
        };
        if let Err(e) = cache.purge_expired() {
            warn!("could not persist purge of expired pronunciations: {e}");
        }
        Ok(cache)
    }

    pub fn lookup(&mut self, word: &str) -> Option<Vec<u8>> {
        let key = normalize_key(word);
        let now = self.clock.now();
        let entry = self.entries.get_mut(&key)?;
        entry.access_count += 1;
        entry.last_accessed = now;
        let audio = entry.audio.clone();

        if let Err(e) = self.persist() {
            warn!("could not persist access to cached pronunciation '{key}': {e}");
        }
        Some(audio)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.entries.contains_key(&normalize_key(word))
    }

    pub fn insert(&mut self, word: &str, audio: Vec<u8>) -> Result<()> {
        let key = normalize_key(word);
        if key.is_empty() {
            return Err(CacheError::EmptyWord);
        }

        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.settings.capacity {
                if self.evict_one().is_none() {
                    break;
                }
            }
        }

        let now = self.clock.now();
        self.entries.insert(
            key,
            CachedPronunciation {
                audio,
                created_at: now,
                access_count: 0,
                last_accessed: now,
            },
        );
        self.persist()
    }

    pub fn remove(&mut self, word: &str) -> Result<bool> {
        let removed = self.entries.remove(&normalize_key(word)).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Drop entries older than the TTL, returning how many went
    pub fn purge_expired(&mut self) -> Result<usize> {
        let now = self.clock.now();
        let ttl = self.settings.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, e| now - e.created_at <= ttl);

        let purged = before - self.entries.len();
        if purged > 0 {
            info!("purged {purged} expired pronunciations");
            self.persist()?;
        }
        Ok(purged)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.store.remove(keys::PRONUNCIATION_CACHE)?;
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let most_accessed_word = self
            .entries
            .iter()
            .filter(|(_, e)| e.access_count > 0)
            .max_by(|a, b| {
                a.1.access_count
                    .cmp(&b.1.access_count)
                    .then_with(|| b.0.cmp(a.0))
            })
            .map(|(k, _)| k.clone());

        CacheStats {
            count: self.entries.len(),
            total_bytes: self.entries.values().map(|e| e.audio.len()).sum(),
            total_accesses: self.entries.values().map(|e| e.access_count as u64).sum(),
            most_accessed_word,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn settings(&self) -> CacheSettings {
        self.settings
    }

    fn evict_one(&mut self) -> Option<String> {
        let victim = self
            .entries
            .iter()
            .min_by(|a, b| {
                (a.1.access_count, a.1.last_accessed, a.0)
                    .cmp(&(b.1.access_count, b.1.last_accessed, b.0))
            })
            .map(|(k, _)| k.clone())?;

        self.entries.remove(&victim);
        debug!("evicted cached pronunciation '{victim}'");
        Some(victim)
    }

    fn persist(&self) -> Result<()> {
        store::save_json(self.store.as_ref(), keys::PRONUNCIATION_CACHE, &self.entries)?;
        Ok(())
    }
}

mod base64_audio {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(audio: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(audio))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
