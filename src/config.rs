use crate::clock::SystemClock;
use crate::pronunciation::cache::{CacheSettings, DEFAULT_CAPACITY, DEFAULT_TTL_DAYS};
use crate::pronunciation::chain::DEFAULT_REMOTE_TIMEOUT;
use crate::pronunciation::{AudioFallbackChain, AudioPlayer, PronunciationCache};
use crate::selection::SessionType;
use crate::session::{SessionConfig, DEFAULT_CARDS_PER_SESSION};
use crate::store::{SharedStore, StoreError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub cards_per_session: usize,
    pub session_type: SessionType,
    pub deck: String,
    pub cache_capacity: usize,
    pub cache_ttl_days: i64,
    pub remote_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cards_per_session: DEFAULT_CARDS_PER_SESSION,
            session_type: SessionType::Mixed,
            deck: "german".to_string(),
            cache_capacity: DEFAULT_CAPACITY,
            cache_ttl_days: DEFAULT_TTL_DAYS,
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Session settings, with a zero card count raised to one
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            cards_per_session: self.cards_per_session.max(1),
            session_type: self.session_type,
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings::new(self.cache_capacity, self.cache_ttl_days)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    /// Load the persisted pronunciation cache with the configured bounds
    pub fn pronunciation_cache(&self, store: SharedStore) -> Result<PronunciationCache, StoreError> {
        PronunciationCache::load_with(store, self.cache_settings(), Arc::new(SystemClock))
    }

    /// Fallback chain over the configured cache and remote timeout. Speech
    /// backends are attached with `with_remote` / `with_local`.
    pub fn fallback_chain(
        &self,
        store: SharedStore,
        player: Box<dyn AudioPlayer>,
    ) -> Result<AudioFallbackChain, StoreError> {
        let cache = self.pronunciation_cache(store)?;
        Ok(AudioFallbackChain::new(cache, player).with_timeout(self.remote_timeout()))
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "wortdrill") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("wortdrill_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => log::warn!("ignoring unreadable config {}: {e}", self.path.display()),
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}
