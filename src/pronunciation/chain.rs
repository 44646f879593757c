use super::cache::PronunciationCache;
use log::{debug, warn};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Longest the chain waits on remote synthesis
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("quota exceeded")]
    Quota,

    #[error("request rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct LocalSpeechError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PlaybackError(pub String);

/// Text-to-speech service reached over the network
pub trait RemoteSynthesizer: Send + Sync + 'static {
    fn synthesize(&self, word: &str) -> Result<Vec<u8>, RemoteError>;
}

/// Speech engine built into the device
pub trait LocalSpeaker {
    fn is_supported(&self) -> bool;
    fn speak(&self, word: &str) -> Result<(), LocalSpeechError>;
}

/// Plays an audio payload
pub trait AudioPlayer {
    fn play(&self, audio: &[u8]) -> Result<(), PlaybackError>;
}

/// Why the remote stage did not produce audio
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    #[error("no remote synthesizer configured")]
    NotConfigured,

    #[error("network error: {0}")]
    Network(String),

    #[error("quota exceeded")]
    Quota,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("synthesized audio could not be played: {0}")]
    Playback(String),

    #[error("synthesis worker failed: {0}")]
    Worker(String),
}

impl From<RemoteError> for RemoteFailure {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Network(msg) => RemoteFailure::Network(msg),
            RemoteError::Quota => RemoteFailure::Quota,
            RemoteError::Rejected(msg) => RemoteFailure::Rejected(msg),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PronunciationFailure {
    #[error("nothing to pronounce")]
    EmptyWord,

    #[error("speech is not supported on this device (remote: {remote})")]
    Unsupported { remote: RemoteFailure },

    #[error("remote and on-device speech both failed (remote: {remote}; device: {local})")]
    Exhausted { remote: RemoteFailure, local: String },
}

/// Stage that ended up producing sound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PronunciationSource {
    Cache,
    Remote,
    Device,
}

/// cache → remote synthesis → on-device speech. Each stage's failure is
/// turned into "try the next stage"; only the last one is reported.
pub struct AudioFallbackChain {
    cache: PronunciationCache,
    player: Box<dyn AudioPlayer>,
    remote: Option<Arc<dyn RemoteSynthesizer>>,
    local: Option<Box<dyn LocalSpeaker>>,
    timeout: Duration,
}

impl AudioFallbackChain {
    pub fn new(cache: PronunciationCache, player: Box<dyn AudioPlayer>) -> Self {
        Self {
            cache,
            player,
            remote: None,
            local: None,
            timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteSynthesizer>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_local(mut self, local: Box<dyn LocalSpeaker>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cache(&self) -> &PronunciationCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut PronunciationCache {
        &mut self.cache
    }

    pub fn pronounce(&mut self, word: &str) -> Result<PronunciationSource, PronunciationFailure> {
        let word = word.trim();
        if word.is_empty() {
            return Err(PronunciationFailure::EmptyWord);
        }

        if let Some(audio) = self.cache.lookup(word) {
            match self.player.play(&audio) {
                Ok(()) => return Ok(PronunciationSource::Cache),
                Err(e) => {
                    warn!("cached audio for '{word}' failed to play, evicting: {e}");
                    if let Err(e) = self.cache.remove(word) {
                        warn!("could not evict cached audio for '{word}': {e}");
                    }
                }
            }
        }

        let remote = match self.try_remote(word) {
            Ok(()) => return Ok(PronunciationSource::Remote),
            Err(failure) => {
                debug!("remote synthesis for '{word}' unavailable: {failure}");
                failure
            }
        };

        let local = match &self.local {
            Some(local) if local.is_supported() => local,
            _ => return Err(PronunciationFailure::Unsupported { remote }),
        };

        match local.speak(word) {
            Ok(()) => Ok(PronunciationSource::Device),
            Err(e) => {
                warn!("on-device speech for '{word}' failed: {e}");
                Err(PronunciationFailure::Exhausted {
                    remote,
                    local: e.to_string(),
                })
            }
        }
    }

    fn try_remote(&mut self, word: &str) -> Result<(), RemoteFailure> {
        let remote = self.remote.clone().ok_or(RemoteFailure::NotConfigured)?;
        let audio = synthesize_with_timeout(remote, word, self.timeout)?;

        if let Err(e) = self.cache.insert(word, audio.clone()) {
            warn!("could not cache synthesized audio for '{word}': {e}");
        }

        if let Err(e) = self.player.play(&audio) {
            warn!("synthesized audio for '{word}' failed to play, evicting: {e}");
            if let Err(e) = self.cache.remove(word) {
                warn!("could not evict cached audio for '{word}': {e}");
            }
            return Err(RemoteFailure::Playback(e.to_string()));
        }
        Ok(())
    }
}

/// Run the synthesizer on a helper thread and stop waiting after `timeout`.
/// A late call is left to finish; its result is dropped.
fn synthesize_with_timeout(
    remote: Arc<dyn RemoteSynthesizer>,
    word: &str,
    timeout: Duration,
) -> Result<Vec<u8>, RemoteFailure> {
    let (tx, rx) = mpsc::channel();
    let text = word.to_string();

    thread::Builder::new()
        .name("remote-tts".to_string())
        .spawn(move || {
            let _ = tx.send(remote.synthesize(&text));
        })
        .map_err(|e| RemoteFailure::Worker(e.to_string()))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result.map_err(RemoteFailure::from),
        Err(RecvTimeoutError::Timeout) => Err(RemoteFailure::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(RemoteFailure::Worker("synthesizer stopped without answering".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        plays: Arc<AtomicUsize>,
        fail: bool,
    }

    impl AudioPlayer for Recorder {
        fn play(&self, _audio: &[u8]) -> Result<(), PlaybackError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PlaybackError("corrupt".into()))
            } else {
                Ok(())
            }
        }
    }

    struct SlowRemote;

    struct FixedRemote(Arc<AtomicUsize>);

    impl RemoteSynthesizer for FixedRemote {
        fn synthesize(&self, _word: &str) -> Result<Vec<u8>, RemoteError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![7])
        }
    }

    impl RemoteSynthesizer for SlowRemote {
        fn synthesize(&self, _word: &str) -> Result<Vec<u8>, RemoteError> {
            thread::sleep(Duration::from_millis(500));
            Ok(vec![1])
        }
    }

    fn chain(fail_playback: bool) -> (Arc<AtomicUsize>, AudioFallbackChain) {
        let plays = Arc::new(AtomicUsize::new(0));
        let cache = PronunciationCache::load(MemoryStore::shared()).unwrap();
        let player = Recorder {
            plays: plays.clone(),
            fail: fail_playback,
        };
        (plays, AudioFallbackChain::new(cache, Box::new(player)))
    }

    #[test]
    fn test_empty_word() {
        let (_, mut chain) = chain(false);
        assert_eq!(chain.pronounce("  "), Err(PronunciationFailure::EmptyWord));
    }

    #[test]
    fn test_nothing_configured_is_unsupported() {
        let (plays, mut chain) = chain(false);
        assert_eq!(
            chain.pronounce("Haus"),
            Err(PronunciationFailure::Unsupported {
                remote: RemoteFailure::NotConfigured
            })
        );
        assert_eq!(plays.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remote_timeout_is_reported() {
        let (_, chain) = chain(false);
        let mut chain = chain
            .with_remote(Arc::new(SlowRemote))
            .with_timeout(Duration::from_millis(20));

        assert_eq!(
            chain.pronounce("Haus"),
            Err(PronunciationFailure::Unsupported {
                remote: RemoteFailure::Timeout(Duration::from_millis(20))
            })
        );
        assert!(!chain.cache().contains("Haus"));
    }

    #[test]
    fn test_bad_cached_audio_is_evicted() {
        let (plays, mut chain) = chain(true);
        chain.cache_mut().insert("Haus", vec![0]).unwrap();

        let result = chain.pronounce("Haus");
        assert!(matches!(
            result,
            Err(PronunciationFailure::Unsupported { .. })
        ));
        assert_eq!(plays.load(Ordering::SeqCst), 1);
        assert!(!chain.cache().contains("Haus"));
    }

    #[test]
    fn test_unplayable_synthesized_audio_is_not_kept() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (plays, chain) = chain(true);
        let mut chain = chain.with_remote(Arc::new(FixedRemote(calls.clone())));

        for _ in 0..2 {
            assert_eq!(
                chain.pronounce("Haus"),
                Err(PronunciationFailure::Unsupported {
                    remote: RemoteFailure::Playback("corrupt".into())
                })
            );
            assert!(!chain.cache().contains("Haus"));
        }
        // each attempt synthesizes once and plays once
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(plays.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_messages_are_distinct() {
        let unsupported = PronunciationFailure::Unsupported {
            remote: RemoteFailure::Quota,
        };
        let exhausted = PronunciationFailure::Exhausted {
            remote: RemoteFailure::Network("offline".into()),
            local: "engine busy".into(),
        };
        assert!(unsupported.to_string().contains("not supported"));
        assert!(exhausted.to_string().contains("offline"));
        assert!(exhausted.to_string().contains("engine busy"));
        assert_eq!(
            RemoteFailure::Timeout(Duration::from_secs(15)).to_string(),
            "timed out after 15s"
        );
        assert_eq!(
            RemoteFailure::Timeout(Duration::from_millis(250)).to_string(),
            "timed out after 250ms"
        );
    }
}
