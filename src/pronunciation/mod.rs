pub mod cache;
pub mod chain;

pub use cache::{CacheError, CacheSettings, CacheStats, CachedPronunciation, PronunciationCache};
pub use chain::{
    AudioFallbackChain, AudioPlayer, LocalSpeaker, LocalSpeechError, PlaybackError,
    PronunciationFailure, PronunciationSource, RemoteError, RemoteFailure, RemoteSynthesizer,
};
