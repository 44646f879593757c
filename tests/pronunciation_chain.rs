use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use wortdrill::pronunciation::{
    AudioFallbackChain, AudioPlayer, LocalSpeaker, LocalSpeechError, PlaybackError,
    PronunciationCache, PronunciationFailure, PronunciationSource, RemoteError, RemoteFailure,
    RemoteSynthesizer,
};
use wortdrill::MemoryStore;

#[derive(Default)]
struct Calls {
    remote: AtomicUsize,
    local: AtomicUsize,
    played: Mutex<Vec<Vec<u8>>>,
}

struct FakeRemote {
    calls: Arc<Calls>,
    answer: Result<Vec<u8>, RemoteError>,
}

impl RemoteSynthesizer for FakeRemote {
    fn synthesize(&self, _word: &str) -> Result<Vec<u8>, RemoteError> {
        self.calls.remote.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

struct FakeLocal {
    calls: Arc<Calls>,
    supported: bool,
    works: bool,
}

impl LocalSpeaker for FakeLocal {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn speak(&self, _word: &str) -> Result<(), LocalSpeechError> {
        self.calls.local.fetch_add(1, Ordering::SeqCst);
        if self.works {
            Ok(())
        } else {
            Err(LocalSpeechError("voice missing".into()))
        }
    }
}

struct FakePlayer {
    calls: Arc<Calls>,
}

impl AudioPlayer for FakePlayer {
    fn play(&self, audio: &[u8]) -> Result<(), PlaybackError> {
        if let Ok(mut played) = self.calls.played.lock() {
            played.push(audio.to_vec());
        }
        Ok(())
    }
}

fn build(
    remote: Result<Vec<u8>, RemoteError>,
    local_supported: bool,
    local_works: bool,
) -> (Arc<Calls>, AudioFallbackChain) {
    let calls = Arc::new(Calls::default());
    let cache = PronunciationCache::load(MemoryStore::shared()).unwrap();
    let chain = AudioFallbackChain::new(
        cache,
        Box::new(FakePlayer {
            calls: calls.clone(),
        }),
    )
    .with_remote(Arc::new(FakeRemote {
        calls: calls.clone(),
        answer: remote,
    }))
    .with_local(Box::new(FakeLocal {
        calls: calls.clone(),
        supported: local_supported,
        works: local_works,
    }));
    (calls, chain)
}

#[test]
fn cache_hit_never_calls_synthesizers() {
    let (calls, mut chain) = build(Ok(vec![9]), true, true);
    chain.cache_mut().insert("Haus", vec![1, 2]).unwrap();

    for _ in 0..3 {
        assert_eq!(chain.pronounce("Haus"), Ok(PronunciationSource::Cache));
    }

    assert_eq!(calls.remote.load(Ordering::SeqCst), 0);
    assert_eq!(calls.local.load(Ordering::SeqCst), 0);
    assert_eq!(calls.played.lock().unwrap().len(), 3);
    assert_eq!(chain.cache().stats().total_accesses, 3);
}

#[test]
fn remote_audio_is_cached_before_playing() {
    let (calls, mut chain) = build(Ok(vec![4, 2]), true, true);

    assert_eq!(chain.pronounce("Baum"), Ok(PronunciationSource::Remote));
    assert!(chain.cache().contains("baum"));
    assert_eq!(calls.played.lock().unwrap().as_slice(), &[vec![4, 2]]);

    assert_eq!(chain.pronounce("BAUM"), Ok(PronunciationSource::Cache));
    assert_eq!(calls.remote.load(Ordering::SeqCst), 1);
}

#[test]
fn remote_failure_falls_back_to_device() {
    let (calls, mut chain) = build(Err(RemoteError::Network("offline".into())), true, true);

    assert_eq!(chain.pronounce("Tür"), Ok(PronunciationSource::Device));
    assert_eq!(calls.remote.load(Ordering::SeqCst), 1);
    assert_eq!(calls.local.load(Ordering::SeqCst), 1);
    assert!(!chain.cache().contains("Tür"));
}

#[test]
fn unsupported_device_is_distinguished() {
    let (calls, mut chain) = build(Err(RemoteError::Quota), false, true);

    assert_eq!(
        chain.pronounce("Tür"),
        Err(PronunciationFailure::Unsupported {
            remote: RemoteFailure::Quota
        })
    );
    assert_eq!(calls.local.load(Ordering::SeqCst), 0);
}

#[test]
fn both_stages_failing_reports_both_reasons() {
    let (_, mut chain) = build(Err(RemoteError::Network("dns".into())), true, false);

    let failure = chain.pronounce("Tür").unwrap_err();
    assert_matches!(
        &failure,
        PronunciationFailure::Exhausted { remote: RemoteFailure::Network(msg), local }
            if msg == "dns" && local == "voice missing"
    );
    assert!(failure.to_string().contains("both failed"));
}
