use crate::ledger::Outcome;
use crate::store::{self, keys, SharedStore, StoreError};
use include_dir::{include_dir, Dir};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

static DECK_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/decks");

/// A vocabulary item. `last_results`/`score` are a projection of the ledger
/// and are only as fresh as the last `PerformanceLedger::refresh`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    #[serde(alias = "word")]
    pub text: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default)]
    pub last_results: Vec<Outcome>,
    #[serde(default)]
    pub score: u8,
}

impl Word {
    pub fn new(text: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            translation: translation.into(),
            bookmarked: false,
            last_results: Vec::new(),
            score: 0,
        }
    }
}

#[derive(Error, Debug)]
pub enum VocabularyError {
    #[error("word text must not be empty")]
    EmptyWord,

    #[error("deck not found: {0}")]
    DeckNotFound(String),

    #[error("deck is not valid UTF-8: {0}")]
    DeckEncoding(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("vocabulary persistence failed: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, VocabularyError>;

/// Read-only seed deck shipped with the binary
#[derive(Deserialize, Clone, Debug)]
pub struct Deck {
    pub name: String,
    pub size: u32,
    pub words: Vec<Word>,
}

impl Deck {
    pub fn load(name: &str) -> Result<Self> {
        let file = DECK_DIR
            .get_file(format!("{name}.json"))
            .ok_or_else(|| VocabularyError::DeckNotFound(name.to_string()))?;

        let contents = file
            .contents_utf8()
            .ok_or_else(|| VocabularyError::DeckEncoding(name.to_string()))?;

        Ok(serde_json::from_str(contents)?)
    }

    /// Names of all bundled decks
    pub fn available() -> Vec<String> {
        let mut names: Vec<String> = DECK_DIR
            .files()
            .filter_map(|f| {
                f.path()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }
}

/// Seed deck merged with learner-added words and bookmarks
pub struct Vocabulary {
    store: SharedStore,
    deck: Deck,
    custom: Vec<Word>,
    bookmarks: BTreeSet<String>,
}

impl Vocabulary {
    pub fn load(store: SharedStore, deck_name: &str) -> Result<Self> {
        let deck = Deck::load(deck_name)?;
        Self::with_deck(store, deck)
    }

    pub fn with_deck(store: SharedStore, deck: Deck) -> Result<Self> {
        let custom: Vec<Word> = load_or_default(&store, keys::CUSTOM_WORDS)?;
        let bookmarks: BTreeSet<String> = load_or_default(&store, keys::BOOKMARKED_WORDS)?;
        debug!(
            "loaded deck '{}' ({} words) with {} custom words",
            deck.name,
            deck.words.len(),
            custom.len()
        );
        Ok(Self {
            store,
            deck,
            custom,
            bookmarks,
        })
    }

    pub fn deck_name(&self) -> &str {
        &self.deck.name
    }

    /// Seed words followed by custom-only words; a custom word replaces the
    /// seed word with the same text.
    pub fn words(&self) -> Vec<Word> {
        let mut merged: Vec<Word> = self
            .deck
            .words
            .iter()
            .map(|seed| {
                self.custom
                    .iter()
                    .find(|c| c.text == seed.text)
                    .unwrap_or(seed)
                    .clone()
            })
            .collect();

        for custom in &self.custom {
            if !self.deck.words.iter().any(|s| s.text == custom.text) {
                merged.push(custom.clone());
            }
        }

        for word in &mut merged {
            word.bookmarked = self.bookmarks.contains(&word.text);
        }
        merged
    }

    pub fn find(&self, text: &str) -> Option<Word> {
        self.words().into_iter().find(|w| w.text == text)
    }

    pub fn add_custom_word(&mut self, text: &str, translation: &str) -> Result<Word> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VocabularyError::EmptyWord);
        }

        let word = Word::new(text, translation.trim());
        match self.custom.iter_mut().find(|c| c.text == text) {
            Some(existing) => *existing = word.clone(),
            None => self.custom.push(word.clone()),
        }
        store::save_json(self.store.as_ref(), keys::CUSTOM_WORDS, &self.custom)?;
        Ok(word)
    }

    pub fn set_bookmarked(&mut self, text: &str, bookmarked: bool) -> Result<()> {
        if text.trim().is_empty() {
            return Err(VocabularyError::EmptyWord);
        }
        let changed = if bookmarked {
            self.bookmarks.insert(text.to_string())
        } else {
            self.bookmarks.remove(text)
        };
        if changed {
            store::save_json(self.store.as_ref(), keys::BOOKMARKED_WORDS, &self.bookmarks)?;
        }
        Ok(())
    }
}

fn load_or_default<T>(store: &SharedStore, key: &str) -> Result<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    match store::load_json(store.as_ref(), key) {
        Ok(found) => Ok(found.unwrap_or_default()),
        Err(StoreError::Json(e)) => {
            warn!("ignoring unreadable '{key}': {e}");
            Ok(T::default())
        }
        Err(e) => Err(e.into()),
    }
}
