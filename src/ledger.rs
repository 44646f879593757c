use crate::store::{self, keys, SharedStore, StoreError};
use crate::vocabulary::Word;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Size of the rolling outcome window per word
pub const HISTORY_LEN: usize = 3;

/// Score at which a word counts as fully learned
pub const MASTERED_SCORE: u8 = HISTORY_LEN as u8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Correct,
    Wrong,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Correct => write!(f, "correct"),
            Outcome::Wrong => write!(f, "wrong"),
        }
    }
}

/// Last few outcomes of a word (oldest first) and the cached score
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordHistory {
    pub last_results: Vec<Outcome>,
    #[serde(default)]
    pub score: u8,
}

impl WordHistory {
    /// Build a history from arbitrary results, keeping only the newest window
    pub fn from_results(results: &[Outcome]) -> Self {
        let start = results.len().saturating_sub(HISTORY_LEN);
        let mut history = Self {
            last_results: results[start..].to_vec(),
            score: 0,
        };
        history.recompute();
        history
    }

    pub fn push(&mut self, outcome: Outcome) {
        self.last_results.push(outcome);
        if self.last_results.len() > HISTORY_LEN {
            let excess = self.last_results.len() - HISTORY_LEN;
            self.last_results.drain(..excess);
        }
        self.recompute();
    }

    fn recompute(&mut self) {
        self.score = self
            .last_results
            .iter()
            .filter(|o| **o == Outcome::Correct)
            .count() as u8;
        debug_assert!(self.last_results.len() <= HISTORY_LEN);
    }

    pub fn is_mastered(&self) -> bool {
        self.score >= MASTERED_SCORE
    }

    pub fn is_unseen(&self) -> bool {
        self.last_results.is_empty()
    }

    pub fn has_recent_miss(&self) -> bool {
        self.last_results.contains(&Outcome::Wrong)
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("word text must not be empty")]
    EmptyWord,

    #[error("ledger persistence failed: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Counts of words by learning state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressSummary {
    pub total: usize,
    pub unseen: usize,
    pub learning: usize,
    pub mastered: usize,
}

/// Authoritative per-word outcome history, persisted as one JSON blob
pub struct PerformanceLedger {
    store: SharedStore,
    entries: HashMap<String, WordHistory>,
}

impl PerformanceLedger {
    /// Load the ledger from the store. A corrupt blob is logged and replaced
    /// by an empty ledger on the next write.
    pub fn load(store: SharedStore) -> Result<Self> {
        let entries: HashMap<String, WordHistory> =
            match store::load_json(store.as_ref(), keys::WORD_PERFORMANCE) {
                Ok(found) => found.unwrap_or_default(),
                Err(StoreError::Json(e)) => {
                    warn!("discarding unreadable performance ledger: {e}");
                    HashMap::new()
                }
                Err(e) => return Err(e.into()),
            };

        // Older blobs may carry histories without a cached score
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k, WordHistory::from_results(&v.last_results)))
            .collect();

        Ok(Self { store, entries })
    }

    /// Append an outcome, keep the newest window, persist, and return the
    /// updated history. On a failed write the in-memory change is kept.
    pub fn record_outcome(&mut self, word_key: &str, outcome: Outcome) -> Result<WordHistory> {
        if word_key.trim().is_empty() {
            return Err(LedgerError::EmptyWord);
        }

        let history = self.entries.entry(word_key.to_string()).or_default();
        history.push(outcome);
        let updated = history.clone();
        debug!(
            "recorded {outcome} for '{word_key}': {:?} score {}",
            updated.last_results, updated.score
        );

        self.persist()?;
        Ok(updated)
    }

    pub fn history(&self, word_key: &str) -> WordHistory {
        self.entries.get(word_key).cloned().unwrap_or_default()
    }

    pub fn score(&self, word_key: &str) -> u8 {
        self.entries.get(word_key).map(|h| h.score).unwrap_or(0)
    }

    pub fn reset(&mut self, word_key: &str) -> Result<()> {
        if self.entries.remove(word_key).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    pub fn reset_all(&mut self) -> Result<()> {
        self.entries.clear();
        self.store.remove(keys::WORD_PERFORMANCE)?;
        Ok(())
    }

    /// Derive scores for every word from whatever history exists, including
    /// histories carried on the words themselves from before the ledger
    /// cached scores. Returns how many entries changed. Safe to re-run.
    pub fn recalculate_all(&mut self, words: &[Word]) -> Result<usize> {
        let mut changed = 0;

        for word in words {
            let source = match self.entries.get(&word.text) {
                Some(existing) => existing.last_results.clone(),
                None if !word.last_results.is_empty() => word.last_results.clone(),
                None => continue,
            };
            let derived = WordHistory::from_results(&source);
            if self.entries.get(&word.text) != Some(&derived) {
                self.entries.insert(word.text.clone(), derived);
                changed += 1;
            }
        }

        // Entries for words no longer in the vocabulary are still normalised
        for history in self.entries.values_mut() {
            let derived = WordHistory::from_results(&history.last_results);
            if *history != derived {
                *history = derived;
                changed += 1;
            }
        }

        if changed > 0 {
            self.persist()?;
        }
        Ok(changed)
    }

    /// Copy ledger state onto word projections
    pub fn refresh(&self, words: &[Word]) -> Vec<Word> {
        words.iter().map(|w| self.project(w)).collect()
    }

    pub fn project(&self, word: &Word) -> Word {
        let history = self.history(&word.text);
        Word {
            last_results: history.last_results,
            score: history.score,
            ..word.clone()
        }
    }

    pub fn summary(&self, words: &[Word]) -> ProgressSummary {
        words.iter().fold(
            ProgressSummary {
                total: words.len(),
                ..Default::default()
            },
            |mut acc, word| {
                let history = self.history(&word.text);
                if history.is_unseen() {
                    acc.unseen += 1;
                } else if history.is_mastered() {
                    acc.mastered += 1;
                } else {
                    acc.learning += 1;
                }
                acc
            },
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<()> {
        store::save_json(self.store.as_ref(), keys::WORD_PERFORMANCE, &self.entries).map_err(
            |e| {
                warn!("failed to persist performance ledger: {e}");
                LedgerError::from(e)
            },
        )
    }
}
