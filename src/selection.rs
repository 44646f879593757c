use crate::ledger::{PerformanceLedger, MASTERED_SCORE};
use crate::vocabulary::Word;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Above this many duplicated pool entries the engine samples with
/// cumulative weights instead of materialising the pool.
pub const MAX_POOL_ENTRIES: usize = 20_000;

/// Pool entries contributed by a word with the given score
pub fn weight(score: u8) -> usize {
    match score {
        0 => 5,
        1 => 3,
        2 => 1,
        _ => 0,
    }
}

/// Which slice of the vocabulary a session draws from
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionType {
    #[default]
    Mixed,
    New,
    Review,
    Difficult,
}

impl SessionType {
    /// Narrow the word set before the weighted draw. `Mixed` keeps all words.
    pub fn filter(&self, words: &[Word], ledger: &PerformanceLedger) -> Vec<Word> {
        words
            .iter()
            .filter(|w| {
                let history = ledger.history(&w.text);
                match self {
                    SessionType::Mixed => true,
                    SessionType::New => history.is_unseen(),
                    SessionType::Review => !history.is_unseen(),
                    SessionType::Difficult => history.has_recent_miss(),
                }
            })
            .cloned()
            .collect()
    }
}

/// Strategy for drawing the next word to study
pub trait WordSelector {
    fn select_next_with<R: Rng>(
        &self,
        words: &[Word],
        ledger: &PerformanceLedger,
        rng: &mut R,
    ) -> Option<Word>;

    fn select_next(&self, words: &[Word], ledger: &PerformanceLedger) -> Option<Word> {
        self.select_next_with(words, ledger, &mut rand::thread_rng())
    }
}

/// Score-weighted draw: unseen and weak words come up more often, mastered
/// words never do.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelectionEngine;

impl SelectionEngine {
    /// Words still worth studying, with their ledger scores
    pub fn eligible<'a>(words: &'a [Word], ledger: &PerformanceLedger) -> Vec<(&'a Word, u8)> {
        words
            .iter()
            .map(|w| (w, ledger.score(&w.text)))
            .filter(|(_, score)| *score < MASTERED_SCORE)
            .collect()
    }
}

impl WordSelector for SelectionEngine {
    fn select_next_with<R: Rng>(
        &self,
        words: &[Word],
        ledger: &PerformanceLedger,
        rng: &mut R,
    ) -> Option<Word> {
        let eligible = Self::eligible(words, ledger);
        let (first, _) = eligible.first()?;

        let pool_size: usize = eligible.iter().map(|(_, s)| weight(*s)).sum();
        if pool_size == 0 {
            return Some(ledger.project(first));
        }

        let picked = if pool_size <= MAX_POOL_ENTRIES {
            let pool: Vec<&Word> = eligible
                .iter()
                .flat_map(|(w, s)| std::iter::repeat(*w).take(weight(*s)))
                .collect();
            pool[rng.gen_range(0..pool.len())]
        } else {
            let weights = eligible.iter().map(|(_, s)| weight(*s));
            match WeightedIndex::new(weights) {
                Ok(dist) => eligible[dist.sample(rng)].0,
                Err(_) => *first,
            }
        };

        Some(ledger.project(picked))
    }
}
