use crate::clock::{Clock, SystemClock};
use crate::ledger::{LedgerError, Outcome, PerformanceLedger};
use crate::selection::{SelectionEngine, SessionType, WordSelector};
use crate::store::{self, keys, SharedStore, StoreError};
use crate::util::percentage;
use crate::vocabulary::Word;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_CARDS_PER_SESSION: usize = 20;

/// Archived session records kept in the store, oldest dropped first
pub const MAX_HISTORY_RECORDS: usize = 200;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("there are no words to study")]
    EmptyVocabulary,

    #[error("every word in this selection is already mastered")]
    NothingToStudy,

    #[error("the session is already complete")]
    AlreadyComplete,

    #[error("every card is answered; end the session to archive it")]
    AwaitingArchive,

    #[error("cards per session must be at least 1")]
    InvalidCardCount,

    #[error("session persistence failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub cards_per_session: usize,
    pub session_type: SessionType,
}

impl SessionConfig {
    pub fn new(cards_per_session: usize, session_type: SessionType) -> Result<Self> {
        if cards_per_session == 0 {
            return Err(SessionError::InvalidCardCount);
        }
        Ok(Self {
            cards_per_session,
            session_type,
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cards_per_session: DEFAULT_CARDS_PER_SESSION,
            session_type: SessionType::Mixed,
        }
    }
}

/// What the learner said about a card
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardAnswer {
    Correct,
    Incorrect,
    PracticeAgain,
}

impl CardAnswer {
    pub fn from_flags(is_correct: bool, is_practice_again: bool) -> Self {
        if is_practice_again {
            CardAnswer::PracticeAgain
        } else if is_correct {
            CardAnswer::Correct
        } else {
            CardAnswer::Incorrect
        }
    }

    /// Practice-again is a session-only signal and never reaches the ledger
    pub fn ledger_outcome(self) -> Option<Outcome> {
        match self {
            CardAnswer::Correct => Some(Outcome::Correct),
            CardAnswer::Incorrect => Some(Outcome::Wrong),
            CardAnswer::PracticeAgain => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Active,
    Complete,
}

/// The single in-flight session, checkpointed after every mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub session_type: SessionType,
    pub cards: Vec<Word>,
    pub current_index: usize,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub practice_again_count: u32,
    /// Status shown per card
    pub visited: BTreeMap<usize, CardAnswer>,
    /// Answer currently counted per card
    pub committed: BTreeMap<usize, CardAnswer>,
    pub started_at: DateTime<Utc>,
    pub completed: bool,
}

impl SessionProgress {
    fn new(session_type: SessionType, cards: Vec<Word>, started_at: DateTime<Utc>) -> Self {
        Self {
            session_type,
            cards,
            current_index: 0,
            correct_count: 0,
            incorrect_count: 0,
            practice_again_count: 0,
            visited: BTreeMap::new(),
            committed: BTreeMap::new(),
            started_at,
            completed: false,
        }
    }

    pub fn total_cards(&self) -> usize {
        self.cards.len()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.is_complete() {
            SessionPhase::Complete
        } else {
            SessionPhase::Active
        }
    }

    /// True once the session has been archived
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Every card is answered but the archive write has not gone through
    pub fn is_awaiting_archive(&self) -> bool {
        !self.completed && self.current_index >= self.total_cards()
    }

    pub fn current_card(&self) -> Option<&Word> {
        if self.completed {
            return None;
        }
        self.cards.get(self.current_index)
    }

    pub fn is_current_card_visited(&self) -> bool {
        self.committed.contains_key(&self.current_index)
    }

    pub fn answered_count(&self) -> usize {
        self.committed.len()
    }

    pub fn success_rate(&self) -> u32 {
        percentage(
            self.correct_count,
            self.correct_count + self.incorrect_count,
        )
    }

    fn counter(&mut self, answer: CardAnswer) -> &mut u32 {
        match answer {
            CardAnswer::Correct => &mut self.correct_count,
            CardAnswer::Incorrect => &mut self.incorrect_count,
            CardAnswer::PracticeAgain => &mut self.practice_again_count,
        }
    }

    /// Commit an answer for the current card and move past it
    fn apply_answer(&mut self, answer: CardAnswer) {
        let idx = self.current_index;
        if let Some(previous) = self.committed.get(&idx).copied() {
            let count = self.counter(previous);
            debug_assert!(*count > 0, "answer counter would go negative");
            *count = count.saturating_sub(1);
        }
        *self.counter(answer) += 1;

        self.visited.insert(idx, answer);
        self.committed.insert(idx, answer);
        self.current_index += 1;

        debug_assert_eq!(
            (self.correct_count + self.incorrect_count + self.practice_again_count) as usize,
            self.committed.len(),
            "answer counts drifted from committed answers"
        );
    }
}

/// Archived summary of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub session_type: SessionType,
    pub total_cards: usize,
    pub answered: usize,
    pub correct: u32,
    pub incorrect: u32,
    pub practice_again: u32,
    pub success_rate: u32,
    pub ended_early: bool,
}

/// Result of answering a card
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Advanced,
    Completed(SessionRecord),
}

/// Drives sessions against the store. Holds no session state of its own;
/// callers pass the `SessionProgress` handle into every operation.
pub struct SessionMachine {
    store: SharedStore,
    clock: Arc<dyn Clock>,
    engine: SelectionEngine,
}

impl SessionMachine {
    pub fn new(store: SharedStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: SharedStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            engine: SelectionEngine,
        }
    }

    /// Reload the checkpointed session after a restart
    pub fn resume(&self) -> Result<Option<SessionProgress>> {
        let progress: Option<SessionProgress> =
            store::load_json(self.store.as_ref(), keys::CURRENT_SESSION)?;
        Ok(progress.filter(|p| !p.is_complete()))
    }

    pub fn phase(&self) -> Result<SessionPhase> {
        Ok(match self.resume()? {
            Some(progress) => progress.phase(),
            None => SessionPhase::Idle,
        })
    }

    pub fn start_session(
        &self,
        config: &SessionConfig,
        words: &[Word],
        ledger: &PerformanceLedger,
    ) -> Result<SessionProgress> {
        self.start_session_with(config, words, ledger, &mut rand::thread_rng())
    }

    /// Fill a fixed card list from the weighted engine, without repeats.
    /// When the engine has nothing new to offer, the lowest-scoring unused
    /// eligible word is taken instead.
    pub fn start_session_with<R: Rng>(
        &self,
        config: &SessionConfig,
        words: &[Word],
        ledger: &PerformanceLedger,
        rng: &mut R,
    ) -> Result<SessionProgress> {
        if config.cards_per_session == 0 {
            return Err(SessionError::InvalidCardCount);
        }
        if words.is_empty() {
            return Err(SessionError::EmptyVocabulary);
        }

        let candidates = config.session_type.filter(words, ledger);
        if SelectionEngine::eligible(&candidates, ledger).is_empty() {
            return Err(SessionError::NothingToStudy);
        }

        let mut used: HashSet<String> = HashSet::new();
        let mut cards: Vec<Word> = Vec::with_capacity(config.cards_per_session);

        for _ in 0..config.cards_per_session {
            let drawn = self
                .engine
                .select_next_with(&candidates, ledger, rng)
                .filter(|w| !used.contains(&w.text));

            let next = drawn.or_else(|| lowest_scoring_unused(&candidates, ledger, &used));
            match next {
                Some(word) => {
                    used.insert(word.text.clone());
                    cards.push(word);
                }
                None => break,
            }
        }

        debug_assert_eq!(used.len(), cards.len(), "duplicate card in session");

        if let Some(previous) = self.resume()? {
            warn!(
                "abandoning unfinished session at card {}/{}",
                previous.current_index + 1,
                previous.total_cards()
            );
        }

        let progress = SessionProgress::new(config.session_type, cards, self.clock.now());
        self.checkpoint(&progress)?;
        info!(
            "started {} session with {} cards",
            progress.session_type,
            progress.total_cards()
        );
        Ok(progress)
    }

    /// Answer the current card. Re-answering a card replaces its earlier
    /// answer in the counts. Correct/incorrect answers also go to the ledger.
    pub fn record_outcome(
        &self,
        session: &mut SessionProgress,
        ledger: &mut PerformanceLedger,
        is_correct: bool,
        is_practice_again: bool,
    ) -> Result<Step> {
        if session.is_complete() {
            return Err(SessionError::AlreadyComplete);
        }
        if session.is_awaiting_archive() {
            return Err(SessionError::AwaitingArchive);
        }

        let answer = CardAnswer::from_flags(is_correct, is_practice_again);
        let word_key = session.cards[session.current_index].text.clone();
        session.apply_answer(answer);

        let ledger_write = match answer.ledger_outcome() {
            Some(outcome) => ledger.record_outcome(&word_key, outcome).map(|_| ()),
            None => Ok(()),
        };

        let step = if session.current_index >= session.total_cards() {
            match self.archive(session, false) {
                Ok(record) => Ok(Step::Completed(record)),
                Err(e) => {
                    // keep the answered state on disk so `end_early` can archive it
                    let _ = self.checkpoint(session);
                    Err(e)
                }
            }
        } else {
            self.checkpoint(session).map(|_| Step::Advanced)
        };

        ledger_write?;
        step
    }

    pub fn navigate_forward(&self, session: &mut SessionProgress) -> Result<bool> {
        if session.is_complete() || session.current_index + 1 >= session.total_cards() {
            return Ok(false);
        }
        session.current_index += 1;
        self.checkpoint(session)?;
        Ok(true)
    }

    pub fn navigate_backward(&self, session: &mut SessionProgress) -> Result<bool> {
        if session.is_complete() || session.current_index == 0 {
            return Ok(false);
        }
        session.current_index -= 1;
        self.checkpoint(session)?;
        Ok(true)
    }

    /// Finish now with whatever has been answered. Also archives a session
    /// whose last answer could not be archived.
    pub fn end_early(&self, session: &mut SessionProgress) -> Result<SessionRecord> {
        if session.is_complete() {
            return Err(SessionError::AlreadyComplete);
        }
        let ended_early = session.answered_count() < session.total_cards();
        self.archive(session, ended_early)
    }

    /// The current card resolved against the live word set, so edits made
    /// since the session started show up. Falls back to the session's copy
    /// if the word has vanished.
    pub fn current_word(
        &self,
        session: &SessionProgress,
        words: &[Word],
        ledger: &PerformanceLedger,
    ) -> Option<Word> {
        let card = session.current_card()?;
        let live = words.iter().find(|w| w.text == card.text).unwrap_or(card);
        Some(ledger.project(live))
    }

    pub fn history(&self) -> Result<Vec<SessionRecord>> {
        Ok(store::load_json(self.store.as_ref(), keys::SESSION_HISTORY)?.unwrap_or_default())
    }

    pub fn clear_history(&self) -> Result<()> {
        self.store.remove(keys::SESSION_HISTORY)?;
        Ok(())
    }

    fn checkpoint(&self, session: &SessionProgress) -> Result<()> {
        store::save_json(self.store.as_ref(), keys::CURRENT_SESSION, session).map_err(|e| {
            warn!("failed to checkpoint session: {e}");
            SessionError::from(e)
        })
    }

    /// Append the record to the history, then mark the session complete and
    /// drop its checkpoint. A failed history write leaves the session open.
    fn archive(&self, session: &mut SessionProgress, ended_early: bool) -> Result<SessionRecord> {
        let record = SessionRecord {
            started_at: session.started_at,
            finished_at: self.clock.now(),
            session_type: session.session_type,
            total_cards: session.total_cards(),
            answered: session.answered_count(),
            correct: session.correct_count,
            incorrect: session.incorrect_count,
            practice_again: session.practice_again_count,
            success_rate: session.success_rate(),
            ended_early,
        };

        let mut history = self.history()?;
        history.push(record.clone());
        if history.len() > MAX_HISTORY_RECORDS {
            let excess = history.len() - MAX_HISTORY_RECORDS;
            history.drain(..excess);
        }
        store::save_json(self.store.as_ref(), keys::SESSION_HISTORY, &history).map_err(|e| {
            warn!("failed to archive session: {e}");
            SessionError::from(e)
        })?;

        session.completed = true;
        self.store.remove(keys::CURRENT_SESSION)?;

        debug!(
            "archived session: {}/{} answered, {}% success",
            record.answered, record.total_cards, record.success_rate
        );
        Ok(record)
    }
}

fn lowest_scoring_unused(
    words: &[Word],
    ledger: &PerformanceLedger,
    used: &HashSet<String>,
) -> Option<Word> {
    SelectionEngine::eligible(words, ledger)
        .into_iter()
        .filter(|(w, _)| !used.contains(&w.text))
        .min_by_key(|(_, score)| *score)
        .map(|(w, _)| ledger.project(w))
}
