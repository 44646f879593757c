use std::collections::HashSet;
use std::sync::Arc;

use wortdrill::ledger::Outcome::{Correct, Wrong};
use wortdrill::selection::weight;
use wortdrill::session::{SessionPhase, Step};
use wortdrill::{
    PerformanceLedger, SelectionEngine, SessionConfig, SessionMachine, SessionType, SharedStore,
    SqliteStore, Vocabulary, Word, WordSelector,
};

/// Integration tests for whole drill sessions against a real SQLite store

fn sqlite_store(dir: &tempfile::TempDir) -> SharedStore {
    Arc::new(SqliteStore::open(dir.path().join("drill.db")).unwrap())
}

#[test]
fn der_hund_across_three_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir);
    let mut ledger = PerformanceLedger::load(store.clone()).unwrap();
    let machine = SessionMachine::new(store.clone());
    let words = vec![Word::new("der Hund", "the dog")];
    let config = SessionConfig::new(1, SessionType::Mixed).unwrap();

    for is_correct in [false, false, true] {
        let mut session = machine.start_session(&config, &words, &ledger).unwrap();
        assert_eq!(session.cards[0].text, "der Hund");
        let step = machine
            .record_outcome(&mut session, &mut ledger, is_correct, false)
            .unwrap();
        assert!(matches!(step, Step::Completed(_)));
    }

    let history = ledger.history("der Hund");
    assert_eq!(history.last_results, vec![Wrong, Wrong, Correct]);
    assert_eq!(history.score, 1);
    assert_eq!(weight(history.score), 3);

    let next = SelectionEngine.select_next(&words, &ledger).unwrap();
    assert_eq!(next.text, "der Hund");
    assert_eq!(next.score, 1);

    // a fresh process sees the same state
    let reloaded = PerformanceLedger::load(sqlite_store(&dir)).unwrap();
    assert_eq!(reloaded.history("der Hund"), history);
    assert_eq!(machine.history().unwrap().len(), 3);
}

#[test]
fn interrupted_session_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir);
    let vocabulary = Vocabulary::load(store.clone(), "german").unwrap();
    let words = vocabulary.words();

    let snapshot = {
        let mut ledger = PerformanceLedger::load(store.clone()).unwrap();
        let machine = SessionMachine::new(store.clone());
        let config = SessionConfig::new(8, SessionType::Mixed).unwrap();
        let mut session = machine.start_session(&config, &words, &ledger).unwrap();

        machine
            .record_outcome(&mut session, &mut ledger, true, false)
            .unwrap();
        machine
            .record_outcome(&mut session, &mut ledger, false, false)
            .unwrap();
        machine.navigate_backward(&mut session).unwrap();
        session
    };

    let store = sqlite_store(&dir);
    let machine = SessionMachine::new(store.clone());
    let ledger = PerformanceLedger::load(store).unwrap();
    let resumed = machine.resume().unwrap().expect("checkpoint should survive");

    assert_eq!(resumed, snapshot);
    assert_eq!(resumed.current_index, 1);
    assert!(resumed.is_current_card_visited());
    assert_eq!(machine.phase().unwrap(), SessionPhase::Active);

    let current = machine.current_word(&resumed, &words, &ledger).unwrap();
    assert_eq!(current.text, resumed.cards[1].text);
    assert_eq!(current.last_results, vec![Wrong]);
}

#[test]
fn counts_match_distinct_answers_through_a_messy_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir);
    let mut ledger = PerformanceLedger::load(store.clone()).unwrap();
    let machine = SessionMachine::new(store);
    let words: Vec<Word> = (0..6).map(|i| Word::new(format!("w{i}"), "")).collect();
    let config = SessionConfig::new(6, SessionType::Mixed).unwrap();
    let mut session = machine.start_session(&config, &words, &ledger).unwrap();

    let check = |s: &wortdrill::SessionProgress| {
        let counted = s.correct_count + s.incorrect_count + s.practice_again_count;
        assert_eq!(counted as usize, s.committed.len());
    };

    machine.record_outcome(&mut session, &mut ledger, true, false).unwrap();
    check(&session);
    machine.record_outcome(&mut session, &mut ledger, false, true).unwrap();
    check(&session);
    machine.navigate_backward(&mut session).unwrap();
    machine.navigate_backward(&mut session).unwrap();
    machine.record_outcome(&mut session, &mut ledger, false, false).unwrap();
    check(&session);
    machine.navigate_forward(&mut session).unwrap();
    machine.navigate_forward(&mut session).unwrap();
    assert!(!session.is_current_card_visited());
    machine.record_outcome(&mut session, &mut ledger, true, false).unwrap();
    check(&session);

    assert_eq!(session.correct_count, 1);
    assert_eq!(session.incorrect_count, 1);
    assert_eq!(session.practice_again_count, 1);

    while !session.is_complete() {
        machine.record_outcome(&mut session, &mut ledger, true, false).unwrap();
        check(&session);
    }
    let last = machine.history().unwrap().pop().unwrap();
    assert_eq!(last.answered, 5);
    assert_eq!(last.correct, 3);
    assert_eq!(last.incorrect, 1);
    assert_eq!(last.success_rate, 75);
}

#[test]
fn twenty_card_session_over_five_words() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir);
    let ledger = PerformanceLedger::load(store.clone()).unwrap();
    let machine = SessionMachine::new(store);
    let words: Vec<Word> = ["eins", "zwei", "drei", "vier", "fünf"]
        .iter()
        .map(|w| Word::new(*w, ""))
        .collect();

    for _ in 0..20 {
        let session = machine
            .start_session(&SessionConfig::default(), &words, &ledger)
            .unwrap();
        let unique: HashSet<&str> = session.cards.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(session.total_cards(), 5);
        assert_eq!(unique.len(), 5);
    }
}

#[test]
fn mastering_every_word_ends_the_drill() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir);
    let mut ledger = PerformanceLedger::load(store.clone()).unwrap();
    let machine = SessionMachine::new(store);
    let words = vec![Word::new("ja", "yes"), Word::new("nein", "no")];
    let config = SessionConfig::new(2, SessionType::Mixed).unwrap();

    for _ in 0..3 {
        let mut session = machine.start_session(&config, &words, &ledger).unwrap();
        while !session.is_complete() {
            machine.record_outcome(&mut session, &mut ledger, true, false).unwrap();
        }
    }

    assert!(SelectionEngine.select_next(&words, &ledger).is_none());
    let err = machine.start_session(&config, &words, &ledger).unwrap_err();
    assert!(matches!(err, wortdrill::session::SessionError::NothingToStudy));

    // one miss brings a word back
    ledger.record_outcome("nein", Wrong).unwrap();
    let back = SelectionEngine.select_next(&words, &ledger).unwrap();
    assert_eq!(back.text, "nein");
    assert_eq!(back.score, 2);
}
