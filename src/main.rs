use clap::{Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use wortdrill::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    session::{CardAnswer, SessionError, SessionProgress, SessionRecord},
    vocabulary::{Deck, VocabularyError},
    PerformanceLedger, SessionMachine, SessionType, SharedStore, SqliteStore, Step, Vocabulary,
};

/// adaptive vocabulary drills that focus on the words you keep missing
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Vocabulary drills that remember your last three answers per word, show weak words more often and retire words you have answered correctly three times in a row."
)]
pub struct Cli {
    /// progress database to use (default: ~/.local/state/wortdrill/wortdrill.db)
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// config file to use instead of the platform default
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// run (or resume) a drill session on the terminal
    Drill {
        /// number of cards in a new session
        #[clap(short = 'n', long)]
        cards: Option<usize>,

        /// which words a new session draws from
        #[clap(short = 't', long, value_enum)]
        session_type: Option<SessionTypeArg>,
    },
    /// show learning progress across the deck
    Stats,
    /// list recently finished sessions
    History {
        #[clap(short = 'n', long, default_value_t = 10)]
        last: usize,
    },
    /// clear the answer history of one word, or of every word
    Reset { word: Option<String> },
    /// recompute cached scores from stored answer histories
    Migrate,
    /// add a custom word (replaces a deck word with the same text)
    Add { word: String, translation: String },
    /// bookmark a word
    Bookmark {
        word: String,
        #[clap(long)]
        remove: bool,
    },
    /// show pronunciation cache statistics (expired entries are dropped on load)
    Cache {
        /// drop every cached pronunciation
        #[clap(long)]
        clear: bool,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum, strum_macros::Display)]
enum SessionTypeArg {
    Mixed,
    New,
    Review,
    Difficult,
}

impl From<SessionTypeArg> for SessionType {
    fn from(arg: SessionTypeArg) -> Self {
        match arg {
            SessionTypeArg::Mixed => SessionType::Mixed,
            SessionTypeArg::New => SessionType::New,
            SessionTypeArg::Review => SessionType::Review,
            SessionTypeArg::Difficult => SessionType::Difficult,
        }
    }
}

struct App {
    config: Config,
    store: SharedStore,
    vocabulary: Vocabulary,
    ledger: PerformanceLedger,
    machine: SessionMachine,
}

impl App {
    fn open(cli: &Cli) -> Result<Self, Box<dyn Error>> {
        let config_store = match &cli.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        };
        let config = config_store.load();

        let db_path = cli
            .db
            .clone()
            .or_else(AppDirs::db_path)
            .unwrap_or_else(|| PathBuf::from("wortdrill.db"));
        log::debug!("using database {}", db_path.display());
        let store: SharedStore = Arc::new(SqliteStore::open(&db_path)?);

        let vocabulary = match Vocabulary::load(store.clone(), &config.deck) {
            Err(VocabularyError::DeckNotFound(name)) => {
                let available = Deck::available().join(", ");
                return Err(format!("unknown deck '{name}' (available: {available})").into());
            }
            loaded => loaded?,
        };

        Ok(Self {
            vocabulary,
            ledger: PerformanceLedger::load(store.clone())?,
            machine: SessionMachine::new(store.clone()),
            store,
            config,
        })
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let mut app = App::open(&cli)?;

    match cli.command {
        Command::Drill {
            cards,
            session_type,
        } => drill(&mut app, cards, session_type.map(SessionType::from)),
        Command::Stats => stats(&app),
        Command::History { last } => history(&app, last),
        Command::Reset { word } => {
            match word {
                Some(word) => {
                    app.ledger.reset(&word)?;
                    println!("cleared progress for '{word}'");
                }
                None => {
                    app.ledger.reset_all()?;
                    println!("cleared progress for every word");
                }
            }
            Ok(())
        }
        Command::Migrate => {
            let changed = app.ledger.recalculate_all(&app.vocabulary.words())?;
            println!("recalculated {changed} word scores");
            Ok(())
        }
        Command::Add { word, translation } => {
            let added = app.vocabulary.add_custom_word(&word, &translation)?;
            println!("added '{}' = '{}'", added.text, added.translation);
            Ok(())
        }
        Command::Bookmark { word, remove } => {
            app.vocabulary.set_bookmarked(&word, !remove)?;
            let state = if remove { "removed bookmark from" } else { "bookmarked" };
            println!("{state} '{word}'");
            Ok(())
        }
        Command::Cache { clear } => cache(&app, clear),
    }
}

fn drill(
    app: &mut App,
    cards: Option<usize>,
    session_type: Option<SessionType>,
) -> Result<(), Box<dyn Error>> {
    let words = app.vocabulary.words();
    let mut session = match app.machine.resume()? {
        Some(session) if session.is_awaiting_archive() => {
            println!("archiving the interrupted session");
            session
        }
        Some(session) => {
            println!(
                "resuming session at card {}/{}",
                session.current_index + 1,
                session.total_cards()
            );
            session
        }
        None => {
            let mut config = app.config.session_config();
            if let Some(cards) = cards {
                config.cards_per_session = cards;
            }
            if let Some(kind) = session_type {
                config.session_type = kind;
            }
            match app.machine.start_session(&config, &words, &app.ledger) {
                Ok(session) => session,
                Err(SessionError::NothingToStudy) => {
                    println!("nothing left to study in this selection: every word is mastered");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        let Some(word) = app.machine.current_word(&session, &words, &app.ledger) else {
            if session.is_awaiting_archive() {
                let record = app.machine.end_early(&mut session)?;
                print_summary(&session, &record);
            }
            break;
        };
        let marker = if word.bookmarked { " *" } else { "" };
        print!(
            "[{}/{}] {}{}  (y)es (n)o (a)gain (s)how (b)ack (f)orward (q)uit > ",
            session.current_index + 1,
            session.total_cards(),
            word.text,
            marker
        );
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => "q".to_string(),
        };

        let step = match line.trim() {
            "y" => Some(app.machine.record_outcome(&mut session, &mut app.ledger, true, false)?),
            "n" => Some(app.machine.record_outcome(&mut session, &mut app.ledger, false, false)?),
            "a" => Some(app.machine.record_outcome(&mut session, &mut app.ledger, false, true)?),
            "s" => {
                println!("  = {}", word.translation);
                None
            }
            "b" => {
                if !app.machine.navigate_backward(&mut session)? {
                    println!("  already at the first card");
                }
                None
            }
            "f" => {
                if !app.machine.navigate_forward(&mut session)? {
                    println!("  already at the last card");
                }
                None
            }
            "q" => Some(Step::Completed(app.machine.end_early(&mut session)?)),
            _ => None,
        };

        if let Some(Step::Completed(record)) = step {
            print_summary(&session, &record);
            break;
        }
    }
    Ok(())
}

fn print_summary(session: &SessionProgress, record: &SessionRecord) {
    println!();
    println!(
        "{} of {} cards answered: {} correct, {} wrong, {} to practice again ({}%)",
        record.answered,
        record.total_cards,
        record.correct,
        record.incorrect,
        record.practice_again,
        record.success_rate
    );

    let missed = session
        .committed
        .iter()
        .filter(|(_, answer)| **answer != CardAnswer::Correct)
        .filter_map(|(idx, _)| session.cards.get(*idx))
        .map(|w| w.text.as_str())
        .join(", ");
    if !missed.is_empty() {
        println!("keep practising: {missed}");
    }
}

fn stats(app: &App) -> Result<(), Box<dyn Error>> {
    let words = app.vocabulary.words();
    let summary = app.ledger.summary(&words);
    println!("deck: {}", app.vocabulary.deck_name());
    println!("words: {}", summary.total);
    println!("  mastered: {}", summary.mastered);
    println!("  learning: {}", summary.learning);
    println!("  unseen:   {}", summary.unseen);
    if let Some(session) = app.machine.resume()? {
        println!(
            "unfinished session at card {}/{}",
            session.current_index + 1,
            session.total_cards()
        );
    }
    Ok(())
}

fn history(app: &App, last: usize) -> Result<(), Box<dyn Error>> {
    let records = app.machine.history()?;
    if records.is_empty() {
        println!("no finished sessions yet");
        return Ok(());
    }
    for record in records.iter().rev().take(last) {
        println!(
            "{}  {:<9} {:>3}/{:<3} {:>3}%{}",
            record.finished_at.format("%Y-%m-%d %H:%M"),
            record.session_type,
            record.answered,
            record.total_cards,
            record.success_rate,
            if record.ended_early { "  (ended early)" } else { "" }
        );
    }
    Ok(())
}

fn cache(app: &App, clear: bool) -> Result<(), Box<dyn Error>> {
    let mut cache = app.config.pronunciation_cache(app.store.clone())?;
    if clear {
        cache.clear()?;
    }

    let stats = cache.stats();
    println!("cached pronunciations: {}", stats.count);
    println!("total size: {} bytes", stats.total_bytes);
    println!("total plays from cache: {}", stats.total_accesses);
    if let Some(word) = stats.most_accessed_word {
        println!("most played: {word}");
    }
    Ok(())
}
