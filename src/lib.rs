// Library surface shared by the binary and the integration tests.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod ledger;
pub mod pronunciation;
pub mod selection;
pub mod session;
pub mod store;
pub mod util;
pub mod vocabulary;

pub use ledger::{Outcome, PerformanceLedger, WordHistory};
pub use selection::{SelectionEngine, SessionType, WordSelector};
pub use session::{SessionConfig, SessionMachine, SessionProgress, Step};
pub use store::{KeyValueStore, MemoryStore, SharedStore, SqliteStore};
pub use vocabulary::{Vocabulary, Word};
