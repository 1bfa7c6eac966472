pub mod config;
pub mod engine;
pub mod error;
pub mod play;
pub mod review;
pub mod rules;
pub mod session;
pub mod store;

pub use config::CoachConfig;
pub use engine::{CancelToken, EngineAdapter, SearchEngine};
pub use error::{Error, Result};
pub use rules::{RulesEngine, ShakmatyRules, STARTING_FEN};
pub use session::{EngineTurn, GameReport, GameSession};
pub use store::{AnnotationStore, MemoryStore, SettingsStore, SqliteStore};
