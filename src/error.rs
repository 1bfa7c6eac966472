use serde::{Serialize, Serializer};

use crate::{engine::EngineError, rules::RulesError};

/// Crate-wide error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Search returned no candidate lines")]
    NoCandidateLines,

    #[error("Resignation assessment failed: {0}")]
    ResignationAssessment(String),

    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No game in progress")]
    NoGame,

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Not the {0}'s turn")]
    OutOfTurn(&'static str),

    #[error("Game still in progress")]
    GameInProgress,
}

impl Error {
    /// Whether the error only reports a cancelled search
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Engine(EngineError::Aborted))
    }
}

impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
