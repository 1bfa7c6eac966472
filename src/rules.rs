use serde::{Deserialize, Serialize};
use shakmaty::{
    fen::Fen,
    san::SanPlus,
    uci::UciMove,
    CastlingMode, Chess, EnPassantMode, Move, Position,
};

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("FEN parsing error: {0}")]
    FenParsing(#[from] shakmaty::fen::ParseFenError),

    #[error("Position setup error: {0}")]
    PositionSetup(#[from] shakmaty::PositionError<Chess>),

    #[error("Illegal move: {0}")]
    IllegalMove(String),
}

/// Whether play can continue after a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    Ongoing,
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
}

impl GameStatus {
    pub fn is_over(&self) -> bool {
        !matches!(self, GameStatus::Ongoing)
    }
}

/// A validated move and the position it leads to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub uci: String,
    pub san: String,
    pub fen: String,
    pub status: GameStatus,
}

/// Move legality and position bookkeeping
pub trait RulesEngine {
    /// Validate `mv` (coordinate or algebraic notation) in `fen` and play it
    fn apply_move(&self, fen: &str, mv: &str) -> Result<MoveOutcome, RulesError>;

    fn status(&self, fen: &str) -> Result<GameStatus, RulesError>;
}

/// [`RulesEngine`] for standard chess
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyRules;

impl ShakmatyRules {
    fn position(fen: &str) -> Result<Chess, RulesError> {
        let fen = Fen::from_ascii(fen.trim().as_bytes())?;
        Ok(fen.into_position(CastlingMode::Standard)?)
    }

    fn parse_move(pos: &Chess, mv: &str) -> Result<Move, RulesError> {
        let mv = mv.trim();
        if let Ok(uci) = UciMove::from_ascii(mv.as_bytes()) {
            if let Ok(m) = uci.to_move(pos) {
                return Ok(m);
            }
        }
        if let Ok(san) = SanPlus::from_ascii(mv.as_bytes()) {
            if let Ok(m) = san.san.to_move(pos) {
                return Ok(m);
            }
        }
        Err(RulesError::IllegalMove(mv.to_string()))
    }

    fn status_of(pos: &Chess) -> GameStatus {
        if pos.is_checkmate() {
            GameStatus::Checkmate
        } else if pos.is_stalemate() {
            GameStatus::Stalemate
        } else if pos.is_insufficient_material() {
            GameStatus::InsufficientMaterial
        } else if pos.halfmoves() >= 100 {
            GameStatus::FiftyMoveRule
        } else {
            GameStatus::Ongoing
        }
    }
}

impl RulesEngine for ShakmatyRules {
    fn apply_move(&self, fen: &str, mv: &str) -> Result<MoveOutcome, RulesError> {
        let mut pos = Self::position(fen)?;
        let m = Self::parse_move(&pos, mv)?;
        let uci = UciMove::from_move(&m, CastlingMode::Standard).to_string();
        let san = SanPlus::from_move_and_play_unchecked(&mut pos, &m).to_string();

        Ok(MoveOutcome {
            uci,
            san,
            fen: Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string(),
            status: Self::status_of(&pos),
        })
    }

    fn status(&self, fen: &str) -> Result<GameStatus, RulesError> {
        Ok(Self::status_of(&Self::position(fen)?))
    }
}
