use std::{cmp::Ordering, time::Duration};

use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Timeout for the `uci` / `uciok` handshake
pub const ENGINE_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for an `isready` / `readyok` round trip
pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Depth used when a request carries no explicit limit
pub const DEFAULT_SEARCH_DEPTH: u32 = 10;

/// Minimum thread count for budgeted (nodes / time) searches on capable hosts
pub const MIN_BUDGET_THREADS: u32 = 2;

/// Maximum thread count for budgeted (nodes / time) searches
pub const MAX_BUDGET_THREADS: u32 = 4;

/// Centipawn magnitude used when a mate score has to be folded into centipawns
pub const MATE_SCORE_CP: i32 = 10_000;

/// Ordering key base for mate scores in multi-line ranking
pub const MATE_RANK_BASE: i64 = 100_000;

// =============================================================================
// Error Types
// =============================================================================

/// Error type for engine adapter operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine initialization timeout")]
    InitializationTimeout,

    #[error("Engine did not answer readyok in time")]
    ReadyTimeout,

    #[error("A search is already in progress")]
    SearchInProgress,

    #[error("Search aborted")]
    Aborted,

    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("Engine connection closed")]
    Disconnected,

    #[error("No stdin handle available")]
    NoStdin,

    #[error("No stdout handle available")]
    NoStdout,

    #[error("Broken pipe")]
    BrokenPipe,
}

pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Core Engine Types
// =============================================================================

/// Adapter lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// No handshake has completed (initial state and after shutdown)
    Uninitialized,
    /// `uci` sent, waiting for `uciok`
    Initializing,
    /// Engine accepts a new search
    Ready,
    /// A search owns the engine until `bestmove` or cancellation
    Searching,
}

/// Search limit sent with `go`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "c")]
pub enum GoMode {
    /// Search to a fixed depth
    Depth(u32),
    /// Search a fixed number of nodes
    Nodes(u64),
    /// Search for a fixed time in milliseconds
    Time(u64),
}

impl GoMode {
    /// Format as a UCI `go` command
    pub fn to_command(&self) -> String {
        match self {
            GoMode::Depth(depth) => format!("go depth {}", depth),
            GoMode::Nodes(nodes) => format!("go nodes {}", nodes),
            GoMode::Time(ms) => format!("go movetime {}", ms),
        }
    }

    /// Whether the limit is a node or time budget rather than a fixed depth
    pub fn is_budgeted(&self) -> bool {
        !matches!(self, GoMode::Depth(_))
    }
}

/// Options for a single search request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub movetime_ms: Option<u64>,
    pub multipv: Option<u16>,
    pub threads: Option<u32>,
    pub skill_level: Option<u8>,
    pub contempt: Option<i32>,
}

impl SearchOptions {
    /// Resolve the search limit; depth wins over nodes, nodes over time
    pub fn go_mode(&self) -> GoMode {
        if let Some(depth) = self.depth {
            GoMode::Depth(depth)
        } else if let Some(nodes) = self.nodes {
            GoMode::Nodes(nodes)
        } else if let Some(ms) = self.movetime_ms {
            GoMode::Time(ms)
        } else {
            GoMode::Depth(DEFAULT_SEARCH_DEPTH)
        }
    }

    pub fn multipv(&self) -> u16 {
        self.multipv.unwrap_or(1).max(1)
    }
}

/// Engine evaluation from the side to move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Score {
    Centipawns(i32),
    /// Moves to mate; negative when the side to move gets mated
    Mate(i32),
}

impl Score {
    pub fn score_cp(&self) -> Option<i32> {
        match self {
            Score::Centipawns(cp) => Some(*cp),
            Score::Mate(_) => None,
        }
    }

    pub fn mate_in(&self) -> Option<i32> {
        match self {
            Score::Mate(n) => Some(*n),
            Score::Centipawns(_) => None,
        }
    }

    /// Same evaluation from the opponent's point of view
    pub fn negate(self) -> Score {
        match self {
            Score::Centipawns(cp) => Score::Centipawns(-cp),
            Score::Mate(n) => Score::Mate(-n),
        }
    }

    /// Centipawn view of the score; mates fold into +-MATE_SCORE_CP, closer mates larger
    pub fn to_cp(&self) -> i32 {
        match *self {
            Score::Centipawns(cp) => cp,
            Score::Mate(n) if n > 0 => MATE_SCORE_CP - n.min(100) * 10,
            Score::Mate(n) => -MATE_SCORE_CP + n.abs().min(100) * 10,
        }
    }

    /// Ranking key: any winning mate above every centipawn value, any losing mate below
    pub fn rank_key(&self) -> i64 {
        match *self {
            Score::Centipawns(cp) => cp as i64,
            Score::Mate(n) if n > 0 => MATE_RANK_BASE - n as i64,
            Score::Mate(n) => -MATE_RANK_BASE + (n as i64).abs(),
        }
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_key().cmp(&other.rank_key())
    }
}

/// One principal variation reported under a multipv index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvLine {
    pub multipv: u16,
    pub score: Score,
    pub pv: Vec<String>,
    pub best_move: String,
}

impl PvLine {
    pub fn new(multipv: u16, score: Score, pv: Vec<String>) -> Self {
        let best_move = pv.first().cloned().unwrap_or_default();
        Self {
            multipv,
            score,
            pv,
            best_move,
        }
    }

    pub fn score_cp(&self) -> Option<i32> {
        self.score.score_cp()
    }

    pub fn mate_in(&self) -> Option<i32> {
        self.score.mate_in()
    }
}

/// Final outcome of one `go` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub best_move: String,
    pub ponder: Option<String>,
    pub score: Option<Score>,
    pub pv: Vec<String>,
    /// Ordered by ascending multipv index
    pub lines: Vec<PvLine>,
}

impl SearchResult {
    pub fn top_line(&self) -> Option<&PvLine> {
        self.lines.first()
    }
}

/// Protocol traffic record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum EngineLog {
    Gui(String),
    Engine(String),
}

// =============================================================================
// Tests
// =============================================================================
