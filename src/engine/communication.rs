use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
};

use log::{trace, warn};
use tokio::sync::mpsc;
use vampirc_uci::{parse_one, uci::ScoreValue, UciInfoAttribute, UciMessage};

use super::types::{PvLine, Score, SearchResult};

// =============================================================================
// Line Parsing
// =============================================================================

/// The subset of engine output the adapter reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    UciOk,
    ReadyOk,
    Info(InfoUpdate),
    BestMove {
        best_move: String,
        ponder: Option<String>,
    },
    /// Anything else, including lines that fail to parse
    Other,
}

/// Fields of an `info` line relevant to multi-line search snapshots
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InfoUpdate {
    pub multipv: Option<u16>,
    pub depth: Option<u32>,
    pub score: Option<Score>,
    pub pv: Vec<String>,
}

/// Parse one line of engine output
pub fn parse_engine_line(line: &str) -> EngineMessage {
    let line = line.trim();
    if line.is_empty() {
        return EngineMessage::Other;
    }

    match parse_one(line) {
        UciMessage::UciOk => EngineMessage::UciOk,
        UciMessage::ReadyOk => EngineMessage::ReadyOk,
        UciMessage::Info(attrs) => EngineMessage::Info(parse_info_attributes(attrs)),
        UciMessage::BestMove { best_move, ponder } => EngineMessage::BestMove {
            best_move: best_move.to_string(),
            ponder: ponder.map(|p| p.to_string()),
        },
        _ if line.starts_with("bestmove") => parse_bestmove_tokens(line),
        _ => {
            trace!("Ignoring engine line: {}", line);
            EngineMessage::Other
        }
    }
}

fn parse_info_attributes(attrs: Vec<UciInfoAttribute>) -> InfoUpdate {
    let mut update = InfoUpdate::default();

    for attr in attrs {
        match attr {
            UciInfoAttribute::MultiPv(multipv) => update.multipv = Some(multipv),
            UciInfoAttribute::Depth(depth) => update.depth = Some(depth as u32),
            UciInfoAttribute::Score(score) => {
                update.score = Some(match score.value {
                    ScoreValue::Cp(cp) => Score::Centipawns(cp as i32),
                    ScoreValue::Mate(n) => Score::Mate(n as i32),
                });
            }
            UciInfoAttribute::Pv(moves) => {
                update.pv = moves.iter().map(|m| m.to_string()).collect();
            }
            _ => {}
        }
    }

    update
}

/// Fallback for `bestmove` lines the UCI parser rejects, such as `bestmove (none)`
fn parse_bestmove_tokens(line: &str) -> EngineMessage {
    let mut tokens = line.split_whitespace().skip(1);
    let Some(best_move) = tokens.next() else {
        warn!("bestmove line without a move: {}", line);
        return EngineMessage::Other;
    };

    let ponder = match (tokens.next(), tokens.next()) {
        (Some("ponder"), Some(p)) => Some(p.to_string()),
        _ => None,
    };

    EngineMessage::BestMove {
        best_move: best_move.to_string(),
        ponder,
    }
}

// =============================================================================
// Search Snapshot
// =============================================================================

#[derive(Debug, Clone, Default)]
struct SnapshotEntry {
    score: Option<Score>,
    pv: Vec<String>,
}

/// Latest score and principal variation per multipv index for one search
#[derive(Debug, Clone, Default)]
pub struct SearchSnapshot {
    entries: BTreeMap<u16, SnapshotEntry>,
}

impl SearchSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an info update; score and pv are replaced independently
    pub fn apply(&mut self, info: InfoUpdate) {
        if info.score.is_none() && info.pv.is_empty() {
            return;
        }

        let index = info.multipv.unwrap_or(1).max(1);
        let entry = self.entries.entry(index).or_default();
        if let Some(score) = info.score {
            entry.score = Some(score);
        }
        if !info.pv.is_empty() {
            entry.pv = info.pv;
        }
    }

    /// Assemble the final result; lines that never reported a score are dropped
    pub fn into_result(self, best_move: String, ponder: Option<String>) -> SearchResult {
        let lines: Vec<PvLine> = self
            .entries
            .into_iter()
            .filter_map(|(index, entry)| entry.score.map(|score| PvLine::new(index, score, entry.pv)))
            .collect();

        let score = lines.first().map(|l| l.score);
        let pv = lines.first().map(|l| l.pv.clone()).unwrap_or_default();

        let best_move = if best_move.is_empty() || best_move == "(none)" || best_move == "0000" {
            lines
                .first()
                .map(|l| l.best_move.clone())
                .filter(|m| !m.is_empty())
                .unwrap_or(best_move)
        } else {
            best_move
        };

        SearchResult {
            best_move,
            ponder,
            score,
            pv,
            lines,
        }
    }
}

// =============================================================================
// Listener Registry
// =============================================================================

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
}

impl RegistryInner {
    fn listeners(&self) -> MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<String>>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fan-out point for inbound engine lines
///
/// Every registered listener receives every line. Listeners are owned by
/// [`Subscription`] guards and deregister themselves when dropped.
#[derive(Debug, Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener that sees every line dispatched from now on
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.listeners().insert(id, tx);
        trace!("Registered engine listener {}", id);

        Subscription {
            id,
            receiver: rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver a line to every live listener; returns how many received it
    pub fn dispatch(&self, line: &str) -> usize {
        let mut listeners = self.inner.listeners();
        listeners.retain(|_, tx| tx.send(line.to_string()).is_ok());
        listeners.len()
    }

    /// Drop every listener; pending receivers observe a closed stream
    pub fn clear(&self) {
        self.inner.listeners().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.listeners().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scoped listener registration
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<String>,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    /// Next line, or `None` once the registry dropped this listener
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.listeners().remove(&self.id);
            trace!("Removed engine listener {}", self.id);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
