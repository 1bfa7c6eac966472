//! One game against the adaptive opponent.
//!
//! The player owns the odd plies and moves first from the starting position
//! handed to [`GameSession::start`]. Every played move is scored from its
//! mover's point of view, annotated and persisted; the engine's own replies go
//! through level mapping, resignation and top-K selection before they reach
//! the board.

use std::collections::HashMap;

use log::{debug, info};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

use crate::{
    config::CoachConfig,
    engine::{CancelToken, Score, SearchEngine, SearchOptions, MATE_SCORE_CP},
    error::{Error, Result},
    play::{
        choose_reply, map_level, rank_lines, MicroAdjustController, ResignationController, MAX_LEVEL,
    },
    review::{
        apply_level_update, classify, compute_gps, game_stats, CoachingContext, GameStatsForGps,
        LevelUpdate, MoveEvaluation, PlyAnnotation, DEFAULT_LEVEL,
    },
    rules::{GameStatus, MoveOutcome, RulesEngine},
    store::{AnnotationStore, SettingsStore},
};

/// What the engine did with its turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum EngineTurn {
    Moved {
        annotation: PlyAnnotation,
        /// Level the reply was chosen at, after micro-adjustment
        level: u8,
    },
    Resigned,
}

/// End-of-game summary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameReport {
    pub stats: GameStatsForGps,
    pub gps: f64,
    pub level: LevelUpdate,
}

/// Side-to-move evaluation of a position
#[derive(Debug, Clone)]
struct Evaluation {
    score: Score,
    pv: Vec<String>,
}

impl Evaluation {
    fn best_move(&self) -> Option<String> {
        self.pv.first().cloned()
    }
}

/// Evaluation of the position a move came from, seen by the mover
fn before_view(score: Score) -> (i32, Option<i32>) {
    (score.to_cp(), score.mate_in())
}

/// Evaluation of the position a move led to, seen by the mover
fn after_view(score: Score) -> (i32, Option<i32>) {
    match score {
        Score::Mate(0) => (MATE_SCORE_CP, Some(0)),
        other => {
            let mover = other.negate();
            (mover.to_cp(), mover.mate_in())
        }
    }
}

pub struct GameSession<E, S, R> {
    engine: E,
    store: S,
    rules: R,
    eval_depth: u32,
    level_override: Option<u8>,
    rng: StdRng,

    game_id: String,
    fen: String,
    /// Position before each played ply
    positions: Vec<String>,
    annotations: Vec<PlyAnnotation>,
    refutations: HashMap<u32, Vec<String>>,
    evaluations: HashMap<String, Evaluation>,
    status: GameStatus,
    result: Option<i32>,
    started: bool,

    base_level: u8,
    micro: MicroAdjustController,
    resignation: ResignationController,
}

impl<E, S, R> GameSession<E, S, R>
where
    E: SearchEngine,
    S: SettingsStore + AnnotationStore,
    R: RulesEngine,
{
    pub fn new(engine: E, store: S, rules: R, config: &CoachConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            engine,
            store,
            rules,
            eval_depth: config.eval_depth,
            level_override: config.level_override,
            rng,
            game_id: String::new(),
            fen: String::new(),
            positions: Vec::new(),
            annotations: Vec::new(),
            refutations: HashMap::new(),
            evaluations: HashMap::new(),
            status: GameStatus::Ongoing,
            result: None,
            started: false,
            base_level: DEFAULT_LEVEL,
            micro: MicroAdjustController::new(),
            resignation: ResignationController::with_probe_depth(config.probe_depth),
        }
    }

    /// Begin a new game from `fen` with the player to move
    pub fn start(&mut self, game_id: impl Into<String>, fen: &str) -> Result<()> {
        let status = self.rules.status(fen)?;

        self.base_level = match self.level_override {
            Some(level) => level,
            None => self.store.get_level()?.unwrap_or(DEFAULT_LEVEL),
        };
        self.game_id = game_id.into();
        self.fen = fen.trim().to_string();
        self.positions.clear();
        self.annotations.clear();
        self.refutations.clear();
        self.evaluations.clear();
        self.status = status;
        self.result = None;
        self.started = true;
        self.micro.reset();
        self.resignation.reset();

        info!("Game {} started at level {}", self.game_id, self.base_level);
        Ok(())
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// `1` player won, `0` draw, `-1` player lost; `None` while undecided
    pub fn result(&self) -> Option<i32> {
        self.result
    }

    pub fn annotations(&self) -> &[PlyAnnotation] {
        &self.annotations
    }

    pub fn base_level(&self) -> u8 {
        self.base_level
    }

    /// Level the engine would play at on its next move
    pub fn effective_level(&self) -> u8 {
        self.micro.effective_level(self.base_level as f64)
    }

    pub fn is_player_turn(&self) -> bool {
        self.annotations.len() % 2 == 0
    }

    fn next_ply(&self) -> u32 {
        self.annotations.len() as u32 + 1
    }

    fn ensure_playable(&self) -> Result<()> {
        if !self.started || self.status.is_over() || self.result.is_some() {
            return Err(Error::NoGame);
        }
        Ok(())
    }

    async fn evaluate(&mut self, fen: &str) -> Result<Evaluation> {
        if let Some(cached) = self.evaluations.get(fen) {
            return Ok(cached.clone());
        }

        let evaluation = match self.rules.status(fen)? {
            GameStatus::Checkmate => Evaluation {
                score: Score::Mate(0),
                pv: Vec::new(),
            },
            status if status.is_over() => Evaluation {
                score: Score::Centipawns(0),
                pv: Vec::new(),
            },
            _ => {
                let options = SearchOptions {
                    depth: Some(self.eval_depth),
                    multipv: Some(1),
                    skill_level: Some(MAX_LEVEL),
                    contempt: Some(0),
                    ..Default::default()
                };
                let result = self.engine.search(fen, &options, None).await?;
                let line = result.top_line().ok_or(Error::NoCandidateLines)?;
                Evaluation {
                    score: line.score,
                    pv: line.pv.clone(),
                }
            }
        };

        self.evaluations.insert(fen.to_string(), evaluation.clone());
        Ok(evaluation)
    }

    fn commit(&mut self, outcome: &MoveOutcome, annotation: PlyAnnotation) -> Result<()> {
        self.store.upsert_annotation(&self.game_id, &annotation)?;

        let mover_is_player = annotation.is_player_ply();
        self.positions.push(std::mem::replace(&mut self.fen, outcome.fen.clone()));
        self.annotations.push(annotation);
        self.status = outcome.status;

        self.result = match outcome.status {
            GameStatus::Ongoing => None,
            GameStatus::Checkmate if mover_is_player => Some(1),
            GameStatus::Checkmate => Some(-1),
            _ => Some(0),
        };
        if let Some(result) = self.result {
            info!("Game {} over: {:?} ({})", self.game_id, outcome.status, result);
        }
        Ok(())
    }

    /// Play and annotate the player's move (coordinate or algebraic notation)
    pub async fn play_player_move(&mut self, mv: &str) -> Result<PlyAnnotation> {
        self.ensure_playable()?;
        if !self.is_player_turn() {
            return Err(Error::OutOfTurn("player"));
        }

        let fen_before = self.fen.clone();
        let outcome = self.rules.apply_move(&fen_before, mv)?;

        let before = self.evaluate(&fen_before).await?;
        let after = self.evaluate(&outcome.fen).await?;

        let (eval_before, mate_before) = before_view(before.score);
        let (eval_after, mate_after) = after_view(after.score);
        let eval = MoveEvaluation {
            eval_before,
            eval_after,
            mate_before,
            mate_after,
        };
        let classification = classify(&eval);
        self.micro.update(eval_after);

        let ply = self.next_ply();
        let annotation = PlyAnnotation::new(
            ply,
            outcome.san.clone(),
            outcome.uci.clone(),
            outcome.fen.clone(),
            &eval,
            &classification,
        )
        .with_best_move(before.best_move());

        debug!(
            "Ply {} {}: {} -> {} ({})",
            ply, annotation.san, eval_before, eval_after, annotation.classification
        );

        if !after.pv.is_empty() {
            self.refutations.insert(ply, after.pv);
        }
        self.commit(&outcome, annotation.clone())?;
        Ok(annotation)
    }

    /// Let the engine answer, or resign
    pub async fn play_engine_move(&mut self, cancel: Option<&CancelToken>) -> Result<EngineTurn> {
        self.ensure_playable()?;
        if self.is_player_turn() {
            return Err(Error::OutOfTurn("engine"));
        }

        let level = self.effective_level();
        let options = map_level(level as f64);
        let result = self
            .engine
            .search(&self.fen, &options.search_options(), cancel)
            .await?;

        if self
            .resignation
            .assess(&self.engine, &self.fen, &result, cancel)
            .await
        {
            info!("Engine resigns game {}", self.game_id);
            self.result = Some(1);
            return Ok(EngineTurn::Resigned);
        }

        let chosen = choose_reply(&result.lines, &options, &mut self.rng)?.clone();
        let top = rank_lines(&result.lines)
            .first()
            .map(|line| line.score)
            .unwrap_or(chosen.score);
        let outcome = self.rules.apply_move(&self.fen, &chosen.best_move)?;

        let (eval_before, mate_before) = before_view(top);
        let (eval_after, mate_after) = if outcome.status == GameStatus::Checkmate {
            (MATE_SCORE_CP, Some(0))
        } else {
            before_view(chosen.score)
        };
        let eval = MoveEvaluation {
            eval_before,
            eval_after,
            mate_before,
            mate_after,
        };

        let ply = self.next_ply();
        let best = rank_lines(&result.lines)
            .first()
            .map(|line| line.best_move.clone());
        let annotation = PlyAnnotation::new(
            ply,
            outcome.san.clone(),
            outcome.uci.clone(),
            outcome.fen.clone(),
            &eval,
            &classify(&eval),
        )
        .with_best_move(best);

        debug!("Engine plays {} at level {}", annotation.san, level);
        self.commit(&outcome, annotation.clone())?;
        Ok(EngineTurn::Moved { annotation, level })
    }

    /// The player gives up
    pub fn resign(&mut self) -> Result<()> {
        self.ensure_playable()?;
        self.result = Some(-1);
        Ok(())
    }

    /// Take back the last ply
    ///
    /// The micro-adjust window and resignation streak keep what they saw.
    pub fn undo(&mut self) -> Result<PlyAnnotation> {
        if !self.started {
            return Err(Error::NoGame);
        }
        let (Some(annotation), Some(fen)) = (self.annotations.pop(), self.positions.pop()) else {
            return Err(Error::NothingToUndo);
        };

        self.store.delete_annotation(&self.game_id, annotation.ply)?;
        self.refutations.remove(&annotation.ply);
        self.status = self.rules.status(&fen)?;
        self.fen = fen;
        self.result = None;

        debug!("Undid ply {} ({})", annotation.ply, annotation.san);
        Ok(annotation)
    }

    /// Score the game and move the stored level
    ///
    /// `result` overrides the outcome recorded on the board, e.g. for an
    /// agreed draw or an abandoned game.
    pub fn finish(&mut self, result: Option<i32>) -> Result<GameReport> {
        if !self.started {
            return Err(Error::NoGame);
        }
        let result = result.or(self.result).ok_or(Error::GameInProgress)?;

        let stats = game_stats(&self.annotations, result.signum());
        let gps = compute_gps(&stats);
        let level = apply_level_update(&self.store, gps)?;

        self.result = Some(stats.result);
        self.started = false;
        info!(
            "Game {} finished: {} player moves, {} blunders, gps {:.3}",
            self.game_id, stats.player_move_count, stats.blunders, gps
        );

        Ok(GameReport { stats, gps, level })
    }

    /// Narrative payload for `ply`, if it has been played
    pub fn coaching_context(&self, ply: u32) -> Option<CoachingContext> {
        let annotation = self.annotations.iter().find(|a| a.ply == ply)?;
        Some(CoachingContext::build(
            annotation,
            &self.annotations,
            self.refutations.get(&ply).cloned(),
        ))
    }
}
