use derivative::Derivative;
use log::{debug, info, warn};

use crate::{
    engine::{CancelToken, PvLine, SearchEngine, SearchOptions, SearchResult},
    error::{Error, Result},
};

use super::difficulty::MAX_LEVEL;

/// Engine-side evaluation at or below which a ply counts toward resigning
pub const RESIGN_THRESHOLD_CP: i32 = -900;

/// Consecutive qualifying plies before resignation is considered
pub const RESIGN_STREAK: u32 = 3;

/// Longest forced mate against the engine that triggers immediate resignation
pub const RESIGN_MATE_DISTANCE: i32 = 6;

/// Lines within this many centipawns of equality count as a drawing resource
pub const DRAWISH_CP: i32 = 100;

/// Default depth of the drawish-resource probe
pub const PROBE_DEPTH: u32 = 8;

/// Candidate lines examined by the probe
pub const PROBE_MULTIPV: u16 = 3;

/// Counts consecutive hopeless evaluations for the engine side
#[derive(Debug, Clone, Default)]
pub struct ResignationStreak {
    count: u32,
}

impl ResignationStreak {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the engine-side evaluation of the latest ply; true once the streak is long enough
    pub fn update(&mut self, score_cp: i32) -> bool {
        if score_cp <= RESIGN_THRESHOLD_CP {
            self.count += 1;
        } else {
            self.count = 0;
        }
        self.count >= RESIGN_STREAK
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

fn is_drawish(line: &PvLine) -> bool {
    line.score_cp().is_some_and(|cp| cp.abs() <= DRAWISH_CP)
}

/// Decides whether the engine side should resign before it picks a move
#[derive(Derivative, Debug, Clone)]
#[derivative(Default)]
pub struct ResignationController {
    streak: ResignationStreak,
    #[derivative(Default(value = "PROBE_DEPTH"))]
    probe_depth: u32,
}

impl ResignationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe_depth(probe_depth: u32) -> Self {
        Self {
            probe_depth: probe_depth.max(1),
            ..Self::default()
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak.count()
    }

    pub fn reset(&mut self) {
        self.streak.reset();
    }

    /// Inspect the engine's search of `fen` (engine to move)
    ///
    /// Resigns at once when mated within six moves. Otherwise requires a
    /// hopeless streak and no drawing resource, probing the engine once when
    /// the existing lines show none. A failed probe never resigns.
    pub async fn assess<E: SearchEngine>(
        &mut self,
        engine: &E,
        fen: &str,
        result: &SearchResult,
        cancel: Option<&CancelToken>,
    ) -> bool {
        let Some(score) = result.top_line().map(|l| l.score).or(result.score) else {
            debug!("No score to assess resignation");
            self.streak.reset();
            return false;
        };

        if let Some(mate) = score.mate_in() {
            if mate < 0 && mate.abs() <= RESIGN_MATE_DISTANCE {
                info!("Resigning: mate in {} against the engine", mate.abs());
                return true;
            }
        }

        if !self.streak.update(score.to_cp()) {
            return false;
        }

        if result.lines.iter().any(is_drawish) {
            debug!("Resignation deferred: drawing resource among current lines");
            return false;
        }

        match self.probe_drawish_resource(engine, fen, cancel).await {
            Ok(true) => {
                debug!("Resignation deferred: probe found a drawing resource");
                false
            }
            Ok(false) => {
                info!("Resigning after {} hopeless plies", self.streak.count());
                true
            }
            Err(e) => {
                warn!("{}; continuing to play", e);
                false
            }
        }
    }

    async fn probe_drawish_resource<E: SearchEngine>(
        &self,
        engine: &E,
        fen: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<bool> {
        let options = SearchOptions {
            depth: Some(self.probe_depth),
            multipv: Some(PROBE_MULTIPV),
            skill_level: Some(MAX_LEVEL),
            ..Default::default()
        };

        let probe = engine
            .search(fen, &options, cancel)
            .await
            .map_err(|e| Error::ResignationAssessment(e.to_string()))?;

        Ok(probe.lines.iter().any(is_drawish))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{search_result, ScriptedSearch};
    use crate::engine::{EngineError, Score};

    const FEN: &str = "8/8/8/8/8/5k2/6q1/7K w - - 0 1";

    #[test]
    fn test_streak_counts_and_resets() {
        let mut streak = ResignationStreak::new();
        assert!(!streak.update(-900));
        assert!(!streak.update(-1500));
        assert!(streak.update(-950));
        assert!(streak.update(-2000));
        assert!(!streak.update(-899));
        assert_eq!(streak.count(), 0);
    }

    #[tokio::test]
    async fn test_short_mate_resigns_immediately() {
        let engine = ScriptedSearch::new();
        let mut controller = ResignationController::new();
        let result = search_result(&[(Score::Mate(-3), "h1g1")]);

        assert!(controller.assess(&engine, FEN, &result, None).await);
        assert!(engine.requests().is_empty());
    }

    #[tokio::test]
    async fn test_long_mate_only_feeds_streak() {
        let engine = ScriptedSearch::new();
        let mut controller = ResignationController::new();
        let result = search_result(&[(Score::Mate(-9), "h1g1")]);

        assert!(!controller.assess(&engine, FEN, &result, None).await);
        assert_eq!(controller.streak(), 1);
    }

    #[tokio::test]
    async fn test_mate_distance_boundary() {
        let engine = ScriptedSearch::new();

        let mut controller = ResignationController::new();
        let at_limit = search_result(&[(Score::Mate(-RESIGN_MATE_DISTANCE), "h1g1")]);
        assert!(controller.assess(&engine, FEN, &at_limit, None).await);

        let mut controller = ResignationController::new();
        let beyond = search_result(&[(Score::Mate(-(RESIGN_MATE_DISTANCE + 1)), "h1g1")]);
        assert!(!controller.assess(&engine, FEN, &beyond, None).await);
        assert_eq!(controller.streak(), 1);

        assert!(engine.requests().is_empty());
    }

    #[tokio::test]
    async fn test_drawish_boundary_is_inclusive() {
        for cp in [-DRAWISH_CP, DRAWISH_CP] {
            let engine = ScriptedSearch::new();
            let mut controller = ResignationController::new();
            let result = search_result(&[(Score::Centipawns(-1000), "h1g1"), (Score::Centipawns(cp), "h1h2")]);

            for _ in 0..RESIGN_STREAK {
                assert!(!controller.assess(&engine, FEN, &result, None).await);
            }
            assert!(engine.requests().is_empty(), "cp {}", cp);
        }
    }

    #[tokio::test]
    async fn test_line_just_outside_drawish_band_is_not_a_resource() {
        let engine = ScriptedSearch::new();
        engine.push_lines(&[(Score::Centipawns(-1100), "h1g1")]);
        let mut controller = ResignationController::new();
        let result = search_result(&[
            (Score::Centipawns(-1000), "h1g1"),
            (Score::Centipawns(-(DRAWISH_CP + 1)), "h1h2"),
        ]);

        assert!(!controller.assess(&engine, FEN, &result, None).await);
        assert!(!controller.assess(&engine, FEN, &result, None).await);
        assert!(controller.assess(&engine, FEN, &result, None).await);
        assert_eq!(engine.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_streak_with_probe_resigns() {
        let engine = ScriptedSearch::new();
        engine.push_lines(&[
            (Score::Centipawns(-1100), "h1g1"),
            (Score::Centipawns(-1400), "h1h2"),
        ]);
        let mut controller = ResignationController::new();
        let result = search_result(&[(Score::Centipawns(-1000), "h1g1")]);

        assert!(!controller.assess(&engine, FEN, &result, None).await);
        assert!(!controller.assess(&engine, FEN, &result, None).await);
        assert!(controller.assess(&engine, FEN, &result, None).await);

        let requests = engine.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1.depth, Some(PROBE_DEPTH));
        assert_eq!(requests[0].1.multipv, Some(PROBE_MULTIPV));
        assert_eq!(requests[0].1.skill_level, Some(MAX_LEVEL));
    }

    #[tokio::test]
    async fn test_probe_depth_is_configurable() {
        let engine = ScriptedSearch::new();
        engine.push_lines(&[(Score::Centipawns(-1100), "h1g1")]);
        let mut controller = ResignationController::with_probe_depth(12);
        let result = search_result(&[(Score::Centipawns(-1000), "h1g1")]);

        for _ in 0..3 {
            controller.assess(&engine, FEN, &result, None).await;
        }
        assert_eq!(engine.requests()[0].1.depth, Some(12));
    }

    #[tokio::test]
    async fn test_drawish_line_defers_without_probe() {
        let engine = ScriptedSearch::new();
        let mut controller = ResignationController::new();
        let result = search_result(&[
            (Score::Centipawns(-950), "h1g1"),
            (Score::Centipawns(-60), "h1h2"),
        ]);

        for _ in 0..4 {
            assert!(!controller.assess(&engine, FEN, &result, None).await);
        }
        assert!(engine.requests().is_empty());
    }

    #[tokio::test]
    async fn test_probe_finding_resource_defers() {
        let engine = ScriptedSearch::new();
        engine.push_lines(&[(Score::Centipawns(-1200), "h1g1"), (Score::Centipawns(0), "h1h2")]);
        let mut controller = ResignationController::new();
        let result = search_result(&[(Score::Centipawns(-1300), "h1g1")]);

        controller.assess(&engine, FEN, &result, None).await;
        controller.assess(&engine, FEN, &result, None).await;
        assert!(!controller.assess(&engine, FEN, &result, None).await);
    }

    #[tokio::test]
    async fn test_probe_failure_keeps_playing() {
        let engine = ScriptedSearch::new();
        engine.push(Err(EngineError::ReadyTimeout));
        let mut controller = ResignationController::new();
        let result = search_result(&[(Score::Centipawns(-3000), "h1g1")]);

        controller.assess(&engine, FEN, &result, None).await;
        controller.assess(&engine, FEN, &result, None).await;
        assert!(!controller.assess(&engine, FEN, &result, None).await);
        assert_eq!(engine.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_resets_streak() {
        let engine = ScriptedSearch::new();
        let mut controller = ResignationController::new();
        let losing = search_result(&[(Score::Centipawns(-1000), "h1g1")]);
        let holding = search_result(&[(Score::Centipawns(-400), "h1g1")]);

        controller.assess(&engine, FEN, &losing, None).await;
        controller.assess(&engine, FEN, &losing, None).await;
        assert!(!controller.assess(&engine, FEN, &holding, None).await);
        assert_eq!(controller.streak(), 0);

        controller.reset();
        assert_eq!(controller.streak(), 0);
    }
}
