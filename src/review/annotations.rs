use serde::{Deserialize, Serialize};

use super::{
    classifier::{Classification, MoveEvaluation, MoveLabel},
    gps::GameStatsForGps,
};

/// Per-move loss above this is counted as this much in the average
pub const MAX_COUNTED_LOSS_CP: i32 = 1000;

/// Everything recorded about one played move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlyAnnotation {
    /// 1-based; odd plies belong to the player
    pub ply: u32,
    pub san: String,
    pub uci: String,
    /// Position after the move
    pub fen: String,
    pub eval_before: i32,
    pub eval_after: i32,
    pub delta: i32,
    pub mate_before: Option<i32>,
    pub mate_after: Option<i32>,
    pub classification: MoveLabel,
    /// Flags raised by the classifier
    #[serde(default)]
    pub is_mate_swing: bool,
    #[serde(default)]
    pub is_tactical: bool,
    #[serde(default)]
    pub softened: bool,
    pub notes: Vec<String>,
    /// Engine's preferred move in the position before, when known
    pub best_move: Option<String>,
}

impl PlyAnnotation {
    pub fn new(
        ply: u32,
        san: String,
        uci: String,
        fen: String,
        eval: &MoveEvaluation,
        classification: &Classification,
    ) -> Self {
        Self {
            ply,
            san,
            uci,
            fen,
            eval_before: eval.eval_before,
            eval_after: eval.eval_after,
            delta: eval.eval_after - eval.eval_before,
            mate_before: eval.mate_before,
            mate_after: eval.mate_after,
            classification: classification.label,
            is_mate_swing: classification.is_mate_swing,
            is_tactical: classification.is_tactical,
            softened: classification.softened,
            notes: classification.notes.clone(),
            best_move: None,
        }
    }

    pub fn with_best_move(mut self, best_move: Option<String>) -> Self {
        self.best_move = best_move;
        self
    }

    pub fn is_player_ply(&self) -> bool {
        self.ply % 2 == 1
    }

    /// Centipawns given away by this move, capped
    pub fn counted_loss(&self) -> i32 {
        (-self.delta).clamp(0, MAX_COUNTED_LOSS_CP)
    }
}

/// Aggregate the player's plies into GPS input
pub fn game_stats<'a, I>(annotations: I, result: i32) -> GameStatsForGps
where
    I: IntoIterator<Item = &'a PlyAnnotation>,
{
    let mut moves = 0u32;
    let mut blunders = 0u32;
    let mut total_loss = 0i64;

    for annotation in annotations.into_iter().filter(|a| a.is_player_ply()) {
        moves += 1;
        if annotation.classification == MoveLabel::Blunder {
            blunders += 1;
        }
        total_loss += annotation.counted_loss() as i64;
    }

    GameStatsForGps {
        result,
        player_move_count: moves,
        blunders,
        avg_loss_cp: (moves > 0).then(|| total_loss as f64 / moves as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::classifier::classify;

    fn annotation(ply: u32, before: i32, after: i32) -> PlyAnnotation {
        let eval = MoveEvaluation {
            eval_before: before,
            eval_after: after,
            ..Default::default()
        };
        PlyAnnotation::new(
            ply,
            "e4".into(),
            "e2e4".into(),
            "fen".into(),
            &eval,
            &classify(&eval),
        )
    }

    #[test]
    fn test_annotation_fields() {
        let a = annotation(3, 40, -100);
        assert_eq!(a.delta, -140);
        assert_eq!(a.classification, MoveLabel::Mistake);
        assert!(a.is_player_ply());
        assert_eq!(a.counted_loss(), 140);
        assert!(!a.softened && !a.is_mate_swing && !a.is_tactical);
        assert!(!annotation(4, 0, 0).is_player_ply());
        assert!(annotation(5, 900, 600).softened);
    }

    #[test]
    fn test_stats_use_player_plies_only() {
        let annotations = vec![
            annotation(1, 20, 10),
            annotation(2, -10, -600),
            annotation(3, 30, -300),
            annotation(4, 300, 280),
            annotation(5, -290, -250),
        ];
        let stats = game_stats(&annotations, 1);
        assert_eq!(stats.player_move_count, 3);
        assert_eq!(stats.blunders, 1);
        assert_eq!(stats.result, 1);
        let avg = stats.avg_loss_cp.unwrap();
        assert!((avg - (10.0 + 330.0 + 0.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_loss_is_capped() {
        let a = annotation(1, 9980, -9980);
        assert_eq!(a.counted_loss(), MAX_COUNTED_LOSS_CP);
    }

    #[test]
    fn test_empty_game_stats() {
        let stats = game_stats(&Vec::<PlyAnnotation>::new(), 0);
        assert_eq!(stats.player_move_count, 0);
        assert_eq!(stats.avg_loss_cp, None);
    }
}
