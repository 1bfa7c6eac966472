use serde::{Deserialize, Serialize};

use super::{annotations::PlyAnnotation, classifier::MoveLabel};

/// Number of preceding moves handed to the text generator
pub const RECENT_MOVES: usize = 6;

/// Structured input for whatever turns a move into coaching prose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingContext {
    pub ply: u32,
    pub fen: String,
    pub san: String,
    pub recent_moves: Vec<String>,
    pub eval_before: i32,
    pub eval_after: i32,
    pub delta: i32,
    pub classification: MoveLabel,
    pub best_move: Option<String>,
    /// Opponent's best continuation after the move, when known
    pub refutation: Option<Vec<String>>,
    pub motifs: Vec<String>,
    pub notes: Vec<String>,
}

impl CoachingContext {
    /// Build the payload for `annotation`, given the moves that led to it in order
    pub fn build(annotation: &PlyAnnotation, history: &[PlyAnnotation], refutation: Option<Vec<String>>) -> Self {
        let earlier: Vec<&PlyAnnotation> = history.iter().filter(|a| a.ply < annotation.ply).collect();
        let skip = earlier.len().saturating_sub(RECENT_MOVES);
        let recent_moves = earlier.iter().skip(skip).map(|a| a.san.clone()).collect();

        Self {
            ply: annotation.ply,
            fen: annotation.fen.clone(),
            san: annotation.san.clone(),
            recent_moves,
            eval_before: annotation.eval_before,
            eval_after: annotation.eval_after,
            delta: annotation.delta,
            classification: annotation.classification,
            best_move: annotation.best_move.clone(),
            refutation: refutation.filter(|r| !r.is_empty()),
            motifs: motifs(annotation),
            notes: annotation.notes.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Tags describing what kind of move this was
pub fn motifs(annotation: &PlyAnnotation) -> Vec<String> {
    let san = annotation.san.as_str();
    let mut tags = Vec::new();

    if san.starts_with("O-O") {
        tags.push("castling");
    }
    if san.contains('x') {
        tags.push("capture");
    }
    if san.contains('=') {
        tags.push("promotion");
    }
    if san.ends_with('#') {
        tags.push("checkmate");
    } else if san.ends_with('+') {
        tags.push("check");
    }

    if annotation.is_mate_swing {
        tags.push("mate_swing");
    }
    if annotation.is_tactical {
        tags.push("tactical");
    }
    if annotation.softened {
        tags.push("decisive_position");
    }

    tags.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::classifier::{classify, MoveEvaluation};

    fn annotation(ply: u32, san: &str, eval: MoveEvaluation) -> PlyAnnotation {
        PlyAnnotation::new(ply, san.into(), "a1a1".into(), "fen".into(), &eval, &classify(&eval))
    }

    #[test]
    fn test_recent_moves_window() {
        let history: Vec<PlyAnnotation> = (1..=9)
            .map(|ply| annotation(ply, &format!("m{}", ply), MoveEvaluation::default()))
            .collect();
        let context = CoachingContext::build(&history[8], &history, None);
        assert_eq!(context.recent_moves, vec!["m3", "m4", "m5", "m6", "m7", "m8"]);
        assert_eq!(context.ply, 9);
    }

    #[test]
    fn test_motifs_from_san_and_flags() {
        let a = annotation(
            5,
            "Qxf7+",
            MoveEvaluation {
                eval_before: 50,
                eval_after: 40,
                mate_before: None,
                mate_after: Some(-2),
            },
        );
        assert_eq!(motifs(&a), vec!["capture", "check", "mate_swing"]);

        let b = annotation(7, "exd8=Q#", MoveEvaluation::default());
        assert_eq!(motifs(&b), vec!["capture", "promotion", "checkmate"]);

        let c = annotation(1, "O-O", MoveEvaluation { eval_before: 900, eval_after: 880, ..Default::default() });
        assert_eq!(motifs(&c), vec!["castling", "decisive_position"]);

        let d = annotation(
            3,
            "Kg1",
            MoveEvaluation {
                mate_before: Some(-5),
                mate_after: Some(-2),
                ..Default::default()
            },
        );
        assert_eq!(motifs(&d), vec!["tactical"]);
    }

    #[test]
    fn test_motifs_follow_recorded_flags() {
        let mut a = annotation(1, "Nf3", MoveEvaluation { mate_before: Some(3), ..Default::default() });
        assert_eq!(motifs(&a), vec!["mate_swing"]);

        // annotations loaded back from storage carry the flags without re-running the classifier
        a.mate_before = None;
        assert_eq!(motifs(&a), vec!["mate_swing"]);
        a.is_mate_swing = false;
        a.softened = true;
        assert_eq!(motifs(&a), vec!["decisive_position"]);
    }

    #[test]
    fn test_context_serializes() {
        let a = annotation(1, "e4", MoveEvaluation::default());
        let context = CoachingContext::build(&a, &[], Some(vec!["e7e5".into()]));
        let json = context.to_json().unwrap();
        assert!(json.contains("\"classification\":\"ok\""));
        assert!(json.contains("\"refutation\":[\"e7e5\"]"));
        assert!(json.contains("\"recentMoves\":[]"));
    }
}
