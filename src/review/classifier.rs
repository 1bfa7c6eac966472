//! Move quality classification; pure functions only.

use serde::{Deserialize, Serialize};

/// Centipawn loss thresholds
const THRESHOLD_INACCURACY: i32 = 60;
const THRESHOLD_MISTAKE: i32 = 120;
const THRESHOLD_BLUNDER: i32 = 250;

/// Positions at least this decisive get wider thresholds
const DECISIVE_EVAL: i32 = 800;
const SOFTENING_MARGIN: i32 = 40;

/// Mate distance shrinkage that marks a missed defence
const MATE_ACCELERATION: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveLabel {
    Ok,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl MoveLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveLabel::Ok => "ok",
            MoveLabel::Inaccuracy => "inaccuracy",
            MoveLabel::Mistake => "mistake",
            MoveLabel::Blunder => "blunder",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(MoveLabel::Ok),
            "inaccuracy" => Some(MoveLabel::Inaccuracy),
            "mistake" => Some(MoveLabel::Mistake),
            "blunder" => Some(MoveLabel::Blunder),
            _ => None,
        }
    }
}

impl std::fmt::Display for MoveLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluations around one move, from the mover's point of view
///
/// `mate_*` are moves to mate: positive when the mover mates, negative when
/// the mover gets mated, `None` without a forced mate. `mate_after == Some(0)`
/// means the move itself delivered mate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveEvaluation {
    pub eval_before: i32,
    pub eval_after: i32,
    pub mate_before: Option<i32>,
    pub mate_after: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub inaccuracy: i32,
    pub mistake: i32,
    pub blunder: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            inaccuracy: THRESHOLD_INACCURACY,
            mistake: THRESHOLD_MISTAKE,
            blunder: THRESHOLD_BLUNDER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub label: MoveLabel,
    pub cp_loss: i32,
    pub thresholds: Thresholds,
    pub is_mate_swing: bool,
    pub is_tactical: bool,
    pub softened: bool,
    pub notes: Vec<String>,
}

/// Classify a move by centipawn loss and mate transitions
pub fn classify(eval: &MoveEvaluation) -> Classification {
    let cp_loss = (eval.eval_before - eval.eval_after).max(0);
    let mut notes = Vec::new();

    let softened = eval.eval_before.abs() >= DECISIVE_EVAL;
    let mut thresholds = Thresholds::default();
    if softened {
        thresholds.inaccuracy += SOFTENING_MARGIN;
        thresholds.mistake += SOFTENING_MARGIN;
        thresholds.blunder += SOFTENING_MARGIN;
        notes.push(format!(
            "thresholds widened by {}cp in a decisive position",
            SOFTENING_MARGIN
        ));
    }

    let had_mate = eval.mate_before.is_some_and(|m| m > 0);
    let faced_mate_before = eval.mate_before.is_some_and(|m| m < 0);
    let faces_mate_after = eval.mate_after.is_some_and(|m| m < 0);
    let lost_mate = had_mate && !eval.mate_after.is_some_and(|m| m >= 0);
    let walked_into_mate = !faced_mate_before && faces_mate_after;
    let is_mate_swing = lost_mate || walked_into_mate;

    if lost_mate {
        notes.push("forced mate was let slip".to_string());
    }
    if walked_into_mate {
        notes.push("allowed a forced mate".to_string());
    }

    let mut is_tactical = false;
    if let (Some(before), Some(after)) = (eval.mate_before, eval.mate_after) {
        if before < 0 && after < 0 && before.abs() - after.abs() >= MATE_ACCELERATION {
            is_tactical = true;
            notes.push(format!(
                "mate against the mover sped up from {} to {}",
                before.abs(),
                after.abs()
            ));
        }
    }

    let label = if is_mate_swing || is_tactical || cp_loss >= thresholds.blunder {
        MoveLabel::Blunder
    } else if cp_loss >= thresholds.mistake {
        MoveLabel::Mistake
    } else if cp_loss >= thresholds.inaccuracy {
        MoveLabel::Inaccuracy
    } else {
        MoveLabel::Ok
    };

    Classification {
        label,
        cp_loss,
        thresholds,
        is_mate_swing,
        is_tactical,
        softened,
        notes,
    }
}
