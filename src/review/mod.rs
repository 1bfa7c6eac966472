//! Post-move review: classification, per-ply annotations, game scoring and
//! the structured context handed to narrative generation.

pub mod annotations;
pub mod classifier;
pub mod gps;
pub mod narrative;

pub use annotations::{game_stats, PlyAnnotation, MAX_COUNTED_LOSS_CP};
pub use classifier::{classify, Classification, MoveEvaluation, MoveLabel, Thresholds};
pub use gps::{apply_level_update, compute_gps, level_delta, GameStatsForGps, LevelUpdate, DEFAULT_LEVEL};
pub use narrative::{motifs, CoachingContext};
