//! Opponent strength control: level mapping, reply selection, in-game
//! dampening and resignation.

pub mod difficulty;
pub mod micro_adjust;
pub mod resignation;
pub mod selector;

pub use difficulty::{clamp_level, map_level, EngineOptions, MAX_LEVEL, MIN_LEVEL};
pub use micro_adjust::MicroAdjustController;
pub use resignation::{ResignationController, ResignationStreak};
pub use selector::{choose_reply, rank_lines, select_top_k};
