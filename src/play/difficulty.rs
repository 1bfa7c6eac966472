use serde::{Deserialize, Serialize};

use crate::engine::SearchOptions;

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 20;

/// Engine tuning derived from a player level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    pub level: u8,
    pub skill: u8,
    pub depth: u32,
    pub top_k: usize,
    pub contempt: i32,
    pub blunder_chance: f64,
}

impl EngineOptions {
    /// Search request matching these options; one line per sampling candidate
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            depth: Some(self.depth),
            multipv: Some(self.top_k as u16),
            skill_level: Some(self.skill),
            contempt: Some(self.contempt),
            ..Default::default()
        }
    }
}

/// Round and clamp an arbitrary level into `[1, 20]`
pub fn clamp_level(level: f64) -> u8 {
    if level.is_nan() {
        return MIN_LEVEL;
    }
    level.round().clamp(MIN_LEVEL as f64, MAX_LEVEL as f64) as u8
}

/// Map a player level to engine options
pub fn map_level(level: f64) -> EngineOptions {
    let level = clamp_level(level);

    let top_k = match level {
        0..=5 => 4,
        6..=10 => 3,
        11..=15 => 2,
        _ => 1,
    };

    let blunder_chance = match level {
        1 => 0.02,
        2 => 0.015,
        3 => 0.01,
        4 => 0.0075,
        5 => 0.005,
        _ => 0.0,
    };

    EngineOptions {
        level,
        skill: level,
        depth: 6 + (level as u32) / 3,
        top_k,
        contempt: 0,
        blunder_chance,
    }
}
