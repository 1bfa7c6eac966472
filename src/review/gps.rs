use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    play::{MAX_LEVEL, MIN_LEVEL},
    store::SettingsStore,
};

/// Blunder rate assumed when the player made no moves
const NEUTRAL_BLUNDER_RATE: f64 = 0.20;

/// Average loss assumed when none was measured
const NEUTRAL_AVG_LOSS_CP: f64 = 120.0;

const RESULT_WEIGHT: f64 = 0.9;
const BLUNDER_WEIGHT: f64 = 0.6;
const LOSS_WEIGHT: f64 = 0.4;

const GPS_LIMIT: f64 = 2.0;

/// Level used when nothing has been persisted yet
pub const DEFAULT_LEVEL: u8 = 10;

/// End-of-game figures for the player's own moves
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatsForGps {
    /// -1 loss, 0 draw, 1 win; other values are clamped
    pub result: i32,
    pub player_move_count: u32,
    pub blunders: u32,
    pub avg_loss_cp: Option<f64>,
}

/// Game Performance Score in `[-2, 2]`
pub fn compute_gps(stats: &GameStatsForGps) -> f64 {
    let result = stats.result.clamp(-1, 1) as f64;
    let moves = stats.player_move_count;
    let blunders = stats.blunders.min(moves);

    let blunder_rate = if moves > 0 {
        blunders as f64 / moves as f64
    } else {
        NEUTRAL_BLUNDER_RATE
    };

    let avg_loss = match stats.avg_loss_cp {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        _ => NEUTRAL_AVG_LOSS_CP,
    };

    let blunder_term = (NEUTRAL_BLUNDER_RATE - blunder_rate).clamp(-1.0, 1.0);
    let loss_term = ((NEUTRAL_AVG_LOSS_CP - avg_loss) / NEUTRAL_AVG_LOSS_CP).clamp(-1.0, 1.0);

    let gps = RESULT_WEIGHT * result + BLUNDER_WEIGHT * blunder_term + LOSS_WEIGHT * loss_term;

    gps.clamp(-GPS_LIMIT, GPS_LIMIT)
}

/// Level change earned by a game
pub fn level_delta(gps: f64) -> i32 {
    if gps >= 1.2 {
        2
    } else if gps >= 0.6 {
        1
    } else if gps <= -1.2 {
        -2
    } else if gps <= -0.6 {
        -1
    } else {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUpdate {
    pub old_level: u8,
    pub new_level: u8,
    pub delta: i32,
}

/// Move the persisted level by the game's GPS, staying within `[1, 20]`
///
/// A missing level is created at [`DEFAULT_LEVEL`]. The store is written only
/// when the level actually changes.
pub fn apply_level_update<S: SettingsStore + ?Sized>(store: &S, gps: f64) -> Result<LevelUpdate> {
    let old_level = match store.get_level()? {
        Some(level) => level.clamp(MIN_LEVEL, MAX_LEVEL),
        None => {
            store.upsert_level(DEFAULT_LEVEL)?;
            DEFAULT_LEVEL
        }
    };

    let delta = level_delta(gps);
    let new_level = (old_level as i32 + delta).clamp(MIN_LEVEL as i32, MAX_LEVEL as i32) as u8;

    if new_level != old_level {
        store.upsert_level(new_level)?;
        info!("Level {} -> {} (gps {:.3})", old_level, new_level, gps);
    }

    Ok(LevelUpdate {
        old_level,
        new_level,
        delta: new_level as i32 - old_level as i32,
    })
}
