use log::debug;
use rand::Rng;

use crate::{
    engine::PvLine,
    error::{Error, Result},
};

use super::difficulty::EngineOptions;

/// Lines ordered best first by mate-aware score; ties keep multipv order
pub fn rank_lines(lines: &[PvLine]) -> Vec<&PvLine> {
    let mut ranked: Vec<&PvLine> = lines.iter().collect();
    ranked.sort_by(|a, b| b.score.rank_key().cmp(&a.score.rank_key()));
    ranked
}

/// Pick uniformly among the `k` best lines
pub fn select_top_k<'a, R: Rng + ?Sized>(lines: &'a [PvLine], k: usize, rng: &mut R) -> Result<&'a PvLine> {
    let ranked = rank_lines(lines);
    if ranked.is_empty() {
        return Err(Error::NoCandidateLines);
    }

    let k = k.clamp(1, ranked.len());
    let index = ((rng.gen::<f64>() * k as f64).floor() as usize).min(k - 1);
    Ok(ranked[index])
}

/// Choose the engine's reply: occasionally the worst line, otherwise top-K sampling
pub fn choose_reply<'a, R: Rng + ?Sized>(
    lines: &'a [PvLine],
    options: &EngineOptions,
    rng: &mut R,
) -> Result<&'a PvLine> {
    if options.top_k > 1 && options.blunder_chance > 0.0 && rng.gen::<f64>() < options.blunder_chance {
        if let Some(worst) = rank_lines(lines).last().copied() {
            debug!("Injecting blunder: {} ({:?})", worst.best_move, worst.score);
            return Ok(worst);
        }
    }

    select_top_k(lines, options.top_k, rng)
}
