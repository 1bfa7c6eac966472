use std::collections::VecDeque;

use log::debug;

use super::difficulty::clamp_level;

/// Number of recent player moves considered
pub const WINDOW_SIZE: usize = 10;

/// Player-perspective evaluation at or below which a move counts as struggling
pub const STRUGGLE_THRESHOLD_CP: i32 = -700;

/// Struggling moves in a full window needed to ease off
pub const STRUGGLE_COUNT: usize = 8;

/// Sliding-window dampener that drops the engine one level while the player
/// is consistently lost
#[derive(Debug, Clone, Default)]
pub struct MicroAdjustController {
    window: VecDeque<i32>,
    active: bool,
}

impl MicroAdjustController {
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(WINDOW_SIZE),
            active: false,
        }
    }

    /// Record the player's evaluation after their latest move
    pub fn update(&mut self, player_eval_cp: i32) {
        if self.window.len() == WINDOW_SIZE {
            self.window.pop_front();
        }
        self.window.push_back(player_eval_cp);

        let struggling = self.window.iter().filter(|&&v| v <= STRUGGLE_THRESHOLD_CP).count();
        let active = self.window.len() == WINDOW_SIZE && struggling >= STRUGGLE_COUNT;
        if active != self.active {
            debug!(
                "Micro-adjust {} ({} of {} moves at or below {}cp)",
                if active { "engaged" } else { "released" },
                struggling,
                self.window.len(),
                STRUGGLE_THRESHOLD_CP
            );
        }
        self.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Level the engine should play at right now
    pub fn effective_level(&self, base_level: f64) -> u8 {
        let adjust = if self.active { 1.0 } else { 0.0 };
        clamp_level(base_level.round() - adjust)
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.active = false;
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_full_window() {
        let mut controller = MicroAdjustController::new();
        for v in [-800, -900, -750, -710, -1000, -700, -720, 0, 50] {
            controller.update(v);
        }
        assert_eq!(controller.len(), 9);
        assert!(!controller.is_active());

        controller.update(-800);
        assert!(controller.is_active());
        assert_eq!(controller.effective_level(5.0), 4);
        assert_eq!(controller.effective_level(1.0), 1);
    }

    #[test]
    fn test_inactive_with_seven_of_ten() {
        let mut controller = MicroAdjustController::new();
        for v in [-800, -800, -800, -800, -800, -800, -800, 0, 0, 0] {
            controller.update(v);
        }
        assert!(!controller.is_active());
        assert_eq!(controller.effective_level(5.0), 5);
    }

    #[test]
    fn test_oldest_values_evicted() {
        let mut controller = MicroAdjustController::new();
        for _ in 0..10 {
            controller.update(-900);
        }
        assert!(controller.is_active());

        for _ in 0..3 {
            controller.update(100);
        }
        assert_eq!(controller.len(), WINDOW_SIZE);
        assert!(!controller.is_active());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut controller = MicroAdjustController::new();
        for _ in 0..8 {
            controller.update(-700);
        }
        controller.update(-699);
        controller.update(-699);
        assert!(controller.is_active());
    }

    #[test]
    fn test_reset() {
        let mut controller = MicroAdjustController::new();
        for _ in 0..10 {
            controller.update(-1200);
        }
        controller.reset();
        assert!(controller.is_empty());
        assert!(!controller.is_active());
        assert_eq!(controller.effective_level(12.4), 12);
        assert_eq!(controller.effective_level(25.0), 20);
    }
}
