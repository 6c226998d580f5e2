//! Table-wide "all balls stopped" detection
//!
//! Aggregates the per-ball [`BallMotionState`](super::BallMotionState) flags
//! into one discrete event:
//! - a table-level debounce after the last ball settles
//! - a grace window after every table reset during which nothing fires
//! - no event while a cue is mid-stroke and has not reached the ball yet
//! - a forced event once the table has been moving past the wait ceiling

use crate::config::SettlementConfig;

/// One sample of table state
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementInput {
    pub any_ball_moving: bool,
    /// A cue is shooting and has not finished its stroke
    pub cue_mid_strike: bool,
    /// A table reset is still in flight
    pub resetting: bool,
}

/// Discrete settlement notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    AllBallsStopped {
        /// Fired by the wait ceiling rather than by velocities
        forced: bool,
    },
}

#[derive(Debug, Clone)]
pub struct TableSettlementTracker {
    config: SettlementConfig,
    grace_remaining: f32,
    was_moving: bool,
    stopped_timer: f32,
    moving_timer: f32,
}

impl TableSettlementTracker {
    pub fn new(config: SettlementConfig) -> Self {
        Self {
            config,
            grace_remaining: 0.0,
            was_moving: false,
            stopped_timer: 0.0,
            moving_timer: 0.0,
        }
    }

    /// Suppress detection for the configured reset grace
    pub fn arm_reset_grace(&mut self) {
        self.clear();
        self.grace_remaining = self.config.reset_grace.max(0.0);
    }

    pub fn in_grace(&self) -> bool {
        self.grace_remaining > 0.0
    }

    /// Whether a moving phase is open and waiting to settle
    pub fn awaiting_settlement(&self) -> bool {
        self.was_moving
    }

    /// Forget the current moving phase
    pub fn clear(&mut self) {
        self.was_moving = false;
        self.stopped_timer = 0.0;
        self.moving_timer = 0.0;
    }

    pub fn update(&mut self, input: SettlementInput, dt: f32) -> Option<Settlement> {
        if input.resetting {
            self.stopped_timer = 0.0;
            return None;
        }

        if self.grace_remaining > 0.0 {
            self.grace_remaining -= dt;
            return None;
        }

        if input.cue_mid_strike {
            // A strike is on its way; the balls will move shortly
            self.was_moving = true;
            self.stopped_timer = 0.0;
            return None;
        }

        if input.any_ball_moving {
            self.was_moving = true;
            self.stopped_timer = 0.0;
            self.moving_timer += dt;
            if self.moving_timer >= self.config.max_wait {
                log::warn!(
                    "Balls still moving after {:.1}s, forcing settlement",
                    self.moving_timer
                );
                self.clear();
                return Some(Settlement::AllBallsStopped { forced: true });
            }
            return None;
        }

        if !self.was_moving {
            return None;
        }

        self.stopped_timer += dt;
        if self.stopped_timer >= self.config.effective_confirmation() {
            log::debug!("All balls stopped after {:.2}s of motion", self.moving_timer);
            self.clear();
            return Some(Settlement::AllBallsStopped { forced: false });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use proptest::prelude::*;

    fn moving() -> SettlementInput {
        SettlementInput {
            any_ball_moving: true,
            ..Default::default()
        }
    }

    fn still() -> SettlementInput {
        SettlementInput::default()
    }

    fn run(tracker: &mut TableSettlementTracker, input: SettlementInput, ticks: usize) -> Vec<Settlement> {
        (0..ticks).filter_map(|_| tracker.update(input, SIM_DT)).collect()
    }

    #[test]
    fn test_fires_once_after_confirmation() {
        let mut tracker = TableSettlementTracker::new(SettlementConfig::default());
        assert!(run(&mut tracker, moving(), 60).is_empty());

        // 0.2s debounce at 120 Hz
        assert!(run(&mut tracker, still(), 23).is_empty());
        let fired = run(&mut tracker, still(), 2);
        assert_eq!(fired, vec![Settlement::AllBallsStopped { forced: false }]);

        // Staying still never fires again
        assert!(run(&mut tracker, still(), 600).is_empty());
    }

    #[test]
    fn test_never_fires_without_motion() {
        let mut tracker = TableSettlementTracker::new(SettlementConfig::default());
        assert!(run(&mut tracker, still(), 600).is_empty());
    }

    #[test]
    fn test_motion_restarts_debounce() {
        let mut tracker = TableSettlementTracker::new(SettlementConfig::default());
        run(&mut tracker, moving(), 10);
        assert!(run(&mut tracker, still(), 20).is_empty());
        run(&mut tracker, moving(), 1);
        assert!(run(&mut tracker, still(), 20).is_empty());
        assert_eq!(run(&mut tracker, still(), 10).len(), 1);
    }

    #[test]
    fn test_reset_grace_suppresses() {
        let mut tracker = TableSettlementTracker::new(SettlementConfig::default());
        run(&mut tracker, moving(), 10);
        tracker.arm_reset_grace();
        assert!(tracker.in_grace());
        // Grace clears the open moving phase, so nothing fires afterwards
        assert!(run(&mut tracker, still(), 240).is_empty());
        assert!(!tracker.in_grace());
    }

    #[test]
    fn test_mid_strike_blocks_event() {
        let mut tracker = TableSettlementTracker::new(SettlementConfig::default());
        let striking = SettlementInput {
            cue_mid_strike: true,
            ..Default::default()
        };
        assert!(run(&mut tracker, striking, 120).is_empty());
        assert!(tracker.awaiting_settlement());
        // Stroke finished without moving anything: the debounce still closes it out
        assert_eq!(run(&mut tracker, still(), 30).len(), 1);
    }

    #[test]
    fn test_resetting_blocks_event() {
        let mut tracker = TableSettlementTracker::new(SettlementConfig::default());
        run(&mut tracker, moving(), 10);
        let resetting = SettlementInput {
            resetting: true,
            ..Default::default()
        };
        assert!(run(&mut tracker, resetting, 120).is_empty());
    }

    #[test]
    fn test_forced_after_max_wait() {
        let config = SettlementConfig {
            max_wait: 1.0,
            ..Default::default()
        };
        let mut tracker = TableSettlementTracker::new(config);
        let fired = run(&mut tracker, moving(), 125);
        assert_eq!(fired, vec![Settlement::AllBallsStopped { forced: true }]);
    }

    proptest! {
        #[test]
        fn test_settlement_fires_exactly_once(
            bursts in prop::collection::vec(1usize..40, 1..6),
            quiet in 30usize..200,
        ) {
            let mut tracker = TableSettlementTracker::new(SettlementConfig::default());
            let mut fired = 0;
            for burst in &bursts {
                fired += run(&mut tracker, moving(), *burst).len();
                // Short gaps below the debounce keep the phase open
                fired += run(&mut tracker, still(), 5).len();
            }
            prop_assert_eq!(fired, 0);
            fired += run(&mut tracker, still(), quiet).len();
            prop_assert_eq!(fired, 1);
        }
    }
}
