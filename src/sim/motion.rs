//! Per-ball moving/settled classification
//!
//! Velocity samples from a physics solver never reach exactly zero, so a ball
//! only reports settled after staying under the thresholds for a
//! confirmation window. Any sample above threshold restarts the window.

use glam::Vec3;

use crate::config::MotionConfig;

/// What a single sample did to the ball's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionSample {
    /// Above threshold
    Moving,
    /// Below threshold, confirmation window still running
    Settling,
    /// At rest
    Settled,
    /// Residual drift was cut; the caller must zero the ball's velocity
    HardStop,
}

/// Hysteresis state for one ball
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallMotionState {
    moving: bool,
    settle_timer: f32,
}

impl Default for BallMotionState {
    fn default() -> Self {
        Self::new()
    }
}

impl BallMotionState {
    /// A ball at rest
    pub fn new() -> Self {
        Self {
            moving: false,
            settle_timer: 0.0,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn is_settled(&self) -> bool {
        !self.moving
    }

    pub fn settle_timer(&self) -> f32 {
        self.settle_timer
    }

    /// Force the ball into the moving state (an impulse was just applied)
    pub fn mark_moving(&mut self) {
        self.moving = true;
        self.settle_timer = 0.0;
    }

    /// Back to rest after a teleport
    pub fn reset(&mut self) {
        self.moving = false;
        self.settle_timer = 0.0;
    }

    /// Classify one velocity sample taken `dt` seconds after the previous one
    pub fn update(
        &mut self,
        linear: Vec3,
        angular: Vec3,
        dt: f32,
        config: &MotionConfig,
    ) -> MotionSample {
        let lt = config.linear_threshold;
        let at = config.angular_threshold;
        let above = linear.length_squared() > lt * lt || angular.length_squared() > at * at;

        if above {
            self.moving = true;
            self.settle_timer = 0.0;
        } else {
            self.settle_timer += dt;
            self.moving = self.settle_timer < config.settle_confirmation;
        }

        // The hard-stop pair sits above the stop thresholds, so a slow roll
        // inside that band is cut without waiting for the window
        if self.moving
            && linear.length() < config.hard_stop_linear
            && angular.length() < config.hard_stop_angular
        {
            self.moving = false;
            self.settle_timer = config.settle_confirmation;
            return MotionSample::HardStop;
        }

        match (self.moving, above) {
            (true, true) => MotionSample::Moving,
            (true, false) => MotionSample::Settling,
            (false, _) => MotionSample::Settled,
        }
    }
}
