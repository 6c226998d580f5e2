//! Cue stick stroke sequence
//!
//! A shot runs through fixed phases on the simulation clock:
//! pullback, hold, strike, contact pause, follow-through, then the cue stays
//! frozen until the table reports that every ball stopped. The impulse is
//! released exactly once, when the strike reaches the ball.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::action::ShotParameters;
use super::table::{BallRole, Physics};
use crate::config::CueConfig;
use crate::{lerp, shot_direction};

/// Who plays with this cue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CueOwner {
    Player,
    Agent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrokePhase {
    Ready,
    Pullback { elapsed: f32 },
    Hold { elapsed: f32 },
    Strike { elapsed: f32, duration: f32 },
    ContactPause { elapsed: f32 },
    FollowThrough { elapsed: f32 },
    /// Stroke done, waiting for the table to settle
    AwaitingSettle,
}

#[derive(Debug, Clone)]
pub struct CueStick {
    owner: CueOwner,
    target: BallRole,
    config: CueConfig,
    phase: StrokePhase,
    shot: Option<ShotParameters>,
    balls_stopped_received: bool,
    frozen: bool,
}

impl CueStick {
    pub fn new(owner: CueOwner, target: BallRole, config: CueConfig) -> Self {
        Self {
            owner,
            target,
            config,
            phase: StrokePhase::Ready,
            shot: None,
            balls_stopped_received: false,
            frozen: false,
        }
    }

    pub fn owner(&self) -> CueOwner {
        self.owner
    }

    pub fn set_owner(&mut self, owner: CueOwner) {
        self.owner = owner;
    }

    pub fn target(&self) -> BallRole {
        self.target
    }

    pub fn set_target(&mut self, target: BallRole) {
        self.target = target;
    }

    pub fn phase(&self) -> StrokePhase {
        self.phase
    }

    pub fn is_shooting(&self) -> bool {
        self.phase != StrokePhase::Ready
    }

    pub fn is_waiting_for_balls(&self) -> bool {
        self.phase == StrokePhase::AwaitingSettle
    }

    /// Stroke under way and not yet done moving the cue
    pub fn is_mid_strike(&self) -> bool {
        self.is_shooting() && !self.is_waiting_for_balls()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Aim of the current shot, or the resting pose
    pub fn forward(&self) -> Vec3 {
        match self.shot {
            Some(shot) => shot_direction(shot.angle_x, shot.angle_y),
            None => shot_direction(0.0, self.config.default_vertical_angle),
        }
    }

    /// Would the stick intersect anything at these angles?
    pub fn is_blocked_for_angles<P: Physics>(&self, physics: &P, angle_x: f32, angle_y: f32) -> bool {
        physics.is_path_blocked(
            self.target,
            shot_direction(angle_x, angle_y),
            self.config.min_distance_from_ball,
            self.config.ray_length,
            self.config.stick_radius,
        )
    }

    /// Pullback distance for a power level
    pub fn pullback_distance(&self, power: f32) -> f32 {
        let t = if self.config.max_power > 0.0 {
            (power / self.config.max_power).clamp(0.0, 1.0)
        } else {
            0.0
        };
        lerp(self.config.min_pullback, self.config.max_pullback, t)
    }

    /// Start a stroke. Refused while another stroke is running.
    pub fn shoot(&mut self, angle_x: f32, angle_y: f32, power: f32) -> bool {
        if self.is_shooting() {
            log::debug!("Cue busy, shot refused");
            return false;
        }
        let power = power.clamp(0.0, self.config.max_power.max(0.0));
        self.shot = Some(ShotParameters::new(angle_x, angle_y, power));
        self.phase = StrokePhase::Pullback { elapsed: 0.0 };
        self.balls_stopped_received = false;
        self.frozen = false;
        log::debug!(
            "{:?} cue shoots {} at ({angle_x:.1}, {angle_y:.1}) power {power:.2}",
            self.owner,
            self.target.as_str()
        );
        true
    }

    /// Advance the stroke. Returns the impulse on the step the tip reaches the ball.
    pub fn tick(&mut self, dt: f32) -> Option<Vec3> {
        let shot = self.shot?;
        let mut impulse = None;
        self.phase = match self.phase {
            StrokePhase::Ready | StrokePhase::AwaitingSettle => return None,
            StrokePhase::Pullback { elapsed } => {
                let elapsed = elapsed + dt;
                if elapsed >= self.config.pullback_time {
                    StrokePhase::Hold { elapsed: 0.0 }
                } else {
                    StrokePhase::Pullback { elapsed }
                }
            }
            StrokePhase::Hold { elapsed } => {
                let elapsed = elapsed + dt;
                if elapsed >= self.config.hold_time {
                    let travel = self.pullback_distance(shot.power) + self.config.min_distance_from_ball;
                    let duration = if self.config.cue_speed > 0.0 {
                        travel / self.config.cue_speed
                    } else {
                        0.0
                    };
                    StrokePhase::Strike {
                        elapsed: 0.0,
                        duration,
                    }
                } else {
                    StrokePhase::Hold { elapsed }
                }
            }
            StrokePhase::Strike { elapsed, duration } => {
                let elapsed = elapsed + dt;
                if elapsed >= duration {
                    impulse = Some(self.forward() * shot.power * self.config.force_multiplier);
                    StrokePhase::ContactPause { elapsed: 0.0 }
                } else {
                    StrokePhase::Strike { elapsed, duration }
                }
            }
            StrokePhase::ContactPause { elapsed } => {
                let elapsed = elapsed + dt;
                if elapsed >= self.config.contact_pause {
                    StrokePhase::FollowThrough { elapsed: 0.0 }
                } else {
                    StrokePhase::ContactPause { elapsed }
                }
            }
            StrokePhase::FollowThrough { elapsed } => {
                let elapsed = elapsed + dt;
                if elapsed < self.config.follow_through_time {
                    StrokePhase::FollowThrough { elapsed }
                } else if self.balls_stopped_received {
                    StrokePhase::Ready
                } else {
                    self.frozen = true;
                    StrokePhase::AwaitingSettle
                }
            }
        };
        impulse
    }

    /// The table settled; release a cue that was waiting for it
    pub fn notify_all_balls_stopped(&mut self) {
        match self.phase {
            StrokePhase::AwaitingSettle => self.phase = StrokePhase::Ready,
            StrokePhase::Ready => {}
            _ => self.balls_stopped_received = true,
        }
        self.frozen = false;
    }

    /// Snap back to the address pose, cancelling any stroke
    pub fn force_align(&mut self) {
        self.phase = StrokePhase::Ready;
        self.shot = None;
        self.balls_stopped_received = false;
        self.frozen = false;
    }
}
