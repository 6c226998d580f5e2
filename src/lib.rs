//! Three Cushion - turn flow and learning environment for carom billiards
//!
//! Core modules:
//! - `sim`: Deterministic simulation (turn flow, settlement, rules, rewards)
//! - `config`: Data-driven game settings, reward magnitudes and timings
//! - `stats`: Training progress aggregation across episodes

pub mod config;
pub mod sim;
pub mod stats;

pub use config::{BallMode, BehaviorMode, Config, ConfigError, GameMode, GameSettings, Range};
pub use stats::TrainingStats;

use glam::Vec3;

/// Table and timing constants
pub mod consts {
    /// Fixed simulation timestep (120 Hz, matches the physics step)
    pub const SIM_DT: f32 = 1.0 / 120.0;

    /// Ball defaults
    pub const BALL_RADIUS: f32 = 0.1;
    pub const BALL_MASS: f32 = 0.17;

    /// Cushion height above the bed, for cue clearance checks
    pub const RAIL_HEIGHT: f32 = 0.13;

    /// Time scale while training
    pub const TRAINING_TIME_SCALE: f32 = 5.0;
    /// Time scale for matches against humans
    pub const PLAY_TIME_SCALE: f32 = 2.0;
}

/// Linear interpolation
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Inverse of [`lerp`], clamped to [0, 1]. Returns 0 for an empty range.
#[inline]
pub fn inverse_lerp(a: f32, b: f32, value: f32) -> f32 {
    if a == b {
        0.0
    } else {
        ((value - a) / (b - a)).clamp(0.0, 1.0)
    }
}

/// Unit aim vector for a yaw (angle_x) and downward pitch (angle_y) in degrees
///
/// Yaw 0 aims along +Z, positive yaw turns toward +X, positive pitch tilts the
/// tip down into the bed.
#[inline]
pub fn shot_direction(angle_x: f32, angle_y: f32) -> Vec3 {
    let (yaw, pitch) = (angle_x.to_radians(), angle_y.to_radians());
    Vec3::new(pitch.cos() * yaw.sin(), -pitch.sin(), pitch.cos() * yaw.cos())
}
