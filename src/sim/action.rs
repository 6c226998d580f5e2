//! Mapping between normalized policy actions and shot parameters
//!
//! Each channel is an independent affine map from [-1, 1] onto its
//! configured range. The inverse turns a recorded shot back into the action
//! that would have produced it.

use serde::{Deserialize, Serialize};

use crate::config::{AgentConfig, Range, TestShot};
use crate::{inverse_lerp, lerp};

/// Number of continuous action channels
pub const ACTION_CHANNELS: usize = 3;

/// Physical shot: yaw and pitch in degrees, power in cue units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ShotParameters {
    pub angle_x: f32,
    pub angle_y: f32,
    pub power: f32,
}

impl ShotParameters {
    pub fn new(angle_x: f32, angle_y: f32, power: f32) -> Self {
        Self {
            angle_x,
            angle_y,
            power,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.angle_x.is_finite() && self.angle_y.is_finite() && self.power.is_finite()
    }
}

impl From<TestShot> for ShotParameters {
    fn from(shot: TestShot) -> Self {
        Self::new(shot.angle_x, shot.angle_y, shot.power)
    }
}

/// Normalized action to a value in `range`. Non-finite input maps to the midpoint.
#[inline]
pub fn map_action_to_range(x: f32, range: Range) -> f32 {
    let x = if x.is_finite() { x.clamp(-1.0, 1.0) } else { 0.0 };
    let t = (x + 1.0) * 0.5;
    lerp(range.min, range.max, t)
}

/// Value in `range` back to a normalized action; 0 for an empty range
#[inline]
pub fn remap_value_to_action(value: f32, range: Range) -> f32 {
    if range.min == range.max {
        return 0.0;
    }
    let t = inverse_lerp(range.min, range.max, value);
    (t * 2.0 - 1.0).clamp(-1.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionMapper {
    pub angle_x: Range,
    pub angle_y: Range,
    pub power: Range,
}

impl ActionMapper {
    pub fn new(angle_x: Range, angle_y: Range, power: Range) -> Self {
        Self {
            angle_x,
            angle_y,
            power,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.angle_x, config.angle_y, config.power)
    }

    /// Shot for a raw action vector. Short vectors yield a zero shot and a warning.
    pub fn extract(&self, action: &[f32]) -> ShotParameters {
        if action.len() < ACTION_CHANNELS {
            log::warn!(
                "Action has {} continuous channels, expected {}; using a zero shot",
                action.len(),
                ACTION_CHANNELS
            );
            return ShotParameters::default();
        }
        ShotParameters {
            angle_x: map_action_to_range(action[0], self.angle_x),
            angle_y: map_action_to_range(action[1], self.angle_y),
            power: map_action_to_range(action[2], self.power),
        }
    }

    /// Action vector that reproduces `shot` (for demonstrations)
    pub fn to_action(&self, shot: &ShotParameters) -> [f32; ACTION_CHANNELS] {
        [
            remap_value_to_action(shot.angle_x, self.angle_x),
            remap_value_to_action(shot.angle_y, self.angle_y),
            remap_value_to_action(shot.power, self.power),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extremes_and_midpoint() {
        let mapper = ActionMapper::new(
            Range::new(-180.0, 180.0),
            Range::new(0.0, 60.0),
            Range::new(0.0, 10.0),
        );
        let shot = mapper.extract(&[1.0, -1.0, 0.0]);
        assert_eq!(shot, ShotParameters::new(180.0, 0.0, 5.0));
    }

    #[test]
    fn test_out_of_range_actions_clamp() {
        let range = Range::new(6.0, 10.0);
        assert_eq!(map_action_to_range(3.0, range), 10.0);
        assert_eq!(map_action_to_range(-7.5, range), 6.0);
        assert_eq!(map_action_to_range(f32::NAN, range), 8.0);
    }

    #[test]
    fn test_short_action_is_zero_shot() {
        let mapper = ActionMapper::from_config(&AgentConfig::default());
        assert_eq!(mapper.extract(&[0.5, 0.5]), ShotParameters::default());
        assert_eq!(mapper.extract(&[]), ShotParameters::default());
    }

    #[test]
    fn test_extra_channels_ignored() {
        let mapper = ActionMapper::from_config(&AgentConfig::default());
        let shot = mapper.extract(&[0.0, 0.0, 0.0, 0.9, -0.9]);
        assert_eq!(shot, ShotParameters::new(0.0, 22.5, 8.0));
    }

    #[test]
    fn test_degenerate_range_inverse() {
        assert_eq!(remap_value_to_action(4.0, Range::new(4.0, 4.0)), 0.0);
    }

    #[test]
    fn test_to_action_inverts_extract() {
        let mapper = ActionMapper::from_config(&AgentConfig::default());
        let shot = ShotParameters::new(90.0, 45.0, 6.0);
        assert_eq!(mapper.to_action(&shot), [0.5, 1.0, -1.0]);
    }

    proptest! {
        #[test]
        fn test_mapping_round_trip(
            x in -1.0f32..=1.0,
            lo in -500.0f32..500.0,
            width in 0.5f32..500.0,
            flip in any::<bool>(),
        ) {
            let range = if flip {
                Range::new(lo + width, lo)
            } else {
                Range::new(lo, lo + width)
            };
            let value = map_action_to_range(x, range);
            let back = remap_value_to_action(value, range);
            let tolerance = 1e-3 * (1.0 + lo.abs() / width);
            prop_assert!((back - x).abs() <= tolerance, "x={} back={}", x, back);
        }
    }
}
