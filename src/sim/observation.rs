//! Policy observation vector
//!
//! Six floats: controlled ball, target ball, other cue ball, each as
//! (x, z) normalized by the table half extents and clamped to [-1, 1].

use glam::{Vec2, Vec3};

use super::table::{BallRole, Physics, Table};

pub const OBSERVATION_SIZE: usize = 6;

#[derive(Debug, Clone)]
pub struct ObservationCollector {
    extents: Vec2,
    /// Environment origin in table coordinates
    origin: Vec3,
    last_snapshot: String,
}

impl ObservationCollector {
    pub fn new(extents: Vec2, origin: Vec3) -> Self {
        Self {
            extents: extents.max(Vec2::splat(0.001)),
            origin,
            last_snapshot: String::new(),
        }
    }

    /// Cue ball of the other side
    pub fn other_ball(controlled: BallRole) -> BallRole {
        if controlled == BallRole::Main {
            BallRole::Secondary
        } else {
            BallRole::Main
        }
    }

    fn normalize(&self, position: Vec3) -> Vec2 {
        let local = position - self.origin;
        Vec2::new(
            (local.x / self.extents.x).clamp(-1.0, 1.0),
            (local.z / self.extents.y).clamp(-1.0, 1.0),
        )
    }

    /// Observation for `controlled`; zeros when there is no table
    pub fn collect<P: Physics>(
        &mut self,
        table: Option<&Table<P>>,
        controlled: BallRole,
    ) -> [f32; OBSERVATION_SIZE] {
        let Some(table) = table else {
            self.last_snapshot = "no table".to_string();
            return [0.0; OBSERVATION_SIZE];
        };

        let order = [controlled, BallRole::Target, Self::other_ball(controlled)];
        let mut obs = [0.0; OBSERVATION_SIZE];
        for (slot, role) in order.iter().enumerate() {
            let p = self.normalize(table.position(*role));
            obs[slot * 2] = p.x;
            obs[slot * 2 + 1] = p.y;
        }
        self.last_snapshot = format!(
            "controlled={} ({:.2}, {:.2}) target=({:.2}, {:.2}) other=({:.2}, {:.2})",
            controlled.as_str(),
            obs[0],
            obs[1],
            obs[2],
            obs[3],
            obs[4],
            obs[5]
        );
        obs
    }

    pub fn last_snapshot(&self) -> &str {
        &self.last_snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::consts::BALL_RADIUS;
    use crate::sim::table::tests::ScriptedPhysics;

    fn table() -> Table<ScriptedPhysics> {
        let mut table = Table::new(ScriptedPhysics::default(), &Config::default());
        table.set_initial_position(BallRole::Main, Vec3::new(1.125, BALL_RADIUS, -2.225));
        table.set_initial_position(BallRole::Target, Vec3::new(0.0, BALL_RADIUS, 4.45));
        table.set_initial_position(BallRole::Secondary, Vec3::new(-9.0, BALL_RADIUS, 0.0));
        table
    }

    #[test]
    fn test_order_and_normalization() {
        let mut collector = ObservationCollector::new(Vec2::new(2.25, 4.45), Vec3::ZERO);
        let obs = collector.collect(Some(&table()), BallRole::Main);
        assert_eq!(obs, [0.5, -0.5, 0.0, 1.0, -1.0, 0.0]);
        assert!(collector.last_snapshot().starts_with("controlled=Main"));
    }

    #[test]
    fn test_secondary_sees_main_as_other() {
        let mut collector = ObservationCollector::new(Vec2::new(2.25, 4.45), Vec3::ZERO);
        let obs = collector.collect(Some(&table()), BallRole::Secondary);
        assert_eq!(&obs[0..2], &[-1.0, 0.0]);
        assert_eq!(&obs[4..6], &[0.5, -0.5]);
    }

    #[test]
    fn test_no_table_is_zero() {
        let mut collector = ObservationCollector::new(Vec2::new(2.25, 4.45), Vec3::ZERO);
        let obs = collector.collect::<ScriptedPhysics>(None, BallRole::Main);
        assert_eq!(obs, [0.0; OBSERVATION_SIZE]);
    }

    #[test]
    fn test_origin_offset() {
        let mut collector = ObservationCollector::new(Vec2::new(2.25, 4.45), Vec3::new(1.125, 0.0, 0.0));
        let obs = collector.collect(Some(&table()), BallRole::Main);
        assert_eq!(obs[0], 0.0);
    }
}
