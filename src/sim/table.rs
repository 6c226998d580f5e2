//! Balls, the physics seam and the table reset routine
//!
//! The physics engine itself sits behind the [`Physics`] trait. The table
//! owns one backend plus the bookkeeping the turn flow needs on top of it:
//! spawn poses, per-ball motion state, the settlement tracker and the
//! two-step reset. The reset stops every ball immediately, then teleports
//! them home on the next tick and arms the settlement grace.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::motion::{BallMotionState, MotionSample};
use super::settlement::{Settlement, SettlementInput, TableSettlementTracker};
use crate::config::{Config, MotionConfig};
use crate::consts::BALL_RADIUS;

/// Ball identity. Fixed for the life of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BallRole {
    /// First player's cue ball
    Main,
    /// Object ball
    Target,
    /// Second player's cue ball in two-ball mode
    Secondary,
}

impl BallRole {
    pub const ALL: [BallRole; 3] = [BallRole::Main, BallRole::Target, BallRole::Secondary];

    pub fn index(self) -> usize {
        match self {
            BallRole::Main => 0,
            BallRole::Target => 1,
            BallRole::Secondary => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BallRole::Main => "Main",
            BallRole::Target => "Target",
            BallRole::Secondary => "Secondary",
        }
    }
}

/// Small identity set of balls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BallSet(u8);

impl BallSet {
    pub fn new() -> Self {
        Self(0)
    }

    /// Returns true if the ball was not yet in the set
    pub fn insert(&mut self, role: BallRole) -> bool {
        let bit = 1 << role.index();
        let fresh = self.0 & bit == 0;
        self.0 |= bit;
        fresh
    }

    pub fn contains(&self, role: BallRole) -> bool {
        self.0 & (1 << role.index()) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// What a ball touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactTarget {
    Cushion,
    Ball(BallRole),
    /// Anything else (bed, cue, frame)
    Other,
}

/// Raw events reported by a physics step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsEvent {
    Contact { ball: BallRole, other: ContactTarget },
    /// The ball left the playable volume
    LeftTable(BallRole),
}

/// Cushion proximity queries
pub trait CushionProbe {
    /// Ball is resting against any cushion
    fn touching_cushion(&self, ball: BallRole) -> bool;
    /// Ball is resting against a cushion that lies along `direction` (table plane)
    fn touching_cushion_in_direction(&self, ball: BallRole, direction: Vec3) -> bool;
}

/// Rigid-body engine driving the balls
pub trait Physics: CushionProbe {
    fn apply_impulse(&mut self, ball: BallRole, impulse: Vec3);
    /// (linear, angular) velocity
    fn velocity(&self, ball: BallRole) -> (Vec3, Vec3);
    fn set_velocity(&mut self, ball: BallRole, linear: Vec3, angular: Vec3);
    fn position(&self, ball: BallRole) -> Vec3;
    /// Move a ball and stop it
    fn teleport(&mut self, ball: BallRole, position: Vec3, rotation: Quat);
    /// Advance the simulation, returning contacts before exits
    fn step(&mut self, dt: f32) -> Vec<PhysicsEvent>;
    /// Would a cue capsule behind `ball` along `forward` hit anything?
    ///
    /// The capsule starts `clearance` behind the ball center and extends
    /// `length` further back with the given radius. The ball itself is ignored.
    fn is_path_blocked(
        &self,
        ball: BallRole,
        forward: Vec3,
        clearance: f32,
        length: f32,
        radius: f32,
    ) -> bool;
}

/// Position and orientation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Default break layout
pub fn default_spawns() -> [Pose; 3] {
    [
        Pose::at(Vec3::new(-0.5, BALL_RADIUS, -3.0)),
        Pose::at(Vec3::new(0.0, BALL_RADIUS, 3.0)),
        Pose::at(Vec3::new(0.5, BALL_RADIUS, -3.0)),
    ]
}

/// Events from one table step, in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableEvent {
    Contact { ball: BallRole, other: ContactTarget },
    /// Ball went off the table and was already returned to its spawn
    OutOfBounds(BallRole),
    AllBallsStopped { forced: bool },
    /// Every ball is back on its spawn pose
    ResetCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResetPhase {
    Idle,
    /// Balls stopped, teleport on the next step
    Pending,
}

pub struct Table<P: Physics> {
    physics: P,
    spawns: [Pose; 3],
    motion: [BallMotionState; 3],
    motion_config: MotionConfig,
    tracker: TableSettlementTracker,
    reset: ResetPhase,
}

impl<P: Physics> Table<P> {
    pub fn new(physics: P, config: &Config) -> Self {
        let mut table = Self {
            physics,
            spawns: default_spawns(),
            motion: [BallMotionState::new(); 3],
            motion_config: config.motion.clone(),
            tracker: TableSettlementTracker::new(config.settlement.clone()),
            reset: ResetPhase::Idle,
        };
        table.place_on_spawns();
        table
    }

    pub fn physics(&self) -> &P {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut P {
        &mut self.physics
    }

    pub fn position(&self, ball: BallRole) -> Vec3 {
        self.physics.position(ball)
    }

    pub fn positions(&self) -> [Vec3; 3] {
        BallRole::ALL.map(|role| self.physics.position(role))
    }

    pub fn spawn(&self, ball: BallRole) -> Pose {
        self.spawns[ball.index()]
    }

    pub fn motion(&self, ball: BallRole) -> &BallMotionState {
        &self.motion[ball.index()]
    }

    pub fn is_ball_moving(&self, ball: BallRole) -> bool {
        self.motion[ball.index()].is_moving()
    }

    pub fn are_balls_moving(&self) -> bool {
        self.motion.iter().any(BallMotionState::is_moving)
    }

    pub fn is_resetting(&self) -> bool {
        self.reset == ResetPhase::Pending
    }

    pub fn in_reset_grace(&self) -> bool {
        self.tracker.in_grace()
    }

    /// Strike a ball from a cue
    pub fn apply_impulse(&mut self, ball: BallRole, impulse: Vec3) {
        self.physics.apply_impulse(ball, impulse);
        self.motion[ball.index()].mark_moving();
    }

    /// Zero every velocity without moving anything
    pub fn stop_all_balls_without_reset(&mut self) {
        for role in BallRole::ALL {
            self.physics.set_velocity(role, Vec3::ZERO, Vec3::ZERO);
            self.motion[role.index()].reset();
        }
    }

    /// Start the reset routine. Returns false if one is already in flight.
    pub fn reset_game(&mut self) -> bool {
        if self.is_resetting() {
            log::debug!("Table reset already in progress");
            return false;
        }
        log::info!("Resetting table");
        self.stop_all_balls_without_reset();
        self.tracker.clear();
        self.reset = ResetPhase::Pending;
        true
    }

    /// Move a ball and make that its new spawn
    pub fn set_initial_position(&mut self, ball: BallRole, position: Vec3) {
        self.spawns[ball.index()] = Pose::at(position);
        self.teleport_to_spawn(ball);
    }

    pub fn teleport_to_spawn(&mut self, ball: BallRole) {
        let pose = self.spawns[ball.index()];
        self.physics.teleport(ball, pose.position, pose.rotation);
        self.motion[ball.index()].reset();
    }

    /// Settle everything right now, dropping any open moving phase
    pub fn settle_now(&mut self) {
        self.stop_all_balls_without_reset();
        self.tracker.clear();
    }

    fn place_on_spawns(&mut self) {
        for role in BallRole::ALL {
            self.teleport_to_spawn(role);
        }
    }

    /// Advance one fixed step
    pub fn step(&mut self, dt: f32, cue_mid_strike: bool) -> Vec<TableEvent> {
        let mut events = Vec::new();

        if self.reset == ResetPhase::Pending {
            self.place_on_spawns();
            self.tracker.arm_reset_grace();
            self.reset = ResetPhase::Idle;
            log::info!("Table reset complete");
            events.push(TableEvent::ResetCompleted);
            return events;
        }

        for event in self.physics.step(dt) {
            match event {
                PhysicsEvent::Contact { ball, other } => {
                    events.push(TableEvent::Contact { ball, other });
                }
                PhysicsEvent::LeftTable(ball) => {
                    log::info!("{} ball left the table", ball.as_str());
                    self.teleport_to_spawn(ball);
                    events.push(TableEvent::OutOfBounds(ball));
                }
            }
        }

        for role in BallRole::ALL {
            let (linear, angular) = self.physics.velocity(role);
            let sample = self.motion[role.index()].update(linear, angular, dt, &self.motion_config);
            if sample == MotionSample::HardStop {
                self.physics.set_velocity(role, Vec3::ZERO, Vec3::ZERO);
            }
        }

        let input = SettlementInput {
            any_ball_moving: self.are_balls_moving(),
            cue_mid_strike,
            resetting: self.is_resetting(),
        };
        if let Some(Settlement::AllBallsStopped { forced }) = self.tracker.update(input, dt) {
            if forced {
                self.stop_all_balls_without_reset();
            }
            events.push(TableEvent::AllBallsStopped { forced });
        }

        events
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::consts::SIM_DT;

    /// Scriptable backend: balls coast at constant velocity until told otherwise
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedPhysics {
        pub positions: [Vec3; 3],
        pub linear: [Vec3; 3],
        pub angular: [Vec3; 3],
        pub queued: Vec<PhysicsEvent>,
        pub impulses: Vec<(BallRole, Vec3)>,
        pub blocked: bool,
        pub touching: Option<(BallRole, Vec3)>,
    }

    impl CushionProbe for ScriptedPhysics {
        fn touching_cushion(&self, ball: BallRole) -> bool {
            self.touching.is_some_and(|(b, _)| b == ball)
        }

        fn touching_cushion_in_direction(&self, ball: BallRole, direction: Vec3) -> bool {
            self.touching
                .is_some_and(|(b, normal)| b == ball && direction.dot(normal) > 0.0)
        }
    }

    impl Physics for ScriptedPhysics {
        fn apply_impulse(&mut self, ball: BallRole, impulse: Vec3) {
            self.impulses.push((ball, impulse));
            self.linear[ball.index()] += impulse;
        }

        fn velocity(&self, ball: BallRole) -> (Vec3, Vec3) {
            (self.linear[ball.index()], self.angular[ball.index()])
        }

        fn set_velocity(&mut self, ball: BallRole, linear: Vec3, angular: Vec3) {
            self.linear[ball.index()] = linear;
            self.angular[ball.index()] = angular;
        }

        fn position(&self, ball: BallRole) -> Vec3 {
            self.positions[ball.index()]
        }

        fn teleport(&mut self, ball: BallRole, position: Vec3, _rotation: Quat) {
            self.positions[ball.index()] = position;
            self.linear[ball.index()] = Vec3::ZERO;
            self.angular[ball.index()] = Vec3::ZERO;
        }

        fn step(&mut self, dt: f32) -> Vec<PhysicsEvent> {
            for i in 0..3 {
                self.positions[i] += self.linear[i] * dt;
            }
            std::mem::take(&mut self.queued)
        }

        fn is_path_blocked(&self, _: BallRole, _: Vec3, _: f32, _: f32, _: f32) -> bool {
            self.blocked
        }
    }

    fn table() -> Table<ScriptedPhysics> {
        Table::new(ScriptedPhysics::default(), &Config::default())
    }

    #[test]
    fn test_ball_set_uniqueness() {
        let mut set = BallSet::new();
        assert!(set.insert(BallRole::Target));
        assert!(!set.insert(BallRole::Target));
        assert!(set.insert(BallRole::Secondary));
        assert_eq!(set.len(), 2);
        assert!(set.contains(BallRole::Target));
        assert!(!set.contains(BallRole::Main));
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_new_table_places_balls_on_spawns() {
        let table = table();
        for role in BallRole::ALL {
            assert_eq!(table.position(role), table.spawn(role).position);
        }
        assert!(!table.are_balls_moving());
    }

    #[test]
    fn test_reset_completes_next_step() {
        let mut table = table();
        table.physics_mut().positions[0] = Vec3::new(1.0, BALL_RADIUS, 1.0);
        table.apply_impulse(BallRole::Main, Vec3::X);

        assert!(table.reset_game());
        assert!(!table.reset_game());
        assert!(table.is_resetting());
        assert!(!table.are_balls_moving());

        let events = table.step(SIM_DT, false);
        assert_eq!(events, vec![TableEvent::ResetCompleted]);
        assert!(!table.is_resetting());
        assert!(table.in_reset_grace());
        assert_eq!(table.position(BallRole::Main), table.spawn(BallRole::Main).position);
    }

    #[test]
    fn test_out_of_bounds_ball_returns_to_spawn() {
        let mut table = table();
        table.physics_mut().positions[1] = Vec3::new(9.0, -1.0, 0.0);
        table.physics_mut().queued.push(PhysicsEvent::LeftTable(BallRole::Target));

        let events = table.step(SIM_DT, false);
        assert_eq!(events, vec![TableEvent::OutOfBounds(BallRole::Target)]);
        assert_eq!(table.position(BallRole::Target), table.spawn(BallRole::Target).position);
    }

    #[test]
    fn test_shot_then_settle() {
        let mut table = table();
        table.apply_impulse(BallRole::Main, Vec3::new(0.0, 0.0, 1.0));
        let mut stopped = Vec::new();
        for i in 0..240 {
            if i == 60 {
                table.physics_mut().set_velocity(BallRole::Main, Vec3::ZERO, Vec3::ZERO);
            }
            stopped.extend(
                table
                    .step(SIM_DT, false)
                    .into_iter()
                    .filter(|e| matches!(e, TableEvent::AllBallsStopped { .. })),
            );
        }
        assert_eq!(stopped, vec![TableEvent::AllBallsStopped { forced: false }]);
    }

    #[test]
    fn test_set_initial_position_moves_spawn() {
        let mut table = table();
        let spot = Vec3::new(1.0, BALL_RADIUS, -1.0);
        table.set_initial_position(BallRole::Secondary, spot);
        assert_eq!(table.position(BallRole::Secondary), spot);
        assert!(table.reset_game());
        table.step(SIM_DT, false);
        assert_eq!(table.position(BallRole::Secondary), spot);
    }
}
