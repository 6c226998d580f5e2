//! Shot gateway between the turn flow and the table
//!
//! Owns the table, both cue sticks and the rule engine. Every shot, human or
//! agent, goes through [`Environment::try_queue_shot`], which validates it
//! against table state before a cue moves. Also hosts the stall watchdogs
//! that run while the agent is deciding.

use super::action::ShotParameters;
use super::cue::{CueOwner, CueStick};
use super::episode::{EpisodeEnd, EpisodeState};
use super::rules::ShotRuleEngine;
use super::table::{BallRole, Physics, Table, TableEvent};
use crate::config::{BallMode, Config, GameMode, WatchdogConfig};

/// Whose cue is live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Player,
    Agent,
    /// No turn order; the agent cue is used (training)
    None,
}

/// Result of a shot request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotResult {
    Success,
    /// Balls still moving or the cue is mid-stroke
    Busy,
    /// The stick would pass through a rail or ball
    Blocked,
    Resetting,
    Failed,
}

impl ShotResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotResult::Success => "Success",
            ShotResult::Busy => "Busy",
            ShotResult::Blocked => "Blocked",
            ShotResult::Resetting => "Resetting",
            ShotResult::Failed => "Failed",
        }
    }
}

/// Cue sticks on the table. The primary cue is the player's, the secondary the agent's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueSlot {
    Primary,
    Secondary,
}

impl CueSlot {
    fn index(self) -> usize {
        match self {
            CueSlot::Primary => 0,
            CueSlot::Secondary => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogKind {
    /// Table idle while a decision is awaited
    Idle,
    /// Agent cue still animating on a still table
    CueStuck,
}

impl WatchdogKind {
    pub fn reason(&self) -> &'static str {
        match self {
            WatchdogKind::Idle => "Balls stayed idle too long.",
            WatchdogKind::CueStuck => "Cue stick animation stuck.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchdogEvent {
    Started(WatchdogKind),
    Updated {
        kind: WatchdogKind,
        elapsed: f32,
        timeout: f32,
    },
    Cancelled(WatchdogKind),
    /// A watchdog forced a recovery
    Triggered { reason: String },
}

impl WatchdogEvent {
    /// Countdown line for a status display
    pub fn text(&self) -> String {
        match self {
            WatchdogEvent::Started(kind) => format!("{kind:?} watchdog armed"),
            WatchdogEvent::Updated {
                kind,
                elapsed,
                timeout,
            } => format!("{kind:?} reset in {:.1}s", (timeout - elapsed).max(0.0)),
            WatchdogEvent::Cancelled(kind) => format!("{kind:?} watchdog cancelled"),
            WatchdogEvent::Triggered { reason } => format!("Reset: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Countdown {
    elapsed: f32,
    active: bool,
}

impl Countdown {
    /// Advance while `running`; true once the timeout is reached
    fn sample(
        &mut self,
        running: bool,
        dt: f32,
        timeout: f32,
        kind: WatchdogKind,
        events: &mut Vec<WatchdogEvent>,
    ) -> bool {
        if !running {
            self.cancel(kind, events);
            return false;
        }
        self.elapsed += dt;
        if !self.active && self.elapsed > 0.0 {
            self.active = true;
            events.push(WatchdogEvent::Started(kind));
        }
        events.push(WatchdogEvent::Updated {
            kind,
            elapsed: self.elapsed,
            timeout,
        });
        self.elapsed >= timeout
    }

    fn cancel(&mut self, kind: WatchdogKind, events: &mut Vec<WatchdogEvent>) {
        self.elapsed = 0.0;
        if self.active {
            self.active = false;
            events.push(WatchdogEvent::Cancelled(kind));
        }
    }
}

/// Idle and cue-stuck timers
#[derive(Debug, Clone)]
pub struct Watchdogs {
    idle: Countdown,
    cue_stuck: Countdown,
    idle_timeout: f32,
    cue_stuck_timeout: f32,
    events: Vec<WatchdogEvent>,
}

impl Watchdogs {
    pub fn new(config: &WatchdogConfig, training: bool) -> Self {
        let (idle_timeout, cue_stuck_timeout) = config.timeouts(training);
        Self {
            idle: Countdown::default(),
            cue_stuck: Countdown::default(),
            idle_timeout,
            cue_stuck_timeout,
            events: Vec::new(),
        }
    }

    pub fn timeouts(&self) -> (f32, f32) {
        (self.idle_timeout, self.cue_stuck_timeout)
    }

    pub fn is_active(&self) -> bool {
        self.idle.active || self.cue_stuck.active
    }

    /// One monitoring step. Returns the watchdog that timed out, if any.
    pub fn monitor(
        &mut self,
        resetting: bool,
        balls_moving: bool,
        agent_cue_shooting: bool,
        dt: f32,
    ) -> Option<WatchdogKind> {
        if resetting {
            self.reset();
            return None;
        }

        if self.idle.sample(
            !balls_moving,
            dt,
            self.idle_timeout,
            WatchdogKind::Idle,
            &mut self.events,
        ) {
            return Some(WatchdogKind::Idle);
        }

        if self.cue_stuck.sample(
            agent_cue_shooting && !balls_moving,
            dt,
            self.cue_stuck_timeout,
            WatchdogKind::CueStuck,
            &mut self.events,
        ) {
            return Some(WatchdogKind::CueStuck);
        }
        None
    }

    /// Zero both timers, announcing any that were running
    pub fn reset(&mut self) {
        self.idle.cancel(WatchdogKind::Idle, &mut self.events);
        self.cue_stuck.cancel(WatchdogKind::CueStuck, &mut self.events);
    }

    pub fn drain_events(&mut self) -> Vec<WatchdogEvent> {
        std::mem::take(&mut self.events)
    }
}

pub struct Environment<P: Physics> {
    table: Table<P>,
    cues: [CueStick; 2],
    rules: ShotRuleEngine,
    turn: TurnState,
    reset_requested: bool,
    watchdogs: Watchdogs,
    turn_changes: Vec<TurnState>,
}

impl<P: Physics> Environment<P> {
    pub fn new(physics: P, config: &Config) -> Self {
        let cues = [
            CueStick::new(CueOwner::Player, BallRole::Main, config.cue.clone()),
            CueStick::new(CueOwner::Agent, BallRole::Main, config.cue.clone()),
        ];
        let mut env = Self {
            table: Table::new(physics, config),
            cues,
            rules: ShotRuleEngine::new(config.game.effective_winning_score()),
            turn: TurnState::None,
            reset_requested: false,
            watchdogs: Watchdogs::new(&config.agent.watchdog, config.game.training),
            turn_changes: Vec::new(),
        };
        env.configure_cues(config.game.game_mode, config.game.ball_mode);
        env
    }

    pub fn table(&self) -> &Table<P> {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut Table<P> {
        &mut self.table
    }

    pub fn rules(&self) -> &ShotRuleEngine {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut ShotRuleEngine {
        &mut self.rules
    }

    pub fn cue(&self, slot: CueSlot) -> &CueStick {
        &self.cues[slot.index()]
    }

    pub fn cue_mut(&mut self, slot: CueSlot) -> &mut CueStick {
        &mut self.cues[slot.index()]
    }

    pub fn turn(&self) -> TurnState {
        self.turn
    }

    pub fn is_agent_turn(&self) -> bool {
        matches!(self.turn, TurnState::Agent | TurnState::None)
    }

    pub fn is_reset_requested(&self) -> bool {
        self.reset_requested
    }

    /// Reset requested or the table routine is running
    pub fn is_resetting(&self) -> bool {
        self.reset_requested || self.table.is_resetting()
    }

    pub fn watchdogs(&self) -> &Watchdogs {
        &self.watchdogs
    }

    pub fn watchdogs_mut(&mut self) -> &mut Watchdogs {
        &mut self.watchdogs
    }

    /// Turn changes since the last drain
    pub fn drain_turn_changes(&mut self) -> Vec<TurnState> {
        std::mem::take(&mut self.turn_changes)
    }

    /// Owners and target balls for a mode
    pub fn configure_cues(&mut self, mode: GameMode, ball_mode: BallMode) {
        let primary_owner = if mode == GameMode::AiOnly {
            CueOwner::Agent
        } else {
            CueOwner::Player
        };
        let secondary_owner = if mode == GameMode::TwoPlayer {
            CueOwner::Player
        } else {
            CueOwner::Agent
        };
        let secondary_target = match ball_mode {
            BallMode::SameBall => BallRole::Main,
            BallMode::DifferentBalls => BallRole::Secondary,
        };

        let [primary, secondary] = &mut self.cues;
        primary.set_owner(primary_owner);
        primary.set_target(BallRole::Main);
        secondary.set_owner(secondary_owner);
        secondary.set_target(secondary_target);
        log::info!(
            "Cues configured for {}: primary {:?} on {}, secondary {:?} on {}",
            mode.as_str(),
            primary_owner,
            BallRole::Main.as_str(),
            secondary_owner,
            secondary_target.as_str()
        );
    }

    /// Cue used by the current turn
    pub fn cue_slot_for_turn(&self) -> CueSlot {
        match self.turn {
            TurnState::Player => CueSlot::Primary,
            TurnState::Agent | TurnState::None => CueSlot::Secondary,
        }
    }

    /// Ball the agent's cue strikes
    pub fn agent_controlled_ball(&self) -> BallRole {
        self.cue(CueSlot::Secondary).target()
    }

    /// Validate and dispatch a shot with the cue of the current turn
    pub fn try_queue_shot(&mut self, shot: ShotParameters) -> ShotResult {
        self.try_queue_shot_with(self.cue_slot_for_turn(), shot)
    }

    /// Validate and dispatch a shot with a specific cue
    pub fn try_queue_shot_with(&mut self, slot: CueSlot, shot: ShotParameters) -> ShotResult {
        if !shot.is_finite() {
            log::warn!("Rejecting non-finite shot {shot:?}");
            return ShotResult::Failed;
        }
        if self.table.are_balls_moving() {
            return ShotResult::Busy;
        }
        if self.is_resetting() {
            log::warn!("Cannot queue shot, table reset requested or in progress");
            return ShotResult::Resetting;
        }

        let cue = &self.cues[slot.index()];
        if cue.is_blocked_for_angles(self.table.physics(), shot.angle_x, shot.angle_y) {
            log::warn!(
                "Blocked shot at angle_x {:.2}, angle_y {:.2}",
                shot.angle_x,
                shot.angle_y
            );
            return ShotResult::Blocked;
        }

        log::info!(
            "Shot with angle_x {:.2}, angle_y {:.2}, power {:.2}",
            shot.angle_x,
            shot.angle_y,
            shot.power
        );
        let target = cue.target();
        let dir = crate::shot_direction(shot.angle_x, shot.angle_y);
        self.rules.start_turn(target, Some(dir), self.table.physics());

        if self.cues[slot.index()].shoot(shot.angle_x, shot.angle_y, shot.power) {
            ShotResult::Success
        } else {
            ShotResult::Busy
        }
    }

    /// Open rule tracking for `slot`'s ball, aimed along the cue's current pose
    pub fn start_rules_turn(&mut self, slot: CueSlot) {
        let cue = &self.cues[slot.index()];
        self.rules
            .start_turn(cue.target(), Some(cue.forward()), self.table.physics());
    }

    /// Request a full table reset; ignored while one is pending
    pub fn request_environment_reset(&mut self) {
        if self.reset_requested {
            return;
        }
        self.reset_requested = true;
        self.table.reset_game();
    }

    /// The table finished a reset that this environment requested
    pub fn complete_reset(&mut self) {
        self.reset_requested = false;
        self.watchdogs.reset();
    }

    /// Returns true if the turn changed
    pub fn set_turn_state(&mut self, turn: TurnState) -> bool {
        if self.turn == turn {
            return false;
        }
        self.turn = turn;
        self.turn_changes.push(turn);
        self.align_cue_for_turn();
        true
    }

    pub fn switch_turn(&mut self) {
        let next = match self.turn {
            TurnState::Player => TurnState::Agent,
            TurnState::Agent => TurnState::Player,
            TurnState::None => {
                log::warn!("Cannot switch turn without a turn order");
                return;
            }
        };
        self.set_turn_state(next);
    }

    /// Snap the cue of the current turn back to its address pose
    pub fn align_cue_for_turn(&mut self) {
        if self.turn == TurnState::None {
            return;
        }
        let slot = self.cue_slot_for_turn();
        self.cues[slot.index()].force_align();
    }

    pub fn any_cue_shooting(&self) -> bool {
        self.cues.iter().any(CueStick::is_shooting)
    }

    pub fn any_cue_mid_strike(&self) -> bool {
        self.cues.iter().any(CueStick::is_mid_strike)
    }

    /// Advance both strokes, striking balls on contact
    pub fn tick_cues(&mut self, dt: f32) {
        for cue in &mut self.cues {
            if let Some(impulse) = cue.tick(dt) {
                self.table.apply_impulse(cue.target(), impulse);
            }
        }
    }

    pub fn step_table(&mut self, dt: f32) -> Vec<TableEvent> {
        let mid_strike = self.any_cue_mid_strike();
        self.table.step(dt, mid_strike)
    }

    pub fn notify_cues_balls_stopped(&mut self) {
        for cue in &mut self.cues {
            cue.notify_all_balls_stopped();
        }
    }

    /// Watchdog step; only meaningful while a decision is awaited
    pub fn monitor_environment_watchdogs(&mut self, dt: f32) -> Option<WatchdogKind> {
        let resetting = self.is_resetting();
        let moving = self.table.are_balls_moving();
        let agent_shooting = self.cue(CueSlot::Secondary).is_shooting();
        self.watchdogs.monitor(resetting, moving, agent_shooting, dt)
    }

    /// Hard recovery after a stall. Returns false if a reset was already pending.
    pub fn force_environment_recovery(&mut self, reason: &str, episode: &mut EpisodeState) -> bool {
        if self.reset_requested {
            return false;
        }
        log::warn!("{reason} Forcing hard reset.");
        self.rules.finalize_turn_tracking();
        self.watchdogs.events.push(WatchdogEvent::Triggered {
            reason: reason.to_string(),
        });
        self.watchdogs.reset();
        episode.end_episode(EpisodeEnd::Watchdog);
        self.request_environment_reset();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use crate::sim::table::tests::ScriptedPhysics;
    use glam::Vec3;

    fn env() -> Environment<ScriptedPhysics> {
        Environment::new(ScriptedPhysics::default(), &Config::default())
    }

    fn shot() -> ShotParameters {
        ShotParameters::new(0.0, 10.0, 8.0)
    }

    #[test]
    fn test_blocked_shot_leaves_table_untouched() {
        let mut env = env();
        env.table_mut().physics_mut().blocked = true;
        env.set_turn_state(TurnState::Agent);
        let before = env.table().positions();

        assert_eq!(env.try_queue_shot(shot()), ShotResult::Blocked);
        assert!(!env.any_cue_shooting());
        for _ in 0..120 {
            env.tick_cues(SIM_DT);
        }
        assert!(env.table().physics().impulses.is_empty());
        assert_eq!(env.table().positions(), before);
    }

    #[test]
    fn test_busy_while_balls_move() {
        let mut env = env();
        env.table_mut().apply_impulse(BallRole::Target, Vec3::X);
        assert_eq!(env.try_queue_shot(shot()), ShotResult::Busy);
    }

    #[test]
    fn test_resetting_refuses_shots() {
        let mut env = env();
        env.request_environment_reset();
        assert!(env.is_reset_requested());
        assert_eq!(env.try_queue_shot(shot()), ShotResult::Resetting);

        assert_eq!(env.step_table(SIM_DT), vec![TableEvent::ResetCompleted]);
        env.complete_reset();
        assert!(!env.is_resetting());
    }

    #[test]
    fn test_invalid_numbers_fail() {
        let mut env = env();
        let shot = ShotParameters::new(f32::NAN, 0.0, 5.0);
        assert_eq!(env.try_queue_shot(shot), ShotResult::Failed);
    }

    #[test]
    fn test_success_starts_tracking_and_strikes() {
        let mut env = env();
        env.set_turn_state(TurnState::Agent);
        assert_eq!(env.try_queue_shot(shot()), ShotResult::Success);
        assert_eq!(env.rules().tracked_ball(), Some(BallRole::Main));
        assert!(env.rules().is_turn_active());

        // Second request while the stroke runs
        assert_eq!(env.try_queue_shot(shot()), ShotResult::Busy);

        for _ in 0..120 {
            env.tick_cues(SIM_DT);
        }
        let impulses = &env.table().physics().impulses;
        assert_eq!(impulses.len(), 1);
        assert_eq!(impulses[0].0, BallRole::Main);
    }

    #[test]
    fn test_cue_selection_by_turn() {
        let mut env = env();
        assert_eq!(env.cue_slot_for_turn(), CueSlot::Secondary);
        assert!(env.set_turn_state(TurnState::Player));
        assert_eq!(env.cue_slot_for_turn(), CueSlot::Primary);
        assert!(!env.set_turn_state(TurnState::Player));
        env.switch_turn();
        assert_eq!(env.turn(), TurnState::Agent);
        assert_eq!(env.drain_turn_changes(), vec![TurnState::Player, TurnState::Agent]);
    }

    #[test]
    fn test_switch_turn_needs_turn_order() {
        let mut env = env();
        env.switch_turn();
        assert_eq!(env.turn(), TurnState::None);
        assert!(env.drain_turn_changes().is_empty());
    }

    #[test]
    fn test_cue_configuration_per_mode() {
        let mut env = env();
        env.configure_cues(GameMode::TwoPlayer, BallMode::DifferentBalls);
        assert_eq!(env.cue(CueSlot::Primary).owner(), CueOwner::Player);
        assert_eq!(env.cue(CueSlot::Secondary).owner(), CueOwner::Player);
        assert_eq!(env.agent_controlled_ball(), BallRole::Secondary);

        env.configure_cues(GameMode::AiOnly, BallMode::SameBall);
        assert_eq!(env.cue(CueSlot::Primary).owner(), CueOwner::Agent);
        assert_eq!(env.cue(CueSlot::Secondary).owner(), CueOwner::Agent);
        assert_eq!(env.agent_controlled_ball(), BallRole::Main);
    }

    #[test]
    fn test_initial_cushion_credit_uses_real_direction() {
        let mut env = env();
        env.table_mut().physics_mut().touching = Some((BallRole::Main, Vec3::NEG_Z));
        env.set_turn_state(TurnState::Agent);
        // Yaw 180 aims along -Z, into the rail
        env.try_queue_shot(ShotParameters::new(180.0, 10.0, 8.0));
        assert_eq!(env.rules().cushion_contacts(), 1);
    }

    #[test]
    fn test_idle_watchdog_triggers_recovery_once() {
        let mut env = env();
        let mut episode = EpisodeState::new();
        episode.begin_episode(false);
        let (idle, _) = env.watchdogs().timeouts();
        let steps = (idle / SIM_DT) as usize + 2;

        let mut fired = None;
        for _ in 0..steps {
            if let Some(kind) = env.monitor_environment_watchdogs(SIM_DT) {
                fired = Some(kind);
                break;
            }
        }
        assert_eq!(fired, Some(WatchdogKind::Idle));
        assert!(env.force_environment_recovery(WatchdogKind::Idle.reason(), &mut episode));
        assert!(!env.force_environment_recovery(WatchdogKind::Idle.reason(), &mut episode));

        let events = env.watchdogs_mut().drain_events();
        assert_eq!(events[0], WatchdogEvent::Started(WatchdogKind::Idle));
        let triggered = events
            .iter()
            .filter(|e| matches!(e, WatchdogEvent::Triggered { .. }))
            .count();
        assert_eq!(triggered, 1);
        assert_eq!(events.last(), Some(&WatchdogEvent::Cancelled(WatchdogKind::Idle)));

        assert!(env.is_reset_requested());
        assert_eq!(episode.take_summary().map(|s| s.reason), Some(EpisodeEnd::Watchdog));
    }

    #[test]
    fn test_watchdog_paused_while_resetting() {
        let mut env = env();
        env.monitor_environment_watchdogs(SIM_DT);
        assert!(env.watchdogs().is_active());
        env.request_environment_reset();
        assert_eq!(env.monitor_environment_watchdogs(100.0), None);
        assert!(!env.watchdogs().is_active());
    }

    #[test]
    fn test_moving_balls_cancel_idle_watchdog() {
        let mut watchdogs = Watchdogs::new(&WatchdogConfig::default(), false);
        watchdogs.monitor(false, false, false, 1.0);
        watchdogs.monitor(false, true, false, 1.0);
        let events = watchdogs.drain_events();
        assert_eq!(
            events,
            vec![
                WatchdogEvent::Started(WatchdogKind::Idle),
                WatchdogEvent::Updated {
                    kind: WatchdogKind::Idle,
                    elapsed: 1.0,
                    timeout: 5.0,
                },
                WatchdogEvent::Cancelled(WatchdogKind::Idle),
            ]
        );
    }

    #[test]
    fn test_cue_stuck_uses_half_timeout() {
        let mut watchdogs = Watchdogs::new(&WatchdogConfig::default(), true);
        assert_eq!(watchdogs.timeouts(), (10.0, 5.0));
        // Idle keeps counting too, so the shorter cue timer wins
        for _ in 0..4 {
            assert_eq!(watchdogs.monitor(false, false, true, 1.0), None);
        }
        assert_eq!(watchdogs.monitor(false, false, true, 1.0), Some(WatchdogKind::CueStuck));
    }
}
