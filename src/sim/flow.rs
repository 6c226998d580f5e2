//! Turn flow state machine
//!
//! Owns the whole session: who plays next, when the agent is asked for a
//! decision, how settlements are resolved into points and turn changes, and
//! how fouls and resets feed back into the flow. Every delayed step goes
//! through the [`Scheduler`] so it can be cancelled when the state moves on.

use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::action::ShotParameters;
use super::agent::{BilliardAgent, Policy};
use super::environment::{CueSlot, Environment, ShotResult, TurnState, WatchdogEvent};
use super::episode::{EpisodeStart, EpisodeSummary, random_layout};
use super::reward::{TurnEndContext, TurnResolution};
use super::table::{BallRole, Physics, TableEvent};
use super::timer::Scheduler;
use crate::config::{Config, GameMode};
use crate::consts::{PLAY_TIME_SCALE, TRAINING_TIME_SCALE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameFlowState {
    Idle,
    PlayerTurn,
    WaitingForPlayerShot,
    AgentTurn,
    AgentDeciding,
    AgentShooting,
    BallsMoving,
}

impl GameFlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameFlowState::Idle => "Idle",
            GameFlowState::PlayerTurn => "PlayerTurn",
            GameFlowState::WaitingForPlayerShot => "WaitingForPlayerShot",
            GameFlowState::AgentTurn => "AgentTurn",
            GameFlowState::AgentDeciding => "AgentDeciding",
            GameFlowState::AgentShooting => "AgentShooting",
            GameFlowState::BallsMoving => "BallsMoving",
        }
    }

    pub fn is_player_state(&self) -> bool {
        matches!(self, GameFlowState::PlayerTurn | GameFlowState::WaitingForPlayerShot)
    }

    pub fn is_agent_state(&self) -> bool {
        matches!(
            self,
            GameFlowState::AgentTurn | GameFlowState::AgentDeciding | GameFlowState::AgentShooting
        )
    }
}

/// Deferred flow steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowTask {
    /// AgentTurn settles in, move on to AgentDeciding
    ProgressAgentTurn,
    RequestDecision,
    /// The cue was busy; go back to AgentTurn for a fresh attempt
    BusyRetry,
    /// The table was resetting when the shot arrived
    ResettingRetry,
}

/// Outbound presentation events
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    TurnLabel(String),
    Result { text: String, success: bool },
    Scores([u32; 2]),
    Watchdog(WatchdogEvent),
    /// Shot the agent is about to play
    DecisionPreview(ShotParameters),
    WinPrompt { winner: usize, label: String },
    TurnChanged(TurnState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitStatus {
    Waiting,
    Done,
    TimedOut,
}

/// Poll a condition every tick, giving up after a timeout
#[derive(Debug, Clone, Copy)]
struct BoundedWait {
    elapsed: f32,
    timeout: f32,
}

impl BoundedWait {
    fn new(timeout: f32) -> Self {
        Self {
            elapsed: 0.0,
            timeout,
        }
    }

    fn poll(&mut self, still_waiting: bool, dt: f32) -> WaitStatus {
        if !still_waiting {
            WaitStatus::Done
        } else if self.elapsed >= self.timeout {
            WaitStatus::TimedOut
        } else {
            self.elapsed += dt;
            WaitStatus::Waiting
        }
    }
}

/// Settlement arrived while a cue was still animating
#[derive(Debug, Clone, Copy)]
struct SettleWait {
    wait: BoundedWait,
    bypass_state_check: bool,
}

pub struct TurnFlowController<P: Physics, Q: Policy> {
    pub(crate) config: Config,
    pub(crate) env: Environment<P>,
    pub(crate) agent: BilliardAgent<Q>,
    pub(crate) scheduler: Scheduler<FlowTask>,

    state: GameFlowState,
    last_state_before_moving: GameFlowState,
    current_player_index: usize,
    active_cue: CueSlot,

    // === Foul handling ===
    is_foul_reset: bool,
    pending_foul_reset: bool,
    pending_next_state: GameFlowState,

    // === Waits ===
    still_timer: f32,
    busy_wait: Option<BoundedWait>,
    settle_wait: Option<SettleWait>,
    decision_wait: f32,

    win_prompt: Option<usize>,
    last_scores: [u32; 2],
    ui: Vec<UiEvent>,
    rng: Pcg32,
    finished: Vec<EpisodeSummary>,
}

impl<P: Physics, Q: Policy> TurnFlowController<P, Q> {
    pub fn new(physics: P, policy: Q, config: Config, seed: u64) -> Self {
        let env = Environment::new(physics, &config);
        let agent = BilliardAgent::new(policy, &config.agent);
        log::info!(
            "Session starting: mode {}, balls {:?}, training {}",
            config.game.game_mode.as_str(),
            config.game.ball_mode,
            config.game.training
        );

        let mut flow = Self {
            config,
            env,
            agent,
            scheduler: Scheduler::new(),
            state: GameFlowState::Idle,
            last_state_before_moving: GameFlowState::Idle,
            current_player_index: 0,
            active_cue: CueSlot::Primary,
            is_foul_reset: false,
            pending_foul_reset: false,
            pending_next_state: GameFlowState::Idle,
            still_timer: 0.0,
            busy_wait: None,
            settle_wait: None,
            decision_wait: 0.0,
            win_prompt: None,
            last_scores: [0, 0],
            ui: Vec::new(),
            rng: Pcg32::seed_from_u64(seed),
            finished: Vec::new(),
        };
        flow.initialize_game_state(true);
        if flow.agent_involved() {
            flow.begin_episode();
        }
        flow
    }

    // === Accessors ===

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> GameFlowState {
        self.state
    }

    pub fn environment(&self) -> &Environment<P> {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut Environment<P> {
        &mut self.env
    }

    pub fn agent(&self) -> &BilliardAgent<Q> {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut BilliardAgent<Q> {
        &mut self.agent
    }

    pub fn current_player_index(&self) -> usize {
        self.current_player_index
    }

    pub fn active_cue(&self) -> CueSlot {
        self.active_cue
    }

    pub fn scores(&self) -> [u32; 2] {
        self.env.rules().scores()
    }

    /// Winner whose prompt is open, if any
    pub fn win_prompt(&self) -> Option<usize> {
        self.win_prompt
    }

    pub fn is_foul_reset_pending(&self) -> bool {
        self.pending_foul_reset
    }

    pub fn drain_ui_events(&mut self) -> Vec<UiEvent> {
        std::mem::take(&mut self.ui)
    }

    pub fn drain_finished_episodes(&mut self) -> Vec<EpisodeSummary> {
        std::mem::take(&mut self.finished)
    }

    /// Simulation speed multiplier; zero while a win prompt is open
    pub fn time_scale(&self) -> f32 {
        if self.config.game.training {
            TRAINING_TIME_SCALE
        } else if self.win_prompt.is_some() {
            0.0
        } else {
            PLAY_TIME_SCALE
        }
    }

    fn agent_involved(&self) -> bool {
        self.config.game.game_mode.agent_involved()
    }

    fn mode(&self) -> GameMode {
        self.config.game.game_mode
    }

    fn result(&mut self, text: &str, success: bool) {
        self.ui.push(UiEvent::Result {
            text: text.to_string(),
            success,
        });
    }

    fn player_label(&self) -> String {
        if self.mode() == GameMode::TwoPlayer {
            format!("Player {}", self.current_player_index + 1)
        } else {
            "Player".to_string()
        }
    }

    // === State machine ===

    /// Enter a state and run its entry actions
    pub fn change_state(&mut self, next: GameFlowState) {
        if self.state == next {
            return;
        }
        log::debug!("Flow {} -> {}", self.state.as_str(), next.as_str());
        if next == GameFlowState::BallsMoving {
            self.last_state_before_moving = self.state;
        }
        self.state = next;
        self.still_timer = 0.0;

        match next {
            GameFlowState::Idle | GameFlowState::AgentShooting | GameFlowState::BallsMoving => {}
            GameFlowState::PlayerTurn => {
                self.env.set_turn_state(TurnState::Player);
                self.active_cue = if self.mode() == GameMode::TwoPlayer && self.current_player_index == 1 {
                    CueSlot::Secondary
                } else {
                    if self.mode() != GameMode::TwoPlayer {
                        self.current_player_index = 0;
                    }
                    CueSlot::Primary
                };
                self.env.cue_mut(self.active_cue).force_align();
                let label = format!("{} Turn", self.player_label());
                self.ui.push(UiEvent::TurnLabel(label));
                self.env.rules_mut().prepare_for_next_turn();
                self.pump_score_events();
                self.change_state(GameFlowState::WaitingForPlayerShot);
            }
            GameFlowState::WaitingForPlayerShot => {
                self.env.start_rules_turn(self.active_cue);
                self.pump_score_events();
            }
            GameFlowState::AgentTurn => {
                self.env.set_turn_state(TurnState::Agent);
                self.env.align_cue_for_turn();
                self.active_cue = CueSlot::Secondary;
                let label = if self.mode() == GameMode::TwoPlayer {
                    format!("{} Turn", self.player_label())
                } else {
                    "AI Turn".to_string()
                };
                self.ui.push(UiEvent::TurnLabel(label));
                self.env.rules_mut().prepare_for_next_turn();
                self.pump_score_events();

                if self.agent_involved() {
                    self.scheduler
                        .schedule_unique(self.config.timings.agent_turn_delay, FlowTask::ProgressAgentTurn);
                    if self.env.table().are_balls_moving() {
                        log::debug!("Balls still moving, decision deferred");
                        self.agent.set_pending_turn_decision(true);
                    } else {
                        self.schedule_decision(self.config.timings.decision_delay);
                    }
                }
            }
            GameFlowState::AgentDeciding => {
                self.env.start_rules_turn(CueSlot::Secondary);
                self.pump_score_events();
                self.decision_wait = 0.0;
            }
        }
    }

    /// Keep a single decision request in flight
    fn schedule_decision(&mut self, delay: f32) {
        self.scheduler.schedule_unique(delay, FlowTask::RequestDecision);
    }

    /// Start a fresh match, optionally resetting the table first
    pub fn initialize_game_state(&mut self, request_reset: bool) {
        if request_reset {
            self.env.request_environment_reset();
        }
        self.current_player_index = 0;
        if self.mode() == GameMode::AiOnly {
            self.change_state(GameFlowState::AgentTurn);
        } else {
            self.change_state(GameFlowState::PlayerTurn);
        }
    }

    /// Run one scheduled task
    pub fn run_task(&mut self, task: FlowTask) {
        match task {
            FlowTask::ProgressAgentTurn => {
                if self.state == GameFlowState::AgentTurn {
                    self.change_state(GameFlowState::AgentDeciding);
                }
            }
            FlowTask::RequestDecision => self.request_decision(),
            FlowTask::BusyRetry => {
                if self.state == GameFlowState::AgentShooting {
                    log::info!("Retrying agent turn after busy cue");
                    self.change_state(GameFlowState::AgentTurn);
                }
            }
            FlowTask::ResettingRetry => {
                if self.state.is_agent_state() {
                    self.change_state(GameFlowState::AgentDeciding);
                    self.schedule_decision(0.0);
                }
            }
        }
    }

    fn request_decision(&mut self) {
        if !self.agent_involved() || self.win_prompt.is_some() {
            return;
        }
        if self.env.table().are_balls_moving() || self.env.any_cue_shooting() {
            log::debug!("Decision requested while the table is busy, deferring");
            self.agent.set_pending_turn_decision(true);
            return;
        }
        let controlled = self.env.agent_controlled_ball();
        let shot = self.agent.decide(self.env.table(), controlled);
        self.on_agent_action_received(shot);
    }

    /// Handle a decision from the agent. Returns false if it was ignored.
    pub fn on_agent_action_received(&mut self, shot: ShotParameters) -> bool {
        if self.state.is_player_state() {
            log::warn!("Agent action ignored during {}", self.state.as_str());
            return false;
        }

        self.agent.on_turn_started();
        self.change_state(GameFlowState::AgentShooting);

        let shot = match self.config.test_shot {
            Some(test) => {
                log::warn!("Test shot overrides agent action {shot:?}");
                ShotParameters::from(test)
            }
            None => shot,
        };
        self.ui.push(UiEvent::DecisionPreview(shot));

        let result = self.env.try_queue_shot(shot);
        self.pump_score_events();
        log::info!("Agent shot result: {}", result.as_str());
        match result {
            ShotResult::Success => {
                self.env.rules_mut().on_shot_executed();
                self.pump_score_events();
                self.change_state(GameFlowState::BallsMoving);
            }
            ShotResult::Blocked => {
                self.agent.on_blocked_shot();
                self.result("Blocked shot", false);
                self.change_state(GameFlowState::AgentDeciding);
            }
            ShotResult::Busy => {
                self.busy_wait = Some(BoundedWait::new(self.config.timings.busy_wait_timeout));
            }
            ShotResult::Resetting => {
                self.scheduler
                    .schedule(self.config.timings.resetting_retry, FlowTask::ResettingRetry);
            }
            ShotResult::Failed => {
                self.change_state(GameFlowState::AgentDeciding);
                self.schedule_decision(0.0);
            }
        }
        true
    }

    /// Human shot through the active cue
    pub fn player_shoot(&mut self, shot: ShotParameters) -> ShotResult {
        if self.state != GameFlowState::WaitingForPlayerShot {
            log::warn!("Player shot ignored during {}", self.state.as_str());
            return ShotResult::Failed;
        }
        let result = self.env.try_queue_shot_with(self.active_cue, shot);
        self.pump_score_events();
        if result == ShotResult::Success {
            self.on_player_shot();
        } else {
            log::warn!("Player shot rejected: {}", result.as_str());
        }
        result
    }

    /// The player's cue left the address pose
    pub fn on_player_shot(&mut self) {
        self.env.rules_mut().on_shot_executed();
        self.pump_score_events();
        self.change_state(GameFlowState::BallsMoving);
    }

    /// Forward rule notifications to the agent and the scoreboard
    fn pump_score_events(&mut self) {
        let events = self.env.rules_mut().drain_events();
        if self.agent_involved() {
            for event in &events {
                self.agent.observe_score_event(event);
            }
        }
        let scores = self.env.rules().scores();
        if scores != self.last_scores {
            self.last_scores = scores;
            self.ui.push(UiEvent::Scores(scores));
        }
    }

    // === Table events ===

    pub fn handle_table_events(&mut self, events: Vec<TableEvent>) {
        for event in events {
            match event {
                TableEvent::Contact { ball, other } => self.env.rules_mut().on_contact(ball, other),
                TableEvent::OutOfBounds(ball) => {
                    log::info!("{} ball out of bounds", ball.as_str());
                    self.env.rules_mut().register_out_of_bounds_foul();
                    self.pump_score_events();
                    self.on_out_of_bounds_foul();
                }
                TableEvent::AllBallsStopped { forced } => {
                    self.pump_score_events();
                    self.on_all_balls_stopped(forced);
                }
                TableEvent::ResetCompleted => self.on_reset_completed(),
            }
        }
        self.pump_score_events();
    }

    /// Settlement reported by the table
    pub fn on_all_balls_stopped(&mut self, forced: bool) {
        self.settle(forced, false);
    }

    fn settle(&mut self, forced: bool, bypass_state_check: bool) {
        if self.env.is_resetting() {
            log::debug!("Settlement during reset ignored");
            return;
        }
        if forced {
            log::warn!("Settlement was forced");
        }
        self.env.notify_cues_balls_stopped();
        if self.agent_involved() {
            self.finish_agent_turn();
        }

        if self.env.any_cue_shooting() {
            log::debug!("Cue still animating, holding settlement");
            self.settle_wait = Some(SettleWait {
                wait: BoundedWait::new(self.config.timings.settle_wait_timeout),
                bypass_state_check,
            });
        } else {
            self.handle_balls_stopped_internal(bypass_state_check);
        }
    }

    fn finish_agent_turn(&mut self) {
        let controlled = self.env.agent_controlled_ball();
        let ctx = TurnEndContext {
            training: self.config.game.training,
            controlled_position: self.env.table().position(controlled),
        };
        let report = self.agent.on_turn_ended(self.env.rules_mut(), ctx);
        self.pump_score_events();

        if report.resolution != TurnResolution::Inactive {
            log::debug!("Agent turn resolved as {:?}", report.resolution);
        }
        self.agent
            .episode_mut()
            .register_turn_completion(self.config.agent.max_turns_per_episode);
        if report.reset_requested {
            self.env.request_environment_reset();
        }
        if self.agent.take_pending_turn_decision() {
            self.schedule_decision(self.config.timings.pending_decision_delay);
        }
    }

    fn handle_balls_stopped_internal(&mut self, bypass_state_check: bool) {
        if self.state != GameFlowState::BallsMoving && !bypass_state_check {
            log::debug!("Settlement outside BallsMoving ({}) ignored", self.state.as_str());
            return;
        }

        if self.pending_foul_reset {
            self.env.rules_mut().finalize_turn_tracking();
            self.env.rules_mut().prepare_for_next_turn();
            self.pump_score_events();
            self.perform_pending_foul_reset();
            return;
        }
        if self.is_foul_reset {
            self.is_foul_reset = false;
            self.env.rules_mut().prepare_for_next_turn();
            return;
        }

        let outcome = self.env.rules_mut().evaluate_and_clear();
        // Training commits the agent's point before the flow sees the settlement
        let committed_by_agent = !outcome.evaluated
            && self.last_state_before_moving != GameFlowState::WaitingForPlayerShot
            && self.agent.reward().score_committed();
        if !outcome.evaluated && !committed_by_agent {
            log::warn!("Settlement without an active turn");
        }
        let score_made = outcome.score_made() || committed_by_agent;
        if outcome.has_foul {
            self.result("FOUL!", false);
        } else if score_made {
            self.result("Score!", true);
        } else {
            self.result("Turn passed", false);
        }

        if outcome.score_made() {
            let scorer = self.scorer_index();
            self.env.rules_mut().commit_score(scorer);
        }
        self.pump_score_events();

        if let Some(winner) = self.env.rules().is_game_won() {
            self.handle_win(winner);
            return;
        }

        let next = self.next_state_after_settlement(score_made);
        self.change_state(next);
    }

    fn scorer_index(&self) -> usize {
        match self.mode() {
            GameMode::TwoPlayer => self.current_player_index,
            GameMode::PlayerVsAi => {
                if self.last_state_before_moving == GameFlowState::WaitingForPlayerShot {
                    0
                } else {
                    1
                }
            }
            GameMode::AiOnly => 1,
            GameMode::SinglePlayer => 0,
        }
    }

    /// The scorer keeps the table; a miss passes the turn
    fn next_state_after_settlement(&mut self, score_made: bool) -> GameFlowState {
        match self.mode() {
            GameMode::TwoPlayer => {
                if !score_made {
                    self.current_player_index = (self.current_player_index + 1) % 2;
                }
                GameFlowState::PlayerTurn
            }
            GameMode::PlayerVsAi => {
                let player_shot = self.last_state_before_moving == GameFlowState::WaitingForPlayerShot;
                if player_shot == score_made {
                    GameFlowState::PlayerTurn
                } else {
                    GameFlowState::AgentTurn
                }
            }
            GameMode::SinglePlayer => GameFlowState::PlayerTurn,
            GameMode::AiOnly => GameFlowState::AgentTurn,
        }
    }

    /// A ball left the table; the reset waits for the settlement
    pub fn on_out_of_bounds_foul(&mut self) {
        if self.is_foul_reset || self.env.table().is_resetting() || self.pending_foul_reset {
            return;
        }
        let next = match self.mode() {
            GameMode::TwoPlayer => {
                self.current_player_index = (self.current_player_index + 1) % 2;
                GameFlowState::PlayerTurn
            }
            GameMode::PlayerVsAi => {
                let player_shot = self.last_state_before_moving == GameFlowState::WaitingForPlayerShot
                    || self.state == GameFlowState::WaitingForPlayerShot;
                if player_shot {
                    GameFlowState::AgentTurn
                } else {
                    GameFlowState::PlayerTurn
                }
            }
            GameMode::SinglePlayer => GameFlowState::PlayerTurn,
            GameMode::AiOnly => GameFlowState::AgentTurn,
        };
        log::info!("Out-of-bounds foul, {} after the balls settle", next.as_str());
        self.pending_foul_reset = true;
        self.pending_next_state = next;
        self.result("FOUL", false);
        self.env.watchdogs_mut().reset();
    }

    fn perform_pending_foul_reset(&mut self) {
        self.is_foul_reset = true;
        self.env.table_mut().reset_game();
        let next = self.pending_next_state;
        self.change_state(next);
        if next.is_agent_state() {
            self.schedule_decision(0.0);
        }
        self.pending_foul_reset = false;
        self.pending_next_state = GameFlowState::Idle;
    }

    fn on_reset_completed(&mut self) {
        if self.env.is_reset_requested() {
            self.env.complete_reset();
            let agent_context = self.mode() == GameMode::AiOnly || self.state.is_agent_state();
            if agent_context && self.agent_involved() {
                self.env.set_turn_state(TurnState::Agent);
                self.schedule_decision(0.0);
            }
        }
        self.handle_game_reset_event();
    }

    fn handle_game_reset_event(&mut self) {
        if self.is_foul_reset {
            self.is_foul_reset = false;
            return;
        }
        if self.env.rules().is_game_won().is_some() {
            self.env.rules_mut().reset_scores();
        }
        self.env.rules_mut().finalize_turn_tracking();
        self.env.rules_mut().prepare_for_next_turn();
        self.pump_score_events();

        if self.mode() == GameMode::AiOnly {
            self.change_state(GameFlowState::AgentTurn);
            self.scheduler
                .schedule_unique(self.config.timings.agent_turn_delay, FlowTask::ProgressAgentTurn);
        } else {
            self.initialize_game_state(false);
        }
    }

    fn handle_win(&mut self, winner: usize) {
        let label = if winner == 0 { "Player 1" } else { "Player 2 / AI" };
        log::info!("{label} wins {:?}", self.env.rules().scores());
        self.result(&format!("{label} WINS!"), true);
        if self.config.game.training {
            self.env.table_mut().reset_game();
        } else {
            self.win_prompt = Some(winner);
            self.ui.push(UiEvent::WinPrompt {
                winner,
                label: label.to_string(),
            });
        }
    }

    /// Close the win prompt and start the next match
    pub fn resume_after_win(&mut self) {
        if self.win_prompt.take().is_none() {
            return;
        }
        self.env.table_mut().reset_game();
    }

    /// User-requested reset
    pub fn request_reset(&mut self) {
        self.env.request_environment_reset();
    }

    pub fn set_game_mode(&mut self, mode: GameMode) {
        log::info!("Game mode {} -> {}", self.mode().as_str(), mode.as_str());
        self.config.game.game_mode = mode;
        self.env
            .rules_mut()
            .set_winning_score(self.config.game.effective_winning_score());
        self.env.rules_mut().reset_scores();
        self.env.rules_mut().finalize_turn_tracking();
        self.env.rules_mut().prepare_for_next_turn();
        self.pump_score_events();
        self.env.configure_cues(mode, self.config.game.ball_mode);

        self.scheduler.cancel_where(|_| true);
        self.busy_wait = None;
        self.settle_wait = None;
        self.pending_foul_reset = false;
        self.pending_next_state = GameFlowState::Idle;
        self.win_prompt = None;
        self.agent.set_pending_turn_decision(false);

        // Force the entry actions even if the state name is unchanged
        self.state = GameFlowState::Idle;
        self.initialize_game_state(true);
    }

    // === Per-tick updates ===

    pub(crate) fn update_waits(&mut self, dt: f32) {
        if let Some(mut wait) = self.busy_wait.take() {
            match wait.poll(self.env.any_cue_shooting(), dt) {
                WaitStatus::Waiting => self.busy_wait = Some(wait),
                status => {
                    if status == WaitStatus::TimedOut {
                        log::warn!("Cue still busy after {:.1}s, retrying anyway", wait.timeout);
                    }
                    self.scheduler
                        .schedule_unique(self.config.timings.busy_buffer, FlowTask::BusyRetry);
                }
            }
        }

        if let Some(mut settle) = self.settle_wait.take() {
            match settle.wait.poll(self.env.any_cue_shooting(), dt) {
                WaitStatus::Waiting => self.settle_wait = Some(settle),
                status => {
                    if status == WaitStatus::TimedOut {
                        log::warn!("Cue animation did not finish in {:.1}s, snapping back", settle.wait.timeout);
                        for slot in [CueSlot::Primary, CueSlot::Secondary] {
                            self.env.cue_mut(slot).force_align();
                        }
                    }
                    self.handle_balls_stopped_internal(settle.bypass_state_check);
                }
            }
        }
    }

    pub(crate) fn update_watchdogs(&mut self, dt: f32) {
        if self.state == GameFlowState::AgentDeciding {
            if let Some(kind) = self.env.monitor_environment_watchdogs(dt) {
                self.env
                    .force_environment_recovery(kind.reason(), self.agent.episode_mut());
            }
        } else {
            self.env.watchdogs_mut().reset();
        }

        for event in self.env.watchdogs_mut().drain_events() {
            self.ui.push(UiEvent::Watchdog(event));
        }
        for turn in self.env.drain_turn_changes() {
            self.ui.push(UiEvent::TurnChanged(turn));
        }
    }

    /// Balls at rest in BallsMoving without a settlement; force one
    pub(crate) fn update_forced_stop(&mut self, dt: f32) {
        // A cue frozen after its stroke is waiting for this very settlement
        let still = !self.env.table().are_balls_moving()
            && !self.env.any_cue_mid_strike()
            && !self.env.is_resetting();
        if self.state != GameFlowState::BallsMoving || !still || self.settle_wait.is_some() {
            self.still_timer = 0.0;
            return;
        }
        self.still_timer += dt;
        if self.still_timer >= self.config.timings.forced_stop_grace {
            log::warn!("Balls still for {:.2}s without a settlement, forcing one", self.still_timer);
            self.still_timer = 0.0;
            self.env.table_mut().settle_now();
            self.settle(true, true);
        }
    }

    /// Random shot when no decision arrived in time
    pub(crate) fn update_decision_fallback(&mut self, dt: f32) {
        let Some(timeout) = self.config.timings.decision_fallback_timeout else {
            return;
        };
        if self.state != GameFlowState::AgentDeciding {
            self.decision_wait = 0.0;
            return;
        }
        self.decision_wait += dt;
        if self.decision_wait < timeout {
            return;
        }
        self.decision_wait = 0.0;
        let ranges = &self.config.agent;
        let shot = ShotParameters::new(
            sample_range(&mut self.rng, ranges.angle_x.min, ranges.angle_x.max),
            sample_range(&mut self.rng, ranges.angle_y.min, ranges.angle_y.max),
            sample_range(&mut self.rng, ranges.power.min, ranges.power.max),
        );
        log::warn!("No decision after {timeout:.1}s, playing a random shot");
        self.on_agent_action_received(shot);
    }

    // === Episodes ===

    /// Archive an ended episode and start the next one
    pub(crate) fn restart_ended_episode(&mut self) {
        if let Some(summary) = self.agent.episode_mut().take_summary() {
            self.finished.push(summary);
            self.begin_episode();
        }
    }

    fn begin_episode(&mut self) {
        self.scheduler
            .cancel_where(|task| *task == FlowTask::RequestDecision);
        let randomize = self.config.game.randomize_enabled() && self.config.agent.randomization.enabled;
        match self.agent.episode_mut().begin_episode(randomize) {
            EpisodeStart::Randomize => {
                self.env.request_environment_reset();
                let layout = random_layout(&mut self.rng, &self.config.agent.randomization);
                for (role, position) in BallRole::ALL.into_iter().zip(layout) {
                    self.env.table_mut().set_initial_position(role, position);
                }
            }
            EpisodeStart::Continue => self.env.table_mut().stop_all_balls_without_reset(),
        }

        let agent_owns_table = self.config.game.training
            || self.state == GameFlowState::AgentDeciding
            || self.env.turn() == TurnState::Agent;
        if agent_owns_table {
            self.schedule_decision(self.config.timings.decision_delay);
        }
    }
}

fn sample_range(rng: &mut Pcg32, a: f32, b: f32) -> f32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo == hi { lo } else { rng.random_range(lo..=hi) }
}
