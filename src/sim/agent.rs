//! Learning agent: policy seam plus the per-agent bookkeeping
//!
//! The agent turns table observations into shots through a [`Policy`] and
//! owns the reward shaper and episode state. Scheduling decisions is the
//! turn flow's job; the agent only remembers a decision deferred until the
//! table settles.

use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::action::{ACTION_CHANNELS, ActionMapper, ShotParameters};
use super::episode::EpisodeState;
use super::observation::ObservationCollector;
use super::reward::{RewardShaper, TurnEndContext, TurnEndReport};
use super::rules::{ScoreEvent, ShotRuleEngine};
use super::table::{BallRole, Physics, Table};
use crate::config::{AgentConfig, BehaviorMode};

/// Decision source behind the agent
pub trait Policy {
    /// Raw action vector for an observation. Values are nominally in [-1, 1].
    fn decide(&mut self, observation: &[f32]) -> Vec<f32>;

    fn behavior(&self) -> BehaviorMode {
        BehaviorMode::Inference
    }
}

/// Replays a fixed list of actions, cycling
#[derive(Debug, Clone, Default)]
pub struct ScriptedPolicy {
    actions: Vec<Vec<f32>>,
    next: usize,
}

impl ScriptedPolicy {
    pub fn new(actions: Vec<Vec<f32>>) -> Self {
        Self { actions, next: 0 }
    }

    /// Number of decisions served so far
    pub fn served(&self) -> usize {
        self.next
    }
}

impl Policy for ScriptedPolicy {
    fn decide(&mut self, _observation: &[f32]) -> Vec<f32> {
        if self.actions.is_empty() {
            return Vec::new();
        }
        let action = self.actions[self.next % self.actions.len()].clone();
        self.next += 1;
        action
    }
}

/// Uniform random actions from a seeded generator
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    rng: Pcg32,
    behavior: BehaviorMode,
}

impl RandomPolicy {
    pub fn new(seed: u64, behavior: BehaviorMode) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
            behavior,
        }
    }
}

impl Policy for RandomPolicy {
    fn decide(&mut self, _observation: &[f32]) -> Vec<f32> {
        (0..ACTION_CHANNELS)
            .map(|_| self.rng.random_range(-1.0..=1.0))
            .collect()
    }

    fn behavior(&self) -> BehaviorMode {
        self.behavior
    }
}

/// Plays back recorded shots as if a policy had produced them
#[derive(Debug, Clone)]
pub struct DemonstrationPolicy {
    mapper: ActionMapper,
    shots: Vec<ShotParameters>,
    next: usize,
}

impl DemonstrationPolicy {
    pub fn new(mapper: ActionMapper, shots: Vec<ShotParameters>) -> Self {
        Self {
            mapper,
            shots,
            next: 0,
        }
    }
}

impl Policy for DemonstrationPolicy {
    fn decide(&mut self, _observation: &[f32]) -> Vec<f32> {
        let Some(shot) = self.shots.get(self.next % self.shots.len().max(1)) else {
            log::error!("No demonstration shots recorded, policy disabled");
            return Vec::new();
        };
        self.next += 1;
        self.mapper.to_action(shot).to_vec()
    }

    fn behavior(&self) -> BehaviorMode {
        BehaviorMode::Heuristic
    }
}

pub struct BilliardAgent<Q: Policy> {
    policy: Q,
    mapper: ActionMapper,
    observer: ObservationCollector,
    reward: RewardShaper,
    episode: EpisodeState,
    /// Decision deferred until the balls stop
    pending_turn_decision: bool,
    decisions: u64,
}

impl<Q: Policy> BilliardAgent<Q> {
    pub fn new(policy: Q, config: &AgentConfig) -> Self {
        log::info!("Agent behavior: {}", policy.behavior().as_str());
        Self {
            policy,
            mapper: ActionMapper::from_config(config),
            observer: ObservationCollector::new(config.table_extents, config.table_center_offset),
            reward: RewardShaper::new(config),
            episode: EpisodeState::new(),
            pending_turn_decision: false,
            decisions: 0,
        }
    }

    pub fn policy(&self) -> &Q {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut Q {
        &mut self.policy
    }

    pub fn behavior(&self) -> BehaviorMode {
        self.policy.behavior()
    }

    pub fn mapper(&self) -> &ActionMapper {
        &self.mapper
    }

    pub fn observer(&self) -> &ObservationCollector {
        &self.observer
    }

    pub fn reward(&self) -> &RewardShaper {
        &self.reward
    }

    pub fn episode(&self) -> &EpisodeState {
        &self.episode
    }

    pub fn episode_mut(&mut self) -> &mut EpisodeState {
        &mut self.episode
    }

    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    pub fn is_decision_pending(&self) -> bool {
        self.pending_turn_decision
    }

    pub fn set_pending_turn_decision(&mut self, pending: bool) {
        self.pending_turn_decision = pending;
    }

    pub fn take_pending_turn_decision(&mut self) -> bool {
        std::mem::take(&mut self.pending_turn_decision)
    }

    /// Observe the table, query the policy and map the action to a shot
    pub fn decide<P: Physics>(&mut self, table: &Table<P>, controlled: BallRole) -> ShotParameters {
        let observation = self.observer.collect(Some(table), controlled);
        let action = self.policy.decide(&observation);
        let shot = self.mapper.extract(&action);
        self.decisions += 1;
        log::info!(
            "[Decision {}] {} || action -> angle_x {:.2}, angle_y {:.2}, power {:.2}",
            self.decisions,
            self.observer.last_snapshot(),
            shot.angle_x,
            shot.angle_y,
            shot.power
        );
        shot
    }

    // === Reward hooks ===

    /// The flow accepted an action; start tracking the turn's rewards
    pub fn on_turn_started(&mut self) {
        self.reward.on_turn_started();
    }

    pub fn on_blocked_shot(&mut self) {
        self.reward.on_blocked_shot(&mut self.episode);
    }

    /// Forward one rule notification to the reward shaper
    pub fn observe_score_event(&mut self, event: &ScoreEvent) {
        match *event {
            ScoreEvent::Updated { cushions, balls, .. } => {
                self.reward.on_score_update(cushions, balls, &mut self.episode)
            }
            ScoreEvent::Committed { .. } => self.reward.on_score_committed(&mut self.episode),
            ScoreEvent::OutOfBoundsRegistered => {
                self.reward.on_out_of_bounds_registered(&mut self.episode)
            }
        }
    }

    pub fn on_turn_ended(&mut self, rules: &mut ShotRuleEngine, ctx: TurnEndContext) -> TurnEndReport {
        self.reward.on_turn_ended(rules, ctx, &mut self.episode)
    }
}
