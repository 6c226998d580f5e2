//! Reward shaping for the learning agent
//!
//! Turns rule-engine notifications into scalar rewards and decides when an
//! episode ends. Intermediate contacts earn shaped rewards once each; the
//! turn's terminal branch is picked at settlement.

use glam::{Vec2, Vec3};

use super::episode::{EpisodeEnd, EpisodeState};
use super::rules::ShotRuleEngine;
use crate::config::{AgentConfig, CornerConfig, RewardConfig};

/// Cushion hits per turn that still earn the cushion reward
pub const REWARDED_CUSHIONS: u32 = 3;

/// Which terminal branch a turn took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnResolution {
    /// No turn was being tracked
    Inactive,
    /// Point already committed earlier in the turn
    AlreadyScored,
    Scored,
    OutOfBounds,
    Foul,
    NoContact,
    Missed,
}

/// Inputs to the end-of-turn evaluation
#[derive(Debug, Clone, Copy)]
pub struct TurnEndContext {
    pub training: bool,
    /// Controlled ball position in environment coordinates
    pub controlled_position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnEndReport {
    pub resolution: TurnResolution,
    /// Corner camping hit its limit; the environment must be reset
    pub reset_requested: bool,
}

#[derive(Debug, Clone)]
pub struct RewardShaper {
    rewards: RewardConfig,
    corner: CornerConfig,
    table_extents: Vec2,
    table_center_offset: Vec3,

    last_cushions: u32,
    last_balls: usize,
    turn_active: bool,
    score_committed: bool,
    out_of_bounds_applied: bool,
}

impl RewardShaper {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            rewards: config.rewards.clone(),
            corner: config.corner.clone(),
            table_extents: config.table_extents,
            table_center_offset: config.table_center_offset,
            last_cushions: 0,
            last_balls: 0,
            turn_active: false,
            score_committed: false,
            out_of_bounds_applied: false,
        }
    }

    pub fn is_turn_active(&self) -> bool {
        self.turn_active
    }

    pub fn score_committed(&self) -> bool {
        self.score_committed
    }

    pub fn on_turn_started(&mut self) {
        self.last_cushions = 0;
        self.last_balls = 0;
        self.turn_active = true;
        self.score_committed = false;
        self.out_of_bounds_applied = false;
    }

    /// Invalid angle: penalize and end the episode without touching the layout
    pub fn on_blocked_shot(&mut self, episode: &mut EpisodeState) {
        log::info!("Blocked shot, penalty {:+.2}", self.rewards.blocked_shot);
        episode.add_reward(self.rewards.blocked_shot);
        episode.end_episode(EpisodeEnd::BlockedShot);
        self.turn_active = false;
    }

    /// Immediate out-of-bounds penalty; the episode ends at settlement
    pub fn on_out_of_bounds_registered(&mut self, episode: &mut EpisodeState) {
        if !self.turn_active || self.out_of_bounds_applied {
            return;
        }
        episode.add_reward(self.rewards.out_of_bounds);
        self.out_of_bounds_applied = true;
    }

    /// Shaped rewards for contacts not yet rewarded this turn
    pub fn on_score_update(&mut self, cushions: u32, balls: usize, episode: &mut EpisodeState) {
        if !self.turn_active {
            return;
        }

        let new_rewarded = cushions.min(REWARDED_CUSHIONS);
        let old_rewarded = self.last_cushions.min(REWARDED_CUSHIONS);
        if new_rewarded > old_rewarded {
            episode.add_reward(self.rewards.wall_hit * (new_rewarded - old_rewarded) as f32);
        }

        for nth in self.last_balls + 1..=balls {
            match nth {
                1 => episode.add_reward(self.rewards.first_ball),
                2 => episode.add_reward(self.rewards.second_ball),
                _ => {}
            }
        }

        self.last_cushions = cushions;
        self.last_balls = balls;
    }

    /// A point was committed while the turn is live
    pub fn on_score_committed(&mut self, episode: &mut EpisodeState) {
        if !self.turn_active {
            return;
        }
        self.score_committed = true;
        episode.mark_scored();
        episode.add_reward(self.rewards.successful_score);
    }

    /// Terminal evaluation at settlement. Exactly one branch applies.
    pub fn on_turn_ended(
        &mut self,
        rules: &mut ShotRuleEngine,
        ctx: TurnEndContext,
        episode: &mut EpisodeState,
    ) -> TurnEndReport {
        if !self.turn_active {
            return TurnEndReport {
                resolution: TurnResolution::Inactive,
                reset_requested: false,
            };
        }

        if self.score_committed {
            self.turn_active = false;
            if let Some(winner) = rules.is_game_won() {
                log::info!("Match won by player {}", winner + 1);
            }
            let reset_requested = self.check_corner_camping(ctx, episode);
            episode.end_episode(EpisodeEnd::TurnResolved);
            return TurnEndReport {
                resolution: TurnResolution::AlreadyScored,
                reset_requested,
            };
        }

        if rules.is_turn_active() && !rules.has_foul() && rules.check_score_condition() {
            let reset_requested = self.check_corner_camping(ctx, episode);
            self.handle_successful_turn(rules, ctx, episode);
            self.turn_active = false;
            self.out_of_bounds_applied = false;
            episode.end_episode(EpisodeEnd::TurnResolved);
            return TurnEndReport {
                resolution: TurnResolution::Scored,
                reset_requested,
            };
        }

        let resolution = if rules.has_out_of_bounds_foul() {
            if !self.out_of_bounds_applied {
                episode.add_reward(self.rewards.out_of_bounds);
            }
            TurnResolution::OutOfBounds
        } else if rules.has_other_foul() {
            episode.add_reward(self.rewards.unsuccessful_shot);
            TurnResolution::Foul
        } else if self.last_cushions == 0 && self.last_balls == 0 {
            episode.add_reward(self.rewards.no_contact);
            TurnResolution::NoContact
        } else {
            episode.add_reward(self.rewards.unsuccessful_shot);
            TurnResolution::Missed
        };

        let reset_requested = self.check_corner_camping(ctx, episode);
        self.turn_active = false;
        self.out_of_bounds_applied = false;
        episode.end_episode(EpisodeEnd::TurnResolved);
        TurnEndReport {
            resolution,
            reset_requested,
        }
    }

    fn handle_successful_turn(
        &mut self,
        rules: &mut ShotRuleEngine,
        ctx: TurnEndContext,
        episode: &mut EpisodeState,
    ) {
        if ctx.training {
            // Direct commit: the shaper is still live, so the point's reward lands here
            rules.commit_score(1);
            self.on_score_committed(episode);
        } else {
            self.score_committed = true;
            episode.mark_scored();
            episode.add_reward(self.rewards.successful_score);
        }
    }

    /// Once per completed turn. Returns true when camping forces a reset.
    pub fn check_corner_camping(&mut self, ctx: TurnEndContext, episode: &mut EpisodeState) -> bool {
        if !self.corner.enabled {
            return false;
        }
        if !ctx.training {
            episode.corner_turns = 0;
            return false;
        }

        let local = ctx.controlled_position - self.table_center_offset;
        let folded = Vec2::new(local.x.abs(), local.z.abs());
        if folded.distance(self.table_extents) < self.corner.threshold {
            episode.corner_turns += 1;
            episode.add_reward(self.corner.stay_penalty);
            log::debug!("Controlled ball camping in a corner ({} turns)", episode.corner_turns);
            if episode.corner_turns >= self.corner.max_consecutive_turns {
                log::warn!("Corner camping limit reached, requesting environment reset");
                episode.corner_turns = 0;
                return true;
            }
        } else {
            episode.corner_turns = 0;
        }
        false
    }
}
