//! Learning-agent episode bookkeeping
//!
//! An episode usually spans one turn: every resolved turn ends it. Separately,
//! completed turns are counted toward a layout limit; reaching it flags the
//! next episode to start from a freshly randomized layout.

use glam::{Vec2, Vec3};
use rand::Rng;
use rand_pcg::Pcg32;

use crate::config::RandomizationConfig;
use crate::consts::BALL_RADIUS;

/// Why an episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeEnd {
    /// Turn resolved by settlement
    TurnResolved,
    BlockedShot,
    /// Layout turn limit reached
    TurnLimit,
    /// Forced recovery after a stall
    Watchdog,
}

impl EpisodeEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeEnd::TurnResolved => "turn resolved",
            EpisodeEnd::BlockedShot => "blocked shot",
            EpisodeEnd::TurnLimit => "turn limit",
            EpisodeEnd::Watchdog => "watchdog",
        }
    }
}

/// Record of a finished episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    pub number: u64,
    pub cumulative_reward: f32,
    /// Turns counted toward the layout limit when it ended
    pub turns: u32,
    pub scored: bool,
    pub reason: EpisodeEnd,
}

/// What the caller has to do to start the next episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeStart {
    /// Request a table reset and place a random layout
    Randomize,
    /// Keep the layout, stop any residual motion
    Continue,
}

#[derive(Debug, Clone)]
pub struct EpisodeState {
    pub cumulative_reward: f32,
    /// Turns completed since the layout was last randomized
    pub turn_count: u32,
    /// Consecutive turns the controlled ball ended in a corner
    pub corner_turns: u32,
    pub randomize_next: bool,
    number: u64,
    scored: bool,
    ended: Option<EpisodeEnd>,
}

impl Default for EpisodeState {
    fn default() -> Self {
        Self::new()
    }
}

impl EpisodeState {
    pub fn new() -> Self {
        Self {
            cumulative_reward: 0.0,
            turn_count: 0,
            corner_turns: 0,
            // The very first episode always gets a fresh layout
            randomize_next: true,
            number: 0,
            scored: false,
            ended: None,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn is_ended(&self) -> bool {
        self.ended.is_some()
    }

    pub fn add_reward(&mut self, amount: f32) {
        if self.ended.is_some() {
            log::debug!("Reward {amount:+.2} after episode end, ignored");
            return;
        }
        self.cumulative_reward += amount;
        log::debug!("Reward {amount:+.2} (episode total {:+.2})", self.cumulative_reward);
    }

    /// Mark the episode scored (a point was committed during it)
    pub fn mark_scored(&mut self) {
        self.scored = true;
    }

    /// End the episode; the first reason wins if ended twice before a restart
    pub fn end_episode(&mut self, reason: EpisodeEnd) {
        match self.ended {
            Some(first) => log::debug!(
                "Episode {} already ended ({}), ignoring {}",
                self.number,
                first.as_str(),
                reason.as_str()
            ),
            None => {
                log::info!(
                    "Episode {} ended: {} (reward {:+.2})",
                    self.number,
                    reason.as_str(),
                    self.cumulative_reward
                );
                self.ended = Some(reason);
            }
        }
    }

    /// Count a settled turn. Returns true if the layout limit was hit.
    pub fn register_turn_completion(&mut self, max_turns: u32) -> bool {
        self.turn_count += 1;
        if self.turn_count >= max_turns.max(1) {
            log::info!("Turn limit {max_turns} reached, next episode gets a new layout");
            self.turn_count = 0;
            self.randomize_next = true;
            self.end_episode(EpisodeEnd::TurnLimit);
            return true;
        }
        false
    }

    /// Summary of the ended episode, if any
    pub fn take_summary(&mut self) -> Option<EpisodeSummary> {
        let reason = self.ended.take()?;
        Some(EpisodeSummary {
            number: self.number,
            cumulative_reward: self.cumulative_reward,
            turns: self.turn_count,
            scored: self.scored,
            reason,
        })
    }

    /// Start a new episode, consuming the randomize flag
    pub fn begin_episode(&mut self, randomize_enabled: bool) -> EpisodeStart {
        self.number += 1;
        self.cumulative_reward = 0.0;
        self.scored = false;
        self.ended = None;

        let randomize = std::mem::take(&mut self.randomize_next) && randomize_enabled;
        log::debug!("Episode {} begins (randomize: {randomize})", self.number);
        if randomize {
            EpisodeStart::Randomize
        } else {
            EpisodeStart::Continue
        }
    }
}

/// Random non-overlapping layout for (Main, Target, Secondary)
pub fn random_layout(rng: &mut Pcg32, config: &RandomizationConfig) -> [Vec3; 3] {
    let mut placed: Vec<Vec2> = Vec::with_capacity(3);
    for slot in 0..3 {
        let spot = sample_free_spot(rng, config, &placed).unwrap_or_else(|| {
            log::warn!(
                "No free spot for ball {slot} after {} attempts, placing anyway",
                config.max_attempts
            );
            sample_spot(rng, config)
        });
        placed.push(spot);
    }
    [0, 1, 2].map(|i| Vec3::new(placed[i].x, BALL_RADIUS, placed[i].y))
}

fn sample_free_spot(rng: &mut Pcg32, config: &RandomizationConfig, placed: &[Vec2]) -> Option<Vec2> {
    (0..config.max_attempts.max(1)).find_map(|_| {
        let spot = sample_spot(rng, config);
        placed
            .iter()
            .all(|p| p.distance(spot) >= config.min_distance)
            .then_some(spot)
    })
}

fn sample_spot(rng: &mut Pcg32, config: &RandomizationConfig) -> Vec2 {
    Vec2::new(sample(rng, config.area_x.min, config.area_x.max), sample(rng, config.area_z.min, config.area_z.max))
}

fn sample(rng: &mut Pcg32, a: f32, b: f32) -> f32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo == hi { lo } else { rng.random_range(lo..hi) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Range;
    use rand::SeedableRng;

    #[test]
    fn test_first_episode_randomizes() {
        let mut episode = EpisodeState::new();
        assert_eq!(episode.begin_episode(true), EpisodeStart::Randomize);
        assert_eq!(episode.begin_episode(true), EpisodeStart::Continue);
    }

    #[test]
    fn test_randomize_flag_consumed_when_disabled() {
        let mut episode = EpisodeState::new();
        assert_eq!(episode.begin_episode(false), EpisodeStart::Continue);
        assert!(!episode.randomize_next);
    }

    #[test]
    fn test_turn_limit_ends_episode() {
        let mut episode = EpisodeState::new();
        episode.begin_episode(true);
        for _ in 0..2 {
            assert!(!episode.register_turn_completion(3));
        }
        assert!(episode.register_turn_completion(3));
        assert_eq!(episode.turn_count, 0);
        assert!(episode.randomize_next);
        let summary = episode.take_summary().unwrap();
        assert_eq!(summary.reason, EpisodeEnd::TurnLimit);
        assert_eq!(episode.begin_episode(true), EpisodeStart::Randomize);
    }

    #[test]
    fn test_reward_accumulates_and_resets() {
        let mut episode = EpisodeState::new();
        episode.begin_episode(false);
        episode.add_reward(3.0);
        episode.add_reward(-0.5);
        assert_eq!(episode.cumulative_reward, 2.5);
        episode.end_episode(EpisodeEnd::TurnResolved);
        episode.add_reward(100.0);
        episode.end_episode(EpisodeEnd::Watchdog);
        let summary = episode.take_summary().unwrap();
        assert_eq!(summary.cumulative_reward, 2.5);
        assert_eq!(summary.reason, EpisodeEnd::TurnResolved);
        assert!(episode.take_summary().is_none());

        episode.begin_episode(false);
        assert_eq!(episode.cumulative_reward, 0.0);
    }

    #[test]
    fn test_random_layout_respects_spacing() {
        let mut rng = Pcg32::seed_from_u64(7);
        let config = RandomizationConfig::default();
        for _ in 0..50 {
            let layout = random_layout(&mut rng, &config);
            for (i, a) in layout.iter().enumerate() {
                assert!(config.area_x.contains(a.x));
                assert!(config.area_z.contains(a.z));
                assert_eq!(a.y, BALL_RADIUS);
                for b in &layout[i + 1..] {
                    let gap = Vec2::new(a.x - b.x, a.z - b.z).length();
                    assert!(gap >= config.min_distance);
                }
            }
        }
    }

    #[test]
    fn test_impossible_spacing_still_places() {
        let mut rng = Pcg32::seed_from_u64(1);
        let config = RandomizationConfig {
            area_x: Range::new(0.0, 0.01),
            area_z: Range::new(0.0, 0.01),
            min_distance: 1.0,
            max_attempts: 5,
            ..Default::default()
        };
        let layout = random_layout(&mut rng, &config);
        assert!(layout.iter().all(|p| p.x <= 0.01 && p.z <= 0.01));
    }
}
