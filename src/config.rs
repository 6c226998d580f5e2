//! Game settings, agent configuration and timing constants
//!
//! Loaded once at startup from JSON. Missing or malformed files fall back to
//! defaults with a warning so a session can always start.

use std::path::Path;

use clap::ValueEnum;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading or writing a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Who is at the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
pub enum GameMode {
    /// One human practising alone
    #[value(alias = "single")]
    SinglePlayer,
    /// Two humans alternating on the same table
    #[value(alias = "two")]
    TwoPlayer,
    /// Human against the learning agent
    #[default]
    #[value(alias = "pva")]
    PlayerVsAi,
    /// The agent plays both sides (training and demos)
    #[value(alias = "ai")]
    AiOnly,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::SinglePlayer => "SinglePlayer",
            GameMode::TwoPlayer => "TwoPlayer",
            GameMode::PlayerVsAi => "PlayerVsAi",
            GameMode::AiOnly => "AiOnly",
        }
    }

    /// Whether the learning agent takes turns in this mode
    pub fn agent_involved(&self) -> bool {
        matches!(self, GameMode::PlayerVsAi | GameMode::AiOnly)
    }

    /// Whether a human takes turns in this mode
    pub fn player_involved(&self) -> bool {
        !matches!(self, GameMode::AiOnly)
    }
}

/// Which ball each cue strikes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BallMode {
    /// Both cues play the main ball
    #[default]
    SameBall,
    /// The second cue plays its own ball
    DifferentBalls,
}

/// How the policy behind the agent produces actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BehaviorMode {
    /// Actions come from a policy that is being trained
    Training,
    /// Actions come from a frozen policy
    #[default]
    Inference,
    /// Actions are recorded demonstrations
    Heuristic,
}

impl BehaviorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorMode::Training => "Training",
            BehaviorMode::Inference => "Inference",
            BehaviorMode::Heuristic => "Heuristic",
        }
    }
}

/// Closed interval used for action channels and spawn areas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f32,
    pub max: f32,
}

impl Range {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min.min(self.max) && value <= self.max.max(self.min)
    }

    pub fn width(&self) -> f32 {
        self.max - self.min
    }
}

/// Mode and session switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub game_mode: GameMode,
    pub ball_mode: BallMode,
    /// Training sessions run faster and never pause on a win
    pub training: bool,
    /// Randomize the layout at episode boundaries outside training too
    pub randomize_ball_positions: bool,
    /// Points needed to win a match
    pub winning_score: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            game_mode: GameMode::PlayerVsAi,
            ball_mode: BallMode::SameBall,
            training: false,
            randomize_ball_positions: false,
            winning_score: 10,
        }
    }
}

impl GameSettings {
    /// Effective randomization switch
    pub fn randomize_enabled(&self) -> bool {
        self.training || self.randomize_ball_positions
    }

    pub fn effective_winning_score(&self) -> u32 {
        self.winning_score.max(1)
    }

    pub fn behavior_mode(&self) -> BehaviorMode {
        if self.training {
            BehaviorMode::Training
        } else {
            BehaviorMode::Inference
        }
    }
}

/// Reward magnitudes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Per new cushion contact (first three per turn only)
    pub wall_hit: f32,
    pub first_ball: f32,
    pub second_ball: f32,
    pub successful_score: f32,
    pub out_of_bounds: f32,
    pub unsuccessful_shot: f32,
    pub no_contact: f32,
    pub blocked_shot: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            wall_hit: 0.0,
            first_ball: 3.0,
            second_ball: 10.0,
            successful_score: 25.0,
            out_of_bounds: -1.0,
            unsuccessful_shot: -0.1,
            no_contact: -0.5,
            blocked_shot: -2.0,
        }
    }
}

/// Corner-camping penalty
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerConfig {
    pub enabled: bool,
    pub stay_penalty: f32,
    pub max_consecutive_turns: u32,
    /// Radius around a corner that counts as camping
    pub threshold: f32,
}

impl Default for CornerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stay_penalty: -1.0,
            max_consecutive_turns: 3,
            threshold: 0.5,
        }
    }
}

/// Watchdog timeouts (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub play_timeout: f32,
    pub training_timeout: f32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            play_timeout: 5.0,
            training_timeout: 10.0,
        }
    }
}

impl WatchdogConfig {
    /// Idle timeout and cue-stuck timeout for a session
    pub fn timeouts(&self, training: bool) -> (f32, f32) {
        let idle = if training {
            self.training_timeout
        } else {
            self.play_timeout
        };
        let idle = if idle > 0.0 {
            idle
        } else {
            log::warn!("Watchdog timeout {idle} is not positive, using defaults");
            if training { 10.0 } else { 5.0 }
        };
        (idle, idle * 0.5)
    }
}

/// Spawn area for randomized layouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomizationConfig {
    pub enabled: bool,
    pub area_x: Range,
    pub area_z: Range,
    /// Minimum distance between ball centers in the table plane
    pub min_distance: f32,
    pub max_attempts: u32,
}

impl Default for RandomizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            area_x: Range::new(-1.8, 1.8),
            area_z: Range::new(-3.9, 3.9),
            min_distance: 0.3,
            max_attempts: 50,
        }
    }
}

/// Everything the learning agent needs to know about its environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    // === Action ranges ===
    pub angle_x: Range,
    pub angle_y: Range,
    pub power: Range,

    // === Table ===
    /// Half sizes of the playing surface (x, z)
    pub table_extents: Vec2,
    /// Table center relative to the environment origin
    pub table_center_offset: Vec3,

    // === Shaping ===
    pub rewards: RewardConfig,
    pub corner: CornerConfig,
    pub watchdog: WatchdogConfig,
    pub max_turns_per_episode: u32,
    pub randomization: RandomizationConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            angle_x: Range::new(-180.0, 180.0),
            angle_y: Range::new(0.0, 45.0),
            power: Range::new(6.0, 10.0),

            table_extents: Vec2::new(2.25, 4.45),
            table_center_offset: Vec3::ZERO,

            rewards: RewardConfig::default(),
            corner: CornerConfig::default(),
            watchdog: WatchdogConfig::default(),
            max_turns_per_episode: 50,
            randomization: RandomizationConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Defaults used when no agent configuration was supplied at all
    pub fn fallback() -> Self {
        Self {
            angle_y: Range::new(0.0, 60.0),
            power: Range::new(0.0, 10.0),
            rewards: RewardConfig {
                blocked_shot: -0.1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Repair values that would break normalization, returning the warnings
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.table_extents.x <= 0.0 || self.table_extents.y <= 0.0 {
            warnings.push(format!(
                "table extents {:?} must be positive",
                self.table_extents
            ));
            self.table_extents = AgentConfig::default().table_extents;
        }
        if self.max_turns_per_episode == 0 {
            warnings.push("max_turns_per_episode must be at least 1".to_string());
            self.max_turns_per_episode = 1;
        }
        if self.corner.threshold < 0.0 {
            warnings.push("corner threshold must not be negative".to_string());
            self.corner.threshold = 0.0;
        }
        for warning in &warnings {
            log::warn!("Agent config: {warning}");
        }
        warnings
    }
}

/// Per-ball motion thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub linear_threshold: f32,
    pub angular_threshold: f32,
    /// Seconds below threshold before a ball counts as settled
    pub settle_confirmation: f32,
    /// Velocities below these are zeroed outright while a ball is moving
    pub hard_stop_linear: f32,
    pub hard_stop_angular: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            linear_threshold: 0.005,
            angular_threshold: 0.05,
            settle_confirmation: 0.15,
            hard_stop_linear: 0.01,
            hard_stop_angular: 0.1,
        }
    }
}

/// Table-level settlement timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Table debounce before "all balls stopped" fires
    pub confirmation_delay: f32,
    /// Ceiling after which settlement is forced
    pub max_wait: f32,
    /// Detection is suppressed this long after a table reset
    pub reset_grace: f32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            confirmation_delay: 0.2,
            max_wait: 15.0,
            reset_grace: 1.0,
        }
    }
}

impl SettlementConfig {
    pub fn effective_confirmation(&self) -> f32 {
        self.confirmation_delay.max(0.05)
    }
}

/// Delays and bounded waits of the turn flow (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowTimings {
    /// AgentTurn to AgentDeciding
    pub agent_turn_delay: f32,
    pub decision_delay: f32,
    /// Delay for a decision deferred until the table settled
    pub pending_decision_delay: f32,
    pub resetting_retry: f32,
    pub busy_wait_timeout: f32,
    pub busy_buffer: f32,
    /// Stillness in BallsMoving that forces a settlement
    pub forced_stop_grace: f32,
    /// Longest wait for a cue to finish before handling a settlement
    pub settle_wait_timeout: f32,
    /// Random fallback shot when no decision arrives in time
    pub decision_fallback_timeout: Option<f32>,
}

impl Default for FlowTimings {
    fn default() -> Self {
        Self {
            agent_turn_delay: 0.1,
            decision_delay: 0.2,
            pending_decision_delay: 0.1,
            resetting_retry: 0.2,
            busy_wait_timeout: 2.0,
            busy_buffer: 0.1,
            forced_stop_grace: 0.3,
            settle_wait_timeout: 2.0,
            decision_fallback_timeout: None,
        }
    }
}

/// Cue stick geometry and stroke timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CueConfig {
    pub force_multiplier: f32,
    pub max_power: f32,
    pub min_pullback: f32,
    pub max_pullback: f32,
    /// Stroke speed toward the ball (units per second)
    pub cue_speed: f32,
    /// Gap between tip and ball at address
    pub min_distance_from_ball: f32,
    pub ray_length: f32,
    pub stick_radius: f32,
    /// Resting pitch when no shot is aimed (degrees)
    pub default_vertical_angle: f32,

    // === Stroke phases ===
    pub pullback_time: f32,
    pub hold_time: f32,
    pub contact_pause: f32,
    pub follow_through_time: f32,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            force_multiplier: 0.4,
            max_power: 100.0,
            min_pullback: 0.2,
            max_pullback: 1.5,
            cue_speed: 15.0,
            min_distance_from_ball: 0.125,
            ray_length: 5.0,
            stick_radius: 0.04,
            default_vertical_angle: 60.0,

            pullback_time: 0.3,
            hold_time: 0.1,
            contact_pause: 0.05,
            follow_through_time: 0.3,
        }
    }
}

/// Fixed shot that replaces agent actions while debugging
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestShot {
    pub angle_x: f32,
    pub angle_y: f32,
    pub power: f32,
}

/// Complete session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub game: GameSettings,
    pub agent: AgentConfig,
    pub motion: MotionConfig,
    pub settlement: SettlementConfig,
    pub timings: FlowTimings,
    pub cue: CueConfig,
    pub test_shot: Option<TestShot>,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let has_agent = value.get("agent").is_some();
        let mut config: Config = serde_json::from_value(value)?;
        if !has_agent {
            log::warn!("No agent configuration supplied, using fallback ranges");
            config.agent = AgentConfig::fallback();
        }
        config.agent.validate();
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json()?)?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Load a config file, falling back to defaults on any error
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Could not load {} ({err}), using defaults", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_mode_values() {
        let parse = |s: &str| <GameMode as ValueEnum>::from_str(s, true).ok();
        assert_eq!(parse("ai-only"), Some(GameMode::AiOnly));
        assert_eq!(parse("Player-Vs-Ai"), Some(GameMode::PlayerVsAi));
        assert_eq!(parse("two-player"), Some(GameMode::TwoPlayer));
        assert_eq!(parse("single"), Some(GameMode::SinglePlayer));
        assert_eq!(parse("pva"), Some(GameMode::PlayerVsAi));
        assert_eq!(parse("snooker"), None);

        let names: Vec<_> = GameMode::value_variants()
            .iter()
            .filter_map(|mode| mode.to_possible_value())
            .map(|value| value.get_name().to_string())
            .collect();
        assert_eq!(names, ["single-player", "two-player", "player-vs-ai", "ai-only"]);
    }

    #[test]
    fn test_randomize_follows_training() {
        let settings = GameSettings {
            training: true,
            ..Default::default()
        };
        assert!(settings.randomize_enabled());
        assert!(!GameSettings::default().randomize_enabled());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "game": { "game_mode": "AiOnly" }, "agent": { "max_turns_per_episode": 20 } }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(config.game.game_mode, GameMode::AiOnly);
        assert_eq!(config.game.winning_score, 10);
        assert_eq!(config.agent.max_turns_per_episode, 20);
        assert_eq!(config.agent.power, Range::new(6.0, 10.0));
        assert_eq!(config.timings.decision_fallback_timeout, None);
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = Config::default();
        config.agent.rewards.successful_score = 40.0;
        config.test_shot = Some(TestShot {
            angle_x: 10.0,
            angle_y: 5.0,
            power: 8.0,
        });
        let restored = Config::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored.agent.rewards.successful_score, 40.0);
        assert_eq!(restored.test_shot, config.test_shot);
    }

    #[test]
    fn test_invalid_extents_are_repaired() {
        let mut agent = AgentConfig {
            table_extents: Vec2::new(0.0, 4.0),
            ..Default::default()
        };
        let warnings = agent.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(agent.table_extents, Vec2::new(2.25, 4.45));
    }

    #[test]
    fn test_missing_agent_section_uses_fallback() {
        let config = Config::from_json(r#"{ "game": { "winning_score": 3 } }"#).unwrap();
        assert_eq!(config.game.winning_score, 3);
        let agent = config.agent;
        assert_eq!(agent.angle_y, Range::new(0.0, 60.0));
        assert_eq!(agent.power, Range::new(0.0, 10.0));
        assert_eq!(agent.rewards.blocked_shot, -0.1);
        assert_eq!(agent.rewards.successful_score, 25.0);
    }

    #[test]
    fn test_watchdog_timeouts() {
        let wd = WatchdogConfig::default();
        assert_eq!(wd.timeouts(true), (10.0, 5.0));
        assert_eq!(wd.timeouts(false), (5.0, 2.5));

        let broken = WatchdogConfig {
            play_timeout: 0.0,
            ..Default::default()
        };
        assert_eq!(broken.timeouts(false), (5.0, 2.5));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Config::load_or_default(Path::new("/nonexistent/three-cushion.json"));
        assert_eq!(config.game.game_mode, GameMode::PlayerVsAi);
    }

    #[test]
    fn test_confirmation_floor() {
        let settlement = SettlementConfig {
            confirmation_delay: 0.0,
            ..Default::default()
        };
        assert_eq!(settlement.effective_confirmation(), 0.05);
    }
}
