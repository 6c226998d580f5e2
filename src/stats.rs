//! Training progress across episodes
//!
//! Tracks a rolling success window and flags training complete once the
//! success rate has stayed above the threshold for several windows in a row.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::sim::episode::EpisodeSummary;

/// Episodes in the rolling success window
pub const EVALUATION_WINDOW: usize = 200;
/// Success rate a window must reach
pub const SUCCESS_THRESHOLD: f32 = 0.98;
/// No evaluation before this many episodes
pub const MIN_EPISODES: u64 = 2000;
/// Qualifying windows in a row that complete training
pub const CONSECUTIVE_SUCCESS_REQUIRED: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrainingStats {
    pub total_episodes: u64,
    pub successful_episodes: u64,
    /// Outcome of the most recent episodes, oldest first
    pub recent: VecDeque<bool>,
    pub consecutive_successes: u32,
    pub training_complete: bool,
}

impl TrainingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished episode. Returns true when this episode completed training.
    pub fn record_episode(&mut self, summary: &EpisodeSummary) -> bool {
        self.total_episodes += 1;
        if summary.scored {
            self.successful_episodes += 1;
        }
        self.recent.push_back(summary.scored);
        while self.recent.len() > EVALUATION_WINDOW {
            self.recent.pop_front();
        }

        if self.training_complete || self.total_episodes < MIN_EPISODES {
            return false;
        }
        // Evaluate once per full window
        if self.total_episodes % EVALUATION_WINDOW as u64 != 0 {
            return false;
        }

        let rate = self.window_success_rate();
        if rate >= SUCCESS_THRESHOLD {
            self.consecutive_successes += 1;
            log::info!(
                "Window success {:.1}% ({}/{} qualifying)",
                rate * 100.0,
                self.consecutive_successes,
                CONSECUTIVE_SUCCESS_REQUIRED
            );
        } else {
            self.consecutive_successes = 0;
        }

        if self.consecutive_successes >= CONSECUTIVE_SUCCESS_REQUIRED {
            self.training_complete = true;
            return true;
        }
        false
    }

    /// Lifetime success rate
    pub fn success_rate(&self) -> f32 {
        if self.total_episodes == 0 {
            return 0.0;
        }
        self.successful_episodes as f32 / self.total_episodes as f32
    }

    /// Success rate over the rolling window
    pub fn window_success_rate(&self) -> f32 {
        if self.recent.is_empty() {
            return 0.0;
        }
        self.recent.iter().filter(|s| **s).count() as f32 / self.recent.len() as f32
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
