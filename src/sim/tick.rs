//! Fixed timestep simulation tick
//!
//! One call advances the whole session by `dt`: inputs, deferred flow tasks,
//! cue strokes, the table, then the watchdogs and the recovery paths.

use super::action::ShotParameters;
use super::agent::Policy;
use super::flow::TurnFlowController;
use super::table::Physics;
use crate::config::GameMode;
use crate::stats::TrainingStats;

/// Input commands for a single tick (deterministic)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Human shot, only honored while a shot is awaited
    pub player_shot: Option<ShotParameters>,
    /// Dismiss the win prompt and start the next match
    pub resume: bool,
    /// Manual table reset
    pub reset: bool,
    pub game_mode: Option<GameMode>,
}

/// Advance the session by one fixed timestep
pub fn tick<P: Physics, Q: Policy>(
    flow: &mut TurnFlowController<P, Q>,
    input: &TickInput,
    dt: f32,
    stats: &mut TrainingStats,
) {
    // Frozen behind the win prompt
    if flow.win_prompt().is_some() {
        if input.resume {
            flow.resume_after_win();
        }
        return;
    }

    if let Some(mode) = input.game_mode {
        flow.set_game_mode(mode);
    }
    if input.reset {
        flow.request_reset();
    }
    if let Some(shot) = input.player_shot {
        flow.player_shoot(shot);
    }

    for task in flow.scheduler.advance(dt) {
        flow.run_task(task);
    }
    flow.update_waits(dt);

    flow.env.tick_cues(dt);
    let events = flow.env.step_table(dt);
    flow.handle_table_events(events);

    flow.update_watchdogs(dt);
    flow.update_forced_stop(dt);
    flow.update_decision_fallback(dt);

    flow.restart_ended_episode();
    for summary in flow.drain_finished_episodes() {
        if stats.record_episode(&summary) {
            log::info!(
                "Training target reached after {} episodes ({:.1}% success)",
                stats.total_episodes,
                stats.success_rate() * 100.0
            );
        }
    }
}
