//! Three Cushion headless runner
//!
//! Plays a session against the kinematic table with a random policy and
//! prints the final score and training statistics.
//!
//! Usage:
//!   three-cushion --mode ai-only --training --seconds 600
//!   RUST_LOG=info three-cushion --mode player-vs-ai --config session.json

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use three_cushion::consts::SIM_DT;
use three_cushion::sim::{
    GameFlowState, KinematicTable, RandomPolicy, ShotParameters, TickInput, TurnFlowController, UiEvent,
    tick,
};
use three_cushion::{Config, GameMode, Range, TrainingStats, lerp};

#[derive(Parser)]
#[command(name = "three-cushion")]
#[command(about = "Run a headless three-cushion billiards session")]
struct Args {
    #[arg(long, value_enum, default_value_t = GameMode::AiOnly)]
    mode: GameMode,

    /// JSON session config; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Simulated seconds to run
    #[arg(long, default_value_t = 300.0)]
    seconds: f32,

    /// Training session (faster, no win prompt)
    #[arg(long)]
    training: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    let mode = args.mode;
    config.game.game_mode = mode;
    config.game.training |= args.training;

    let player_ranges = config.agent.clone();
    let policy = RandomPolicy::new(args.seed, config.game.behavior_mode());
    let mut flow = TurnFlowController::new(KinematicTable::default(), policy, config, args.seed);
    let mut stats = TrainingStats::new();
    let mut player = Pcg32::seed_from_u64(args.seed.wrapping_add(1));

    let steps = (args.seconds.max(0.0) / SIM_DT) as u64;
    let mut player_shots = 0u64;
    let mut matches_won = 0u64;
    for _ in 0..steps {
        let mut input = TickInput::default();
        if flow.win_prompt().is_some() {
            // Nobody to click the prompt away
            input.resume = true;
        } else if mode.player_involved()
            && flow.state() == GameFlowState::WaitingForPlayerShot
            && !flow.environment().is_resetting()
        {
            input.player_shot = Some(ShotParameters::new(
                sample(&mut player, player_ranges.angle_x),
                sample(&mut player, player_ranges.angle_y),
                sample(&mut player, player_ranges.power),
            ));
            player_shots += 1;
        }

        tick(&mut flow, &input, SIM_DT, &mut stats);

        for event in flow.drain_ui_events() {
            match event {
                UiEvent::TurnLabel(label) => log::info!("{label}"),
                UiEvent::Result { text, .. } => {
                    if text.ends_with("WINS!") {
                        matches_won += 1;
                    }
                    log::info!("{text}");
                }
                UiEvent::Scores([a, b]) => log::info!("Score {a} - {b}"),
                UiEvent::Watchdog(event) => log::debug!("{}", event.text()),
                UiEvent::WinPrompt { .. } | UiEvent::DecisionPreview(_) | UiEvent::TurnChanged(_) => {}
            }
        }
    }

    let [a, b] = flow.scores();
    println!();
    println!("=== SESSION ({}) ===", mode.as_str());
    println!("  Simulated:    {:.0}s ({:.0}s at {}x)", args.seconds, args.seconds / flow.time_scale().max(1.0), flow.time_scale());
    println!("  Score:        {a} - {b}");
    println!("  Matches won:  {matches_won}");
    println!("  Player shots: {player_shots}");
    println!("  Decisions:    {}", flow.agent().decisions());
    println!("  Episodes:     {}", stats.total_episodes);
    println!("  Success:      {:.1}% (window {:.1}%)", stats.success_rate() * 100.0, stats.window_success_rate() * 100.0);
    if stats.training_complete {
        println!("  Training target reached");
    }
    Ok(())
}

/// Uniform sample from a range in either orientation
fn sample(rng: &mut Pcg32, range: Range) -> f32 {
    lerp(range.min, range.max, rng.random::<f32>())
}
