//! Deterministic simulation module
//!
//! All session logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Physics behind the [`Physics`] trait, no engine or rendering dependencies

pub mod action;
pub mod agent;
pub mod cue;
pub mod environment;
pub mod episode;
pub mod flow;
pub mod motion;
pub mod observation;
pub mod physics;
pub mod reward;
pub mod rules;
pub mod settlement;
pub mod table;
pub mod tick;
pub mod timer;

pub use action::{ActionMapper, ShotParameters};
pub use agent::{BilliardAgent, DemonstrationPolicy, Policy, RandomPolicy, ScriptedPolicy};
pub use cue::{CueOwner, CueStick};
pub use environment::{CueSlot, Environment, ShotResult, TurnState, WatchdogEvent, WatchdogKind};
pub use episode::{EpisodeEnd, EpisodeState, EpisodeSummary};
pub use flow::{FlowTask, GameFlowState, TurnFlowController, UiEvent};
pub use physics::{KinematicConfig, KinematicTable};
pub use reward::{RewardShaper, TurnResolution};
pub use rules::{ScoreEvent, ShotRuleEngine, TurnOutcome};
pub use table::{BallRole, ContactTarget, CushionProbe, Physics, Table, TableEvent};
pub use tick::{TickInput, tick};
pub use timer::Scheduler;
