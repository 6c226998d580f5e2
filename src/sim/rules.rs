//! Three-cushion scoring rules
//!
//! Accumulates cushion and ball contacts of the tracked cue ball during a
//! turn, records fouls, and keeps the match score. Observers (reward shaping,
//! scoreboard) read the [`ScoreEvent`] outbox after each mutation batch.

use glam::Vec3;

use super::table::{BallRole, BallSet, ContactTarget, CushionProbe};

/// Cushion contacts needed for a point
pub const REQUIRED_CUSHIONS: u32 = 3;
/// Distinct object balls needed for a point
pub const REQUIRED_BALLS: usize = 2;

/// Accumulator for the live turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnContext {
    pub cushion_contacts: u32,
    pub balls_contacted: BallSet,
    pub out_of_bounds_foul: bool,
    pub other_foul: bool,
    pub active: bool,
}

impl TurnContext {
    fn clear_stats(&mut self) {
        self.cushion_contacts = 0;
        self.balls_contacted.clear();
        self.out_of_bounds_foul = false;
        self.other_foul = false;
    }
}

/// Match score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreState {
    pub scores: [u32; 2],
    pub winning_score: u32,
}

impl ScoreState {
    pub fn new(winning_score: u32) -> Self {
        Self {
            scores: [0; 2],
            winning_score: winning_score.max(1),
        }
    }
}

/// Notifications for score observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreEvent {
    /// Turn counters or scores changed
    Updated {
        cushions: u32,
        balls: usize,
        scores: [u32; 2],
    },
    Committed { player: usize, scores: [u32; 2] },
    OutOfBoundsRegistered,
}

/// Turn evaluation snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnOutcome {
    /// A turn was being tracked when evaluated
    pub evaluated: bool,
    pub has_foul: bool,
    pub score_condition: bool,
    pub cushions: u32,
    pub balls: usize,
}

impl TurnOutcome {
    pub fn score_made(&self) -> bool {
        self.evaluated && self.score_condition && !self.has_foul
    }
}

#[derive(Debug, Clone)]
pub struct ShotRuleEngine {
    turn: TurnContext,
    score: ScoreState,
    /// Ball whose contacts count for the live turn
    tracked: Option<BallRole>,
    events: Vec<ScoreEvent>,
}

impl ShotRuleEngine {
    pub fn new(winning_score: u32) -> Self {
        Self {
            turn: TurnContext::default(),
            score: ScoreState::new(winning_score),
            tracked: None,
            events: Vec::new(),
        }
    }

    pub fn turn(&self) -> &TurnContext {
        &self.turn
    }

    pub fn score(&self) -> &ScoreState {
        &self.score
    }

    pub fn scores(&self) -> [u32; 2] {
        self.score.scores
    }

    pub fn tracked_ball(&self) -> Option<BallRole> {
        self.tracked
    }

    pub fn cushion_contacts(&self) -> u32 {
        self.turn.cushion_contacts
    }

    pub fn distinct_balls_contacted(&self) -> usize {
        self.turn.balls_contacted.len()
    }

    pub fn is_turn_active(&self) -> bool {
        self.turn.active
    }

    /// Take every notification produced since the last drain
    pub fn drain_events(&mut self) -> Vec<ScoreEvent> {
        std::mem::take(&mut self.events)
    }

    fn notify(&mut self) {
        self.events.push(ScoreEvent::Updated {
            cushions: self.turn.cushion_contacts,
            balls: self.turn.balls_contacted.len(),
            scores: self.score.scores,
        });
    }

    /// Track a different cue ball; contacts of the old one are dropped from now on
    pub fn rebind(&mut self, cue_ball: BallRole) {
        if let Some(old) = self.tracked.filter(|old| *old != cue_ball) {
            log::debug!("Rules stop tracking {}", old.as_str());
        }
        self.tracked = Some(cue_ball);
    }

    /// Begin a turn for `cue_ball`
    ///
    /// `shot_dir` is the shooting cue's forward vector. A cushion the ball is
    /// already resting against counts once if the shot is aimed into it. With
    /// no cue, any resting contact counts.
    pub fn start_turn(
        &mut self,
        cue_ball: BallRole,
        shot_dir: Option<Vec3>,
        probe: &dyn CushionProbe,
    ) {
        self.tracked = None;
        self.reset_turn_stats();
        self.register_initial_cushion_contact(cue_ball, shot_dir, probe);
        self.turn.active = true;
        self.rebind(cue_ball);
    }

    fn reset_turn_stats(&mut self) {
        self.turn.clear_stats();
        self.notify();
    }

    fn register_initial_cushion_contact(
        &mut self,
        cue_ball: BallRole,
        shot_dir: Option<Vec3>,
        probe: &dyn CushionProbe,
    ) {
        let credited = match shot_dir {
            None => probe.touching_cushion(cue_ball),
            Some(dir) => {
                let flat = Vec3::new(dir.x, 0.0, dir.z);
                flat.length_squared() > 0.001
                    && probe.touching_cushion_in_direction(cue_ball, flat.normalize())
            }
        };
        if credited {
            log::debug!("{} starts against a cushion, crediting one contact", cue_ball.as_str());
            self.turn.cushion_contacts = self.turn.cushion_contacts.max(1);
            self.notify();
        }
    }

    /// Contact reported by physics for any ball
    pub fn on_contact(&mut self, ball: BallRole, other: ContactTarget) {
        if self.tracked != Some(ball) {
            return;
        }
        match other {
            ContactTarget::Cushion => {
                self.turn.cushion_contacts += 1;
                self.notify();
            }
            ContactTarget::Ball(hit) if hit != ball => {
                if self.turn.balls_contacted.insert(hit) {
                    self.notify();
                }
            }
            _ => {}
        }
    }

    pub fn register_out_of_bounds_foul(&mut self) {
        self.turn.out_of_bounds_foul = true;
        self.notify();
        self.events.push(ScoreEvent::OutOfBoundsRegistered);
    }

    pub fn register_foul(&mut self) {
        self.turn.other_foul = true;
        self.notify();
    }

    pub fn has_foul(&self) -> bool {
        self.turn.out_of_bounds_foul || self.turn.other_foul
    }

    pub fn has_out_of_bounds_foul(&self) -> bool {
        self.turn.out_of_bounds_foul
    }

    pub fn has_other_foul(&self) -> bool {
        self.turn.other_foul
    }

    pub fn check_score_condition(&self) -> bool {
        self.turn.cushion_contacts >= REQUIRED_CUSHIONS
            && self.turn.balls_contacted.len() >= REQUIRED_BALLS
    }

    /// Award a point and close the turn. Index 0 is player 1, anything else player 2.
    pub fn commit_score(&mut self, player: usize) {
        let slot = player.min(1);
        self.score.scores[slot] += 1;
        log::info!(
            "Point to player {} ({} - {})",
            slot + 1,
            self.score.scores[0],
            self.score.scores[1]
        );
        self.events.push(ScoreEvent::Committed {
            player: slot,
            scores: self.score.scores,
        });
        self.turn.clear_stats();
        self.turn.active = false;
        self.notify();
    }

    /// Winner index, player 1 checked first
    pub fn is_game_won(&self) -> Option<usize> {
        self.score
            .scores
            .iter()
            .position(|s| *s >= self.score.winning_score)
    }

    pub fn reset_scores(&mut self) {
        self.score.scores = [0; 2];
        self.turn.active = false;
        self.notify();
    }

    pub fn set_winning_score(&mut self, winning_score: u32) {
        self.score.winning_score = winning_score.max(1);
    }

    /// Clear leftover counters between turns (never while a turn is live)
    pub fn prepare_for_next_turn(&mut self) {
        if !self.turn.active {
            self.turn.clear_stats();
            self.notify();
        }
    }

    pub fn finalize_turn_tracking(&mut self) {
        self.tracked = None;
        self.turn.active = false;
    }

    pub fn on_shot_executed(&mut self) {
        self.notify();
    }

    /// Read the turn result, then stop tracking
    pub fn evaluate_and_clear(&mut self) -> TurnOutcome {
        let outcome = TurnOutcome {
            evaluated: self.turn.active,
            has_foul: self.has_foul(),
            score_condition: self.check_score_condition(),
            cushions: self.turn.cushion_contacts,
            balls: self.turn.balls_contacted.len(),
        };
        self.finalize_turn_tracking();
        self.prepare_for_next_turn();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Probe with a single resting cushion (outward normal)
    struct Rail(Option<(BallRole, Vec3)>);

    impl CushionProbe for Rail {
        fn touching_cushion(&self, ball: BallRole) -> bool {
            self.0.is_some_and(|(b, _)| b == ball)
        }

        fn touching_cushion_in_direction(&self, ball: BallRole, direction: Vec3) -> bool {
            self.0.is_some_and(|(b, n)| b == ball && direction.dot(n) > 0.0)
        }
    }

    const NO_RAIL: Rail = Rail(None);

    fn started() -> ShotRuleEngine {
        let mut rules = ShotRuleEngine::new(10);
        rules.start_turn(BallRole::Main, Some(Vec3::Z), &NO_RAIL);
        rules
    }

    #[test]
    fn test_three_cushions_two_balls_scores() {
        let mut rules = started();
        for _ in 0..3 {
            rules.on_contact(BallRole::Main, ContactTarget::Cushion);
        }
        rules.on_contact(BallRole::Main, ContactTarget::Ball(BallRole::Target));
        rules.on_contact(BallRole::Main, ContactTarget::Ball(BallRole::Secondary));
        assert!(rules.check_score_condition());

        rules.on_contact(BallRole::Main, ContactTarget::Cushion);
        rules.on_contact(BallRole::Main, ContactTarget::Ball(BallRole::Target));
        assert!(rules.check_score_condition());
        assert_eq!(rules.cushion_contacts(), 4);
        assert_eq!(rules.distinct_balls_contacted(), 2);
    }

    #[test]
    fn test_repeat_ball_contact_not_counted() {
        let mut rules = started();
        for _ in 0..5 {
            rules.on_contact(BallRole::Main, ContactTarget::Cushion);
            rules.on_contact(BallRole::Main, ContactTarget::Ball(BallRole::Target));
        }
        assert_eq!(rules.distinct_balls_contacted(), 1);
        assert!(!rules.check_score_condition());
    }

    #[test]
    fn test_cue_ball_and_other_contacts_ignored() {
        let mut rules = started();
        rules.on_contact(BallRole::Main, ContactTarget::Ball(BallRole::Main));
        rules.on_contact(BallRole::Main, ContactTarget::Other);
        assert_eq!(rules.distinct_balls_contacted(), 0);
        assert_eq!(rules.cushion_contacts(), 0);
    }

    #[test]
    fn test_untracked_ball_contacts_dropped() {
        let mut rules = started();
        rules.on_contact(BallRole::Target, ContactTarget::Cushion);
        rules.on_contact(BallRole::Secondary, ContactTarget::Ball(BallRole::Target));
        assert_eq!(rules.cushion_contacts(), 0);

        // Rebinding to the second cue ball drops the first one's stale contacts
        rules.start_turn(BallRole::Secondary, None, &NO_RAIL);
        rules.on_contact(BallRole::Main, ContactTarget::Cushion);
        rules.on_contact(BallRole::Secondary, ContactTarget::Cushion);
        assert_eq!(rules.cushion_contacts(), 1);
    }

    #[test]
    fn test_finalize_stops_counting() {
        let mut rules = started();
        rules.finalize_turn_tracking();
        rules.on_contact(BallRole::Main, ContactTarget::Cushion);
        assert_eq!(rules.cushion_contacts(), 0);
        assert!(!rules.is_turn_active());
    }

    #[test]
    fn test_initial_cushion_credit_requires_direction() {
        let rail = Rail(Some((BallRole::Main, Vec3::NEG_Z)));
        let mut rules = ShotRuleEngine::new(10);

        rules.start_turn(BallRole::Main, Some(Vec3::new(0.0, -0.7, -0.7)), &rail);
        assert_eq!(rules.cushion_contacts(), 1);

        rules.start_turn(BallRole::Main, Some(Vec3::Z), &rail);
        assert_eq!(rules.cushion_contacts(), 0);

        // Straight down carries no direction
        rules.start_turn(BallRole::Main, Some(Vec3::NEG_Y), &rail);
        assert_eq!(rules.cushion_contacts(), 0);

        // Without a cue any resting contact counts
        rules.start_turn(BallRole::Main, None, &rail);
        assert_eq!(rules.cushion_contacts(), 1);
    }

    #[test]
    fn test_fouls_are_sticky_and_independent() {
        let mut rules = started();
        rules.register_out_of_bounds_foul();
        assert!(rules.has_foul());
        assert!(rules.has_out_of_bounds_foul());
        assert!(!rules.has_other_foul());
        rules.register_foul();
        assert!(rules.has_other_foul());

        let events = rules.drain_events();
        assert!(events.contains(&ScoreEvent::OutOfBoundsRegistered));
        assert!(rules.drain_events().is_empty());
    }

    #[test]
    fn test_commit_score_clears_turn() {
        let mut rules = started();
        rules.on_contact(BallRole::Main, ContactTarget::Cushion);
        rules.register_foul();
        rules.drain_events();

        rules.commit_score(0);
        assert_eq!(rules.scores(), [1, 0]);
        assert_eq!(rules.cushion_contacts(), 0);
        assert!(!rules.has_foul());
        assert!(!rules.is_turn_active());
        let events = rules.drain_events();
        assert_eq!(
            events[0],
            ScoreEvent::Committed {
                player: 0,
                scores: [1, 0]
            }
        );

        rules.commit_score(5);
        assert_eq!(rules.scores(), [1, 1]);
    }

    #[test]
    fn test_game_won_checks_player_one_first() {
        let mut rules = ShotRuleEngine::new(1);
        assert_eq!(rules.is_game_won(), None);
        rules.commit_score(1);
        rules.commit_score(0);
        assert_eq!(rules.is_game_won(), Some(0));

        rules.reset_scores();
        assert_eq!(rules.scores(), [0, 0]);
        assert_eq!(rules.is_game_won(), None);
    }

    #[test]
    fn test_winning_score_floor() {
        let rules = ShotRuleEngine::new(0);
        assert_eq!(rules.score().winning_score, 1);
    }

    #[test]
    fn test_scores_survive_turns() {
        let mut rules = started();
        rules.commit_score(1);
        rules.start_turn(BallRole::Main, None, &NO_RAIL);
        rules.evaluate_and_clear();
        rules.prepare_for_next_turn();
        assert_eq!(rules.scores(), [0, 1]);
    }

    #[test]
    fn test_prepare_keeps_live_turn() {
        let mut rules = started();
        rules.on_contact(BallRole::Main, ContactTarget::Cushion);
        rules.prepare_for_next_turn();
        assert_eq!(rules.cushion_contacts(), 1);
    }

    #[test]
    fn test_evaluate_and_clear() {
        let mut rules = started();
        for _ in 0..3 {
            rules.on_contact(BallRole::Main, ContactTarget::Cushion);
        }
        rules.on_contact(BallRole::Main, ContactTarget::Ball(BallRole::Target));
        rules.on_contact(BallRole::Main, ContactTarget::Ball(BallRole::Secondary));
        let outcome = rules.evaluate_and_clear();
        assert!(outcome.score_made());
        assert_eq!(outcome.cushions, 3);
        assert_eq!(rules.tracked_ball(), None);
        assert_eq!(rules.cushion_contacts(), 0);

        // Nothing live: nothing to score
        assert!(!rules.evaluate_and_clear().score_made());
    }

    fn contact_strategy() -> impl Strategy<Value = ContactTarget> {
        prop_oneof![
            Just(ContactTarget::Cushion),
            Just(ContactTarget::Other),
            Just(ContactTarget::Ball(BallRole::Target)),
            Just(ContactTarget::Ball(BallRole::Secondary)),
        ]
    }

    proptest! {
        #[test]
        fn test_score_condition_idempotent(contacts in prop::collection::vec(contact_strategy(), 0..20)) {
            let mut rules = started();
            for c in contacts {
                rules.on_contact(BallRole::Main, c);
            }
            let first = rules.check_score_condition();
            for _ in 0..5 {
                prop_assert_eq!(rules.check_score_condition(), first);
            }
        }

        #[test]
        fn test_turn_context_isolation(contacts in prop::collection::vec(contact_strategy(), 0..20)) {
            let mut rules = started();
            for c in contacts {
                rules.on_contact(BallRole::Main, c);
            }
            rules.register_out_of_bounds_foul();
            rules.start_turn(BallRole::Main, Some(Vec3::Z), &NO_RAIL);
            prop_assert_eq!(rules.cushion_contacts(), 0);
            prop_assert_eq!(rules.distinct_balls_contacted(), 0);
            prop_assert!(!rules.has_foul());
        }

        #[test]
        fn test_counts_monotonic_within_turn(contacts in prop::collection::vec(contact_strategy(), 0..30)) {
            let mut rules = started();
            let (mut cushions, mut balls) = (0, 0);
            for c in contacts {
                rules.on_contact(BallRole::Main, c);
                prop_assert!(rules.cushion_contacts() >= cushions);
                prop_assert!(rules.distinct_balls_contacted() >= balls);
                cushions = rules.cushion_contacts();
                balls = rules.distinct_balls_contacted();
            }
        }
    }
}
