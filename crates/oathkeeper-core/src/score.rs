//! Accountability scoring.
//!
//! Pure mapping from finalized cycle outcomes (or decay ticks) to score
//! deltas. The value is bounded to [0, 10]; every change appends a
//! `ScoreEvent`, and replaying the history from the initial value
//! reproduces the current value exactly, which is what makes the history
//! auditable.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::CycleOutcome;

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 10.0;

/// What caused a score change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum ScoreCause {
    /// A cycle finalized with the given outcome.
    Cycle {
        cycle_id: Uuid,
        outcome: CycleOutcome,
    },
    /// Timer-driven self-heal for inactivity.
    Decay,
}

/// One entry in the append-only score history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub at: DateTime<Utc>,
    pub cause: ScoreCause,
    pub delta: f64,
    pub value_after: f64,
}

/// Score deltas per outcome, plus the decay increment and initial value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub on_time: f64,
    pub late: f64,
    pub missed: f64,
    pub decay: f64,
    pub initial: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            on_time: 0.5,
            late: -1.0,
            missed: -2.5,
            decay: 0.1,
            initial: 5.0,
        }
    }
}

impl ScoreWeights {
    /// Delta for a finalized outcome; Pending produces no score change.
    pub fn delta_for(&self, outcome: CycleOutcome) -> Option<f64> {
        match outcome {
            CycleOutcome::OnTime => Some(self.on_time),
            CycleOutcome::Late => Some(self.late),
            CycleOutcome::Missed => Some(self.missed),
            CycleOutcome::Pending => None,
        }
    }
}

/// Per-owner accountability score with its event history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountabilityScore {
    pub value: f64,
    pub initial: f64,
    /// Instant of the last event (or creation, while history is empty).
    pub last_updated_at: DateTime<Utc>,
    pub history: Vec<ScoreEvent>,
}

impl AccountabilityScore {
    pub fn new(initial: f64, at: DateTime<Utc>) -> Self {
        let initial = initial.clamp(SCORE_MIN, SCORE_MAX);
        Self {
            value: initial,
            initial,
            last_updated_at: at,
            history: Vec::new(),
        }
    }

    fn push(&mut self, cause: ScoreCause, delta: f64, at: DateTime<Utc>) -> ScoreEvent {
        self.value = (self.value + delta).clamp(SCORE_MIN, SCORE_MAX);
        self.last_updated_at = at;
        let event = ScoreEvent {
            at,
            cause,
            delta,
            value_after: self.value,
        };
        self.history.push(event.clone());
        event
    }

    /// Apply a finalized cycle outcome. Pending outcomes are ignored.
    pub fn apply_outcome(
        &mut self,
        cycle_id: Uuid,
        outcome: CycleOutcome,
        weights: &ScoreWeights,
        at: DateTime<Utc>,
    ) -> Option<ScoreEvent> {
        let delta = weights.delta_for(outcome)?;
        Some(self.push(ScoreCause::Cycle { cycle_id, outcome }, delta, at))
    }

    /// Apply every decay tick due between the last event and `now`.
    ///
    /// One tick per full `interval` of inactivity; a saturated score still
    /// consumes the interval so the loop terminates without fabricating
    /// zero-delta events.
    pub fn apply_due_decay(
        &mut self,
        weights: &ScoreWeights,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Vec<ScoreEvent> {
        let mut events = Vec::new();
        if interval <= Duration::zero() {
            return events;
        }
        while now - self.last_updated_at >= interval {
            let at = self.last_updated_at + interval;
            if self.value >= SCORE_MAX {
                self.last_updated_at = at;
                continue;
            }
            events.push(self.push(ScoreCause::Decay, weights.decay, at));
        }
        events
    }

    /// Fold an event sequence from an initial value. Two replays of the
    /// same ordered sequence always agree, which enables audit.
    pub fn replay(initial: f64, events: &[ScoreEvent]) -> f64 {
        events.iter().fold(
            initial.clamp(SCORE_MIN, SCORE_MAX),
            |value, event| (value + event.delta).clamp(SCORE_MIN, SCORE_MAX),
        )
    }

    /// Whether the stored value matches a replay of the history.
    pub fn is_consistent(&self) -> bool {
        Self::replay(self.initial, &self.history) == self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, 0, 0).unwrap()
    }

    #[test]
    fn outcome_deltas_match_defaults() {
        let weights = ScoreWeights::default();
        let mut score = AccountabilityScore::new(weights.initial, at(1, 0));

        score
            .apply_outcome(Uuid::new_v4(), CycleOutcome::OnTime, &weights, at(1, 22))
            .unwrap();
        assert_eq!(score.value, 5.5);

        score
            .apply_outcome(Uuid::new_v4(), CycleOutcome::Late, &weights, at(2, 22))
            .unwrap();
        assert_eq!(score.value, 4.5);

        score
            .apply_outcome(Uuid::new_v4(), CycleOutcome::Missed, &weights, at(3, 22))
            .unwrap();
        assert_eq!(score.value, 2.0);

        assert!(score
            .apply_outcome(Uuid::new_v4(), CycleOutcome::Pending, &weights, at(4, 22))
            .is_none());
        assert_eq!(score.history.len(), 3);
    }

    #[test]
    fn value_caps_at_ten() {
        let weights = ScoreWeights::default();
        let mut score = AccountabilityScore::new(9.8, at(1, 0));
        let event = score
            .apply_outcome(Uuid::new_v4(), CycleOutcome::OnTime, &weights, at(1, 22))
            .unwrap();
        assert_eq!(event.value_after, 10.0);
        assert_eq!(score.value, 10.0);
    }

    #[test]
    fn value_floors_at_zero() {
        let weights = ScoreWeights::default();
        let mut score = AccountabilityScore::new(1.0, at(1, 0));
        score
            .apply_outcome(Uuid::new_v4(), CycleOutcome::Missed, &weights, at(1, 22))
            .unwrap();
        assert_eq!(score.value, 0.0);
        assert!(score.is_consistent());
    }

    #[test]
    fn decay_applies_one_tick_per_interval() {
        let weights = ScoreWeights::default();
        let mut score = AccountabilityScore::new(5.0, at(1, 0));
        // Three idle days, daily interval: three decay events, stamped at
        // interval boundaries rather than at the observation instant.
        let events = score.apply_due_decay(&weights, Duration::hours(24), at(4, 0));
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].at, at(2, 0));
        assert_eq!(events[2].at, at(4, 0));
        assert!((score.value - 5.3).abs() < 1e-9);
    }

    #[test]
    fn decay_skips_saturated_score() {
        let weights = ScoreWeights::default();
        let mut score = AccountabilityScore::new(10.0, at(1, 0));
        let events = score.apply_due_decay(&weights, Duration::hours(24), at(5, 0));
        assert!(events.is_empty());
        assert_eq!(score.value, 10.0);
        // The idle time was still consumed.
        assert_eq!(score.last_updated_at, at(5, 0));
    }

    #[test]
    fn partial_interval_produces_nothing() {
        let weights = ScoreWeights::default();
        let mut score = AccountabilityScore::new(5.0, at(1, 0));
        let events = score.apply_due_decay(&weights, Duration::hours(24), at(1, 23));
        assert!(events.is_empty());
        assert_eq!(score.last_updated_at, at(1, 0));
    }

    #[test]
    fn history_round_trips_as_json() {
        let weights = ScoreWeights::default();
        let mut score = AccountabilityScore::new(weights.initial, at(1, 0));
        score.apply_outcome(Uuid::new_v4(), CycleOutcome::Missed, &weights, at(1, 22));
        score.apply_due_decay(&weights, Duration::hours(24), at(3, 0));

        let json = serde_json::to_string(&score).unwrap();
        let decoded: AccountabilityScore = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, score);
        assert!(decoded.is_consistent());
    }

    fn outcome_strategy() -> impl Strategy<Value = CycleOutcome> {
        prop_oneof![
            Just(CycleOutcome::OnTime),
            Just(CycleOutcome::Late),
            Just(CycleOutcome::Missed),
        ]
    }

    proptest! {
        #[test]
        fn replaying_history_twice_is_identical(
            initial in 0.0f64..=10.0,
            outcomes in proptest::collection::vec(outcome_strategy(), 0..64),
        ) {
            let weights = ScoreWeights::default();
            let mut score = AccountabilityScore::new(initial, at(1, 0));
            for (i, outcome) in outcomes.iter().enumerate() {
                score.apply_outcome(
                    Uuid::new_v4(),
                    *outcome,
                    &weights,
                    at(1, 0) + Duration::minutes(i as i64),
                );
            }
            let first = AccountabilityScore::replay(score.initial, &score.history);
            let second = AccountabilityScore::replay(score.initial, &score.history);
            prop_assert_eq!(first, second);
            prop_assert_eq!(first, score.value);
        }

        #[test]
        fn value_always_within_bounds(
            initial in -5.0f64..=15.0,
            outcomes in proptest::collection::vec(outcome_strategy(), 0..64),
        ) {
            let weights = ScoreWeights::default();
            let mut score = AccountabilityScore::new(initial, at(1, 0));
            prop_assert!(score.value >= SCORE_MIN && score.value <= SCORE_MAX);
            for (i, outcome) in outcomes.iter().enumerate() {
                score.apply_outcome(
                    Uuid::new_v4(),
                    *outcome,
                    &weights,
                    at(1, 0) + Duration::minutes(i as i64),
                );
                prop_assert!(score.value >= SCORE_MIN && score.value <= SCORE_MAX);
            }
        }
    }
}
