//! Lockout state machine.
//!
//! Explicit state plus a guard on the unlock edge, rather than a bare
//! timestamp comparison: at `unlock_at` the lock clears only if the score
//! has recovered past the threshold, otherwise it re-arms for another
//! full duration. Waiting a lock out without recovering the score is not
//! possible.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::score::ScoreCause;

/// Access-lock status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    Unlocked,
    Locked,
}

/// The score event that tripped the lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockTrigger {
    pub cause: ScoreCause,
    /// Score value immediately after the triggering update.
    pub value: f64,
}

/// Threshold and duration governing the lockout machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutPolicy {
    /// Score below this value trips the lock.
    pub threshold: f64,
    /// Lock duration; also the re-arm extension.
    pub duration_hours: i64,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            duration_hours: 24,
        }
    }
}

impl LockoutPolicy {
    pub fn duration(&self) -> Duration {
        Duration::hours(self.duration_hours)
    }
}

/// A transition taken by the machine, for audit and notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum LockoutTransition {
    Triggered { unlock_at: DateTime<Utc> },
    Extended { unlock_at: DateTime<Utc> },
    Cleared,
}

/// Per-owner lock state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockoutState {
    pub status: LockStatus,
    pub locked_at: Option<DateTime<Utc>>,
    pub unlock_at: Option<DateTime<Utc>>,
    pub trigger: Option<LockTrigger>,
}

impl Default for LockoutState {
    fn default() -> Self {
        Self {
            status: LockStatus::Unlocked,
            locked_at: None,
            unlock_at: None,
            trigger: None,
        }
    }
}

impl LockoutState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.status == LockStatus::Locked
    }

    /// Evaluate immediately after a score update. Trips Unlocked -> Locked
    /// when the value is below threshold; an existing lock is unaffected.
    pub fn on_score_update(
        &mut self,
        value: f64,
        cause: &ScoreCause,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Option<LockoutTransition> {
        if self.status == LockStatus::Locked || value >= policy.threshold {
            return None;
        }
        let unlock_at = now + policy.duration();
        self.status = LockStatus::Locked;
        self.locked_at = Some(now);
        self.unlock_at = Some(unlock_at);
        self.trigger = Some(LockTrigger {
            cause: cause.clone(),
            value,
        });
        Some(LockoutTransition::Triggered { unlock_at })
    }

    /// Periodic check. At or past `unlock_at` the guard runs: clear if the
    /// score recovered, otherwise extend from the previous `unlock_at`
    /// (repeatedly, if several durations elapsed unchecked).
    pub fn check(
        &mut self,
        value: f64,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Option<LockoutTransition> {
        if self.status != LockStatus::Locked {
            return None;
        }
        let mut unlock_at = self.unlock_at?;
        if now < unlock_at {
            return None;
        }
        if value >= policy.threshold {
            self.status = LockStatus::Unlocked;
            self.locked_at = None;
            self.unlock_at = None;
            self.trigger = None;
            return Some(LockoutTransition::Cleared);
        }
        while unlock_at <= now {
            unlock_at += policy.duration();
        }
        self.unlock_at = Some(unlock_at);
        Some(LockoutTransition::Extended { unlock_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, 0, 0).unwrap()
    }

    fn decay() -> ScoreCause {
        ScoreCause::Decay
    }

    #[test]
    fn trips_below_threshold() {
        let policy = LockoutPolicy::default();
        let mut lock = LockoutState::new();

        assert!(lock.on_score_update(3.0, &decay(), &policy, at(1, 12)).is_none());
        assert!(!lock.is_locked());

        let transition = lock.on_score_update(2.9, &decay(), &policy, at(1, 12)).unwrap();
        assert_eq!(
            transition,
            LockoutTransition::Triggered {
                unlock_at: at(2, 12)
            }
        );
        assert!(lock.is_locked());
        assert_eq!(lock.locked_at, Some(at(1, 12)));
        assert_eq!(lock.trigger.as_ref().unwrap().value, 2.9);
    }

    #[test]
    fn further_updates_do_not_restart_a_held_lock() {
        let policy = LockoutPolicy::default();
        let mut lock = LockoutState::new();
        lock.on_score_update(2.0, &decay(), &policy, at(1, 12)).unwrap();
        assert!(lock.on_score_update(0.5, &decay(), &policy, at(1, 18)).is_none());
        assert_eq!(lock.unlock_at, Some(at(2, 12)));
    }

    #[test]
    fn rearms_from_previous_unlock_at() {
        let policy = LockoutPolicy::default();
        let mut lock = LockoutState::new();
        lock.on_score_update(2.0, &decay(), &policy, at(1, 12)).unwrap();

        // Still below threshold at the unlock instant: extend, anchored at
        // the previous unlock_at, not at the check time.
        let transition = lock.check(2.0, &policy, at(2, 12)).unwrap();
        assert_eq!(
            transition,
            LockoutTransition::Extended {
                unlock_at: at(3, 12)
            }
        );
        assert!(lock.is_locked());
    }

    #[test]
    fn rearm_catches_up_several_elapsed_durations() {
        let policy = LockoutPolicy::default();
        let mut lock = LockoutState::new();
        lock.on_score_update(1.0, &decay(), &policy, at(1, 12)).unwrap();

        // No check ran for three days; the next unlock_at lands in the future.
        let transition = lock.check(1.0, &policy, at(4, 13)).unwrap();
        assert_eq!(
            transition,
            LockoutTransition::Extended {
                unlock_at: at(5, 12)
            }
        );
    }

    #[test]
    fn clears_only_with_recovered_score() {
        let policy = LockoutPolicy::default();
        let mut lock = LockoutState::new();
        lock.on_score_update(2.0, &decay(), &policy, at(1, 12)).unwrap();

        // Early check does nothing, regardless of score.
        assert!(lock.check(9.0, &policy, at(1, 18)).is_none());
        assert!(lock.is_locked());

        let transition = lock.check(3.5, &policy, at(2, 12)).unwrap();
        assert_eq!(transition, LockoutTransition::Cleared);
        assert!(!lock.is_locked());
        assert!(lock.unlock_at.is_none());
        assert!(lock.trigger.is_none());
    }

    #[test]
    fn check_on_unlocked_state_is_noop() {
        let policy = LockoutPolicy::default();
        let mut lock = LockoutState::new();
        assert!(lock.check(0.0, &policy, at(1, 12)).is_none());
        assert!(!lock.is_locked());
    }

    #[test]
    fn state_round_trips_as_json() {
        let policy = LockoutPolicy::default();
        let mut lock = LockoutState::new();
        lock.on_score_update(2.5, &decay(), &policy, at(1, 12)).unwrap();

        let json = serde_json::to_string(&lock).unwrap();
        let decoded: LockoutState = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, lock);
    }
}
