//! Recurrence rules and due-time computation.
//!
//! "schedule -> next due time" is a pure function of the rule and a
//! reference instant. Nothing here stores a mutable "next due" that could
//! drift from the rule; cycle advancement recomputes from the previous
//! due time every call, which keeps it idempotent and replayable.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// How often a protocol falls due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recurrence {
    /// Every day.
    Daily,
    /// On the listed days of week. 0=Sun .. 6=Sat.
    Weekly { days: Vec<u8> },
    /// Every `n` days from the previous due time.
    EveryNDays { n: u32 },
}

/// A protocol's recurrence rule plus the time of day it falls due.
///
/// The due time is a UTC time component; all schedule arithmetic is UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub recurrence: Recurrence,
    pub due_time: NaiveTime,
}

impl Schedule {
    pub fn new(recurrence: Recurrence, due_time: NaiveTime) -> Self {
        Self {
            recurrence,
            due_time,
        }
    }

    /// Check that the rule can produce due times at all.
    pub fn validate(&self) -> Result<(), String> {
        match &self.recurrence {
            Recurrence::Daily => Ok(()),
            Recurrence::Weekly { days } => {
                if days.is_empty() {
                    return Err("weekly recurrence needs at least one day".into());
                }
                if let Some(bad) = days.iter().find(|&&d| d > 6) {
                    return Err(format!("weekday {bad} out of range (0=Sun .. 6=Sat)"));
                }
                Ok(())
            }
            Recurrence::EveryNDays { n } => {
                if *n == 0 {
                    return Err("every-n-days recurrence needs n >= 1".into());
                }
                Ok(())
            }
        }
    }

    /// First due time strictly after `now`, or None for an invalid rule.
    pub fn first_due_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.validate().is_err() {
            return None;
        }
        // Scan at most a week of candidate days; every valid rule has an
        // occurrence within 7 days of any instant (EveryNDays anchors its
        // stride at the first occurrence).
        for offset in 0..=7i64 {
            let date = (now + Duration::days(offset)).date_naive();
            let candidate = Utc.from_utc_datetime(&date.and_time(self.due_time));
            if candidate <= now {
                continue;
            }
            match &self.recurrence {
                Recurrence::Daily | Recurrence::EveryNDays { .. } => return Some(candidate),
                Recurrence::Weekly { days } => {
                    let dow = date.weekday().num_days_from_sunday() as u8;
                    if days.contains(&dow) {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    /// Due time following `prev_due`, or None for an invalid rule.
    pub fn next_after(&self, prev_due: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.validate().is_err() {
            return None;
        }
        match &self.recurrence {
            Recurrence::Daily => Some(prev_due + Duration::days(1)),
            Recurrence::EveryNDays { n } => Some(prev_due + Duration::days(*n as i64)),
            Recurrence::Weekly { days } => {
                for offset in 1..=7i64 {
                    let date = (prev_due + Duration::days(offset)).date_naive();
                    let dow = date.weekday().num_days_from_sunday() as u8;
                    if days.contains(&dow) {
                        return Some(Utc.from_utc_datetime(&date.and_time(self.due_time)));
                    }
                }
                None
            }
        }
    }
}
