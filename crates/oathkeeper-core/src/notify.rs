//! Notification decisions.
//!
//! The engine decides *that* a nudge is warranted and *how loud* it should
//! be; delivery belongs to the embedding application. Notifier failures
//! never roll back engine state.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification channel type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    /// Subtle badge indicator
    Badge,
    /// Toast notification
    Toast,
    /// Modal dialog that requires interaction
    Modal,
}

/// What a nudge is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NudgeKind {
    /// Cycle past its due time, still inside grace, no proof yet.
    ProofDue {
        protocol_id: Uuid,
        cycle_id: Uuid,
        due_at: DateTime<Utc>,
    },
    /// Cycle finalized as missed.
    CycleMissed {
        protocol_id: Uuid,
        cycle_id: Uuid,
        due_at: DateTime<Utc>,
    },
    LockoutTriggered {
        unlock_at: DateTime<Utc>,
    },
    LockoutExtended {
        unlock_at: DateTime<Utc>,
    },
}

impl NudgeKind {
    /// Escalation ladder outside quiet hours.
    fn base_channel(&self) -> NotificationChannel {
        match self {
            NudgeKind::ProofDue { .. } => NotificationChannel::Badge,
            NudgeKind::CycleMissed { .. } => NotificationChannel::Toast,
            NudgeKind::LockoutTriggered { .. } | NudgeKind::LockoutExtended { .. } => {
                NotificationChannel::Modal
            }
        }
    }

    fn message(&self, title: Option<&str>) -> String {
        let subject = title.unwrap_or("protocol");
        match self {
            NudgeKind::ProofDue { due_at, .. } => {
                format!("Proof pending for {subject} (was due {due_at}); grace window is open")
            }
            NudgeKind::CycleMissed { due_at, .. } => {
                format!("Missed {subject}: no proof by {due_at} plus grace")
            }
            NudgeKind::LockoutTriggered { unlock_at } => {
                format!("Accountability lockout engaged until {unlock_at}")
            }
            NudgeKind::LockoutExtended { unlock_at } => {
                format!("Lockout extended: score still below threshold, now until {unlock_at}")
            }
        }
    }
}

/// Quiet hours policy. Inside the window every nudge is demoted to Badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuietHoursPolicy {
    pub enabled: bool,
    pub start_hour: u8,
    pub end_hour: u8,
}

impl Default for QuietHoursPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            start_hour: 23,
            end_hour: 6,
        }
    }
}

impl QuietHoursPolicy {
    /// Check if a given time is within quiet hours
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }

        let hour = time.hour();

        // Overnight window (e.g., 23:00 - 06:00)
        if self.start_hour > self.end_hour {
            return hour >= self.start_hour as u32 || hour < self.end_hour as u32;
        }

        // Daytime window (e.g., 12:00 - 17:00)
        hour >= self.start_hour as u32 && hour < self.end_hour as u32
    }
}

/// One notification decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nudge {
    pub owner_id: Uuid,
    pub kind: NudgeKind,
    pub channel: NotificationChannel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Nudge {
    pub fn new(
        owner_id: Uuid,
        kind: NudgeKind,
        title: Option<&str>,
        quiet_hours: &QuietHoursPolicy,
        at: DateTime<Utc>,
    ) -> Self {
        let channel = if quiet_hours.contains(at) {
            NotificationChannel::Badge
        } else {
            kind.base_channel()
        };
        let message = kind.message(title);
        Self {
            owner_id,
            kind,
            channel,
            message,
            at,
        }
    }
}

/// Delivery port. Fire-and-forget, best-effort.
pub trait Notifier: Send + Sync {
    fn notify(&self, nudge: &Nudge) -> Result<(), Box<dyn std::error::Error>>;
}

/// Drops every nudge. Default when the embedder has no delivery channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _nudge: &Nudge) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}
