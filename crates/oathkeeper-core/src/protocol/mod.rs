//! Protocol definitions and cycle state.
//!
//! A protocol is a recurring user-committed obligation; a cycle is one
//! occurrence of it. Cycles are immutable once their outcome finalizes,
//! and a protocol carries exactly one pending cycle at any time.

mod recurrence;
mod registry;

pub use recurrence::{Recurrence, Schedule};
pub use registry::{CycleAdvance, ProtocolRegistry};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::proof::ProofRef;

/// Outcome of a single protocol cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Pending,
    OnTime,
    Late,
    Missed,
}

impl CycleOutcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CycleOutcome::Pending)
    }
}

/// Lifecycle status of a protocol, tracking its current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolStatus {
    /// Current cycle exists and its due time has not passed.
    Scheduled,
    /// Past due, inside the grace window, proof still possible.
    AwaitingProof,
    /// Previous cycle finalized with proof accepted.
    Verified,
    /// Previous cycle finalized as missed.
    Missed,
}

/// One occurrence of a protocol's recurring obligation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolCycle {
    pub cycle_id: Uuid,
    pub protocol_id: Uuid,
    pub due_at: DateTime<Utc>,
    pub proof_ref: Option<ProofRef>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub outcome: CycleOutcome,
}

impl ProtocolCycle {
    fn open(protocol_id: Uuid, due_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            protocol_id,
            due_at,
            proof_ref: None,
            submitted_at: None,
            outcome: CycleOutcome::Pending,
        }
    }
}

/// A recurring user-committed obligation with a deadline.
///
/// Created on commitment, mutated only by the registry as cycles advance.
/// Never deleted; `archived` flips instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub schedule: Schedule,
    pub grace_minutes: i64,
    pub status: ProtocolStatus,
    pub archived: bool,
    /// The single non-terminal cycle.
    pub cycle: ProtocolCycle,
    /// Finalized cycles, oldest first.
    #[serde(default)]
    pub history: Vec<ProtocolCycle>,
    pub created_at: DateTime<Utc>,
}

impl Protocol {
    pub fn grace(&self) -> Duration {
        Duration::minutes(self.grace_minutes)
    }

    /// Last instant at which proof for the current cycle is still accepted.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.cycle.due_at + self.grace()
    }
}
