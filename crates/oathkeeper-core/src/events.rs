use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::proof::ProofRef;
use crate::protocol::CycleOutcome;
use crate::score::ScoreCause;

/// Every engine state change produces an Event. Collaborators append them
/// to their audit log; the engine itself keeps no global event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ProtocolCommitted {
        protocol_id: Uuid,
        owner_id: Uuid,
        title: String,
        first_due_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    ProtocolArchived {
        protocol_id: Uuid,
        at: DateTime<Utc>,
    },
    CycleOpened {
        cycle_id: Uuid,
        protocol_id: Uuid,
        due_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    ProofAccepted {
        cycle_id: Uuid,
        protocol_id: Uuid,
        outcome: CycleOutcome,
        proof_ref: ProofRef,
        at: DateTime<Utc>,
    },
    CycleMissed {
        cycle_id: Uuid,
        protocol_id: Uuid,
        due_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    ScoreChanged {
        owner_id: Uuid,
        cause: ScoreCause,
        delta: f64,
        value: f64,
        at: DateTime<Utc>,
    },
    LockoutTriggered {
        owner_id: Uuid,
        unlock_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    LockoutExtended {
        owner_id: Uuid,
        unlock_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    LockoutCleared {
        owner_id: Uuid,
        at: DateTime<Utc>,
    },
}
