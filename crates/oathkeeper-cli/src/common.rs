//! Shared runtime wiring for CLI commands.
//!
//! The CLI is the engine's collaborator: it builds the engine per
//! invocation, loads owner-state snapshots from the SQLite kv table,
//! runs one operation, and saves the snapshots back. Finalized cycles and
//! score events are appended to the audit tables.

use std::error::Error;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use oathkeeper_core::storage::data_dir;
use oathkeeper_core::{
    Clock, Config, CycleOutcome, CycleRecord, Database, Engine, Event, FsProofStore, Notifier,
    Nudge, OwnerState, ProtocolCycle, ScoreEvent, SystemClock,
};
use uuid::Uuid;

const OWNER_KEY: &str = "default_owner";
const STATE_PREFIX: &str = "owner_state:";

/// Current instant through the engine's clock port.
pub fn now() -> DateTime<Utc> {
    SystemClock.now()
}

/// Prints nudges to stdout -- the CLI's delivery channel.
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn notify(&self, nudge: &Nudge) -> Result<(), Box<dyn Error>> {
        println!("[nudge:{:?}] {}", nudge.channel, nudge.message);
        Ok(())
    }
}

pub struct Runtime {
    pub db: Database,
    pub engine: Engine,
}

/// Open the database, load configuration, and hydrate the engine with
/// every persisted owner state.
pub fn open_runtime() -> Result<Runtime, Box<dyn Error>> {
    let db = Database::open()?;
    let config = Config::load()?;
    let proofs = FsProofStore::new(data_dir()?.join("proofs"))?;
    let engine = Engine::new(config, Arc::new(proofs), Arc::new(StdoutNotifier));

    for (_, json) in db.kv_prefix(STATE_PREFIX)? {
        let state: OwnerState = serde_json::from_str(&json)?;
        engine.insert_owner(state);
    }
    Ok(Runtime { db, engine })
}

/// The single local owner, created on first use.
pub fn default_owner(rt: &Runtime) -> Result<Uuid, Box<dyn Error>> {
    if let Some(raw) = rt.db.kv_get(OWNER_KEY)? {
        let owner: Uuid = raw.parse()?;
        if rt.engine.export_owner(owner).is_err() {
            rt.engine.register_owner(owner, now());
        }
        return Ok(owner);
    }
    let owner = Uuid::new_v4();
    rt.db.kv_set(OWNER_KEY, &owner.to_string())?;
    rt.engine.register_owner(owner, now());
    Ok(owner)
}

pub fn save_owner(rt: &Runtime, owner: Uuid) -> Result<(), Box<dyn Error>> {
    let state = rt.engine.export_owner(owner)?;
    let json = serde_json::to_string(&state)?;
    rt.db.kv_set(&format!("{STATE_PREFIX}{owner}"), &json)?;
    Ok(())
}

pub fn save_all_owners(rt: &Runtime) -> Result<(), Box<dyn Error>> {
    for owner in rt.engine.owner_ids() {
        save_owner(rt, owner)?;
    }
    Ok(())
}

fn outcome_str(outcome: CycleOutcome) -> &'static str {
    match outcome {
        CycleOutcome::Pending => "pending",
        CycleOutcome::OnTime => "on_time",
        CycleOutcome::Late => "late",
        CycleOutcome::Missed => "missed",
    }
}

pub fn record_finalized_cycle(
    rt: &Runtime,
    owner_id: Uuid,
    cycle: &ProtocolCycle,
) -> Result<(), Box<dyn Error>> {
    rt.db.record_cycle(&CycleRecord {
        cycle_id: cycle.cycle_id,
        protocol_id: cycle.protocol_id,
        owner_id,
        due_at: cycle.due_at,
        submitted_at: cycle.submitted_at,
        outcome: outcome_str(cycle.outcome).to_string(),
        proof_ref: cycle.proof_ref.as_ref().map(|r| r.to_string()),
    })?;
    Ok(())
}

/// Append score-change events to the audit log; other event kinds are
/// already captured by the cycle log.
pub fn record_events(rt: &Runtime, events: &[Event]) -> Result<(), Box<dyn Error>> {
    for event in events {
        if let Event::ScoreChanged {
            owner_id,
            cause,
            delta,
            value,
            at,
        } = event
        {
            rt.db.record_score_event(
                *owner_id,
                &ScoreEvent {
                    at: *at,
                    cause: cause.clone(),
                    delta: *delta,
                    value_after: *value,
                },
            )?;
        }
    }
    Ok(())
}
