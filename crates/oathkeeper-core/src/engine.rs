//! Accountability engine orchestrator.
//!
//! Composes the protocol registry, scoring engine, and lockout state
//! machine behind a per-owner single-writer lock. The engine spawns no
//! threads and keeps no internal clock: a driving collaborator calls
//! `tick(now)` on a fixed cadence, and missed ticks are caught up from
//! elapsed wall time. Operations for different owners are independent;
//! the engine is `Send + Sync`, so a collaborator may fan ticks out
//! across threads if it wants to.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::events::Event;
use crate::lockout::{LockoutState, LockoutTransition};
use crate::notify::{Notifier, Nudge, NudgeKind};
use crate::proof::{ProofMetadata, ProofRef, ProofStore};
use crate::protocol::{Protocol, ProtocolCycle, ProtocolRegistry, Schedule};
use crate::score::AccountabilityScore;
use crate::storage::Config;

/// One owner's consistency unit: protocols, score, and lock state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerState {
    pub owner_id: Uuid,
    pub registry: ProtocolRegistry,
    pub score: AccountabilityScore,
    pub lockout: LockoutState,
    /// Cycles already nudged as proof-due, so each is nagged once.
    #[serde(default)]
    nudged_cycles: HashSet<Uuid>,
}

impl OwnerState {
    pub fn new(owner_id: Uuid, initial_score: f64, at: DateTime<Utc>) -> Self {
        Self {
            owner_id,
            registry: ProtocolRegistry::new(),
            score: AccountabilityScore::new(initial_score, at),
            lockout: LockoutState::new(),
            nudged_cycles: HashSet::new(),
        }
    }
}

/// Result of a `commit` call.
#[derive(Debug, Clone, Serialize)]
pub struct CommitOutcome {
    pub protocol: Protocol,
    pub events: Vec<Event>,
}

/// Consistent snapshot returned from `submit`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub cycle: ProtocolCycle,
    pub score: AccountabilityScore,
    pub lockout: LockoutState,
    pub events: Vec<Event>,
}

/// Read-only owner snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub owner_id: Uuid,
    pub score: AccountabilityScore,
    pub lockout: LockoutState,
    pub active_cycles: Vec<ProtocolCycle>,
}

/// Per-owner portion of a tick.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerSweep {
    pub owner_id: Uuid,
    pub missed: Vec<ProtocolCycle>,
    pub events: Vec<Event>,
    pub nudges: Vec<Nudge>,
}

/// Outcome of one engine tick across all owners.
///
/// Per-owner failures are isolated here rather than propagated; one
/// owner's failure must not block the rest of the sweep.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub owners: Vec<OwnerSweep>,
    pub errors: Vec<(Uuid, String)>,
}

/// The accountability engine.
pub struct Engine {
    config: Config,
    owners: RwLock<HashMap<Uuid, Arc<Mutex<OwnerState>>>>,
    proof_store: Arc<dyn ProofStore>,
    notifier: Arc<dyn Notifier>,
}

impl Engine {
    pub fn new(
        config: Config,
        proof_store: Arc<dyn ProofStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            owners: RwLock::new(HashMap::new()),
            proof_store,
            notifier,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ── Owner lifecycle ──────────────────────────────────────────────

    /// Register a fresh owner. Returns false if already present.
    pub fn register_owner(&self, owner_id: Uuid, now: DateTime<Utc>) -> bool {
        let mut owners = self
            .owners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if owners.contains_key(&owner_id) {
            return false;
        }
        let state = OwnerState::new(owner_id, self.config.score.initial, now);
        owners.insert(owner_id, Arc::new(Mutex::new(state)));
        true
    }

    /// Import a previously exported owner state, replacing any present one.
    pub fn insert_owner(&self, state: OwnerState) {
        let mut owners = self
            .owners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        owners.insert(state.owner_id, Arc::new(Mutex::new(state)));
    }

    /// Clone an owner's state out, for persistence by the collaborator.
    pub fn export_owner(&self, owner_id: Uuid) -> Result<OwnerState> {
        let cell = self.owner(owner_id)?;
        let state = lock_owner(&cell);
        Ok(state.clone())
    }

    pub fn owner_ids(&self) -> Vec<Uuid> {
        self.owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn owner(&self, owner_id: Uuid) -> Result<Arc<Mutex<OwnerState>>> {
        self.owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&owner_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("owner", owner_id))
    }

    // ── Public contract ──────────────────────────────────────────────

    /// Commit the owner to a new protocol. Rejected while locked out.
    pub fn commit(
        &self,
        owner_id: Uuid,
        title: impl Into<String>,
        schedule: Schedule,
        grace_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        let cell = self.owner(owner_id)?;
        let mut state = lock_owner(&cell);
        reject_if_locked(&state)?;

        let protocol = state
            .registry
            .commit(owner_id, title, schedule, grace_minutes, now)?;
        let events = vec![
            Event::ProtocolCommitted {
                protocol_id: protocol.id,
                owner_id,
                title: protocol.title.clone(),
                first_due_at: protocol.cycle.due_at,
                at: now,
            },
            Event::CycleOpened {
                cycle_id: protocol.cycle.cycle_id,
                protocol_id: protocol.id,
                due_at: protocol.cycle.due_at,
                at: now,
            },
        ];
        Ok(CommitOutcome { protocol, events })
    }

    /// Archive a protocol. Rejected while locked out (it mutates protocol
    /// state and would otherwise be an escape hatch from penalties).
    pub fn archive(
        &self,
        owner_id: Uuid,
        protocol_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let cell = self.owner(owner_id)?;
        let mut state = lock_owner(&cell);
        reject_if_locked(&state)?;
        state.registry.archive(protocol_id)?;
        Ok(vec![Event::ProtocolArchived { protocol_id, at: now }])
    }

    /// Validate and store a proof artifact, returning its content address.
    ///
    /// This is the API-layer half of a submission; it touches no owner
    /// state, so an orphaned blob from an aborted submit is harmless.
    pub fn put_proof(&self, bytes: &[u8], metadata: &ProofMetadata) -> Result<ProofRef> {
        self.config.proof.validate(bytes, metadata)?;
        Ok(self.proof_store.put(bytes, metadata)?)
    }

    /// Submit proof for a cycle.
    ///
    /// All-or-nothing: the proof store is consulted before any owner state
    /// changes, and a port failure surfaces as `ProofStoreUnavailable`
    /// with zero mutation.
    pub fn submit(
        &self,
        owner_id: Uuid,
        cycle_id: Uuid,
        proof_ref: ProofRef,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome> {
        let cell = self.owner(owner_id)?;
        let mut state = lock_owner(&cell);
        reject_if_locked(&state)?;

        if !self.proof_store.exists(&proof_ref)? {
            return Err(EngineError::not_found("proof", proof_ref));
        }

        let stored_ref = proof_ref.clone();
        let cycle = state.registry.submit_proof(cycle_id, proof_ref, now)?;
        state.nudged_cycles.remove(&cycle_id);

        let mut events = vec![Event::ProofAccepted {
            cycle_id: cycle.cycle_id,
            protocol_id: cycle.protocol_id,
            outcome: cycle.outcome,
            proof_ref: stored_ref,
            at: now,
        }];

        let mut nudges = Vec::new();
        if let Some(score_event) =
            state
                .score
                .apply_outcome(cycle.cycle_id, cycle.outcome, &self.config.score, now)
        {
            events.push(Event::ScoreChanged {
                owner_id,
                cause: score_event.cause.clone(),
                delta: score_event.delta,
                value: score_event.value_after,
                at: now,
            });
            let value = state.score.value;
            if let Some(transition) =
                state
                    .lockout
                    .on_score_update(value, &score_event.cause, &self.config.lockout, now)
            {
                self.push_lockout_outcome(owner_id, &transition, now, &mut events, &mut nudges);
            }
        }

        let outcome = SubmitOutcome {
            cycle,
            score: state.score.clone(),
            lockout: state.lockout.clone(),
            events,
        };
        drop(state);
        self.deliver(&nudges);
        Ok(outcome)
    }

    /// Read-only snapshot; never mutates.
    pub fn status(&self, owner_id: Uuid) -> Result<StatusSnapshot> {
        let cell = self.owner(owner_id)?;
        let state = lock_owner(&cell);
        Ok(StatusSnapshot {
            owner_id,
            score: state.score.clone(),
            lockout: state.lockout.clone(),
            active_cycles: state.registry.active_cycles(),
        })
    }

    /// Sweep every owner: advance cycles, apply score deltas and decay,
    /// evaluate lockout transitions, and emit notification decisions.
    ///
    /// Safe to call redundantly for the same instant; per-owner failures
    /// land in the report instead of aborting the sweep.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let owners: Vec<(Uuid, Arc<Mutex<OwnerState>>)> = {
            self.owners
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(id, cell)| (*id, Arc::clone(cell)))
                .collect()
        };

        let mut report = TickReport {
            at: now,
            owners: Vec::new(),
            errors: Vec::new(),
        };
        for (owner_id, cell) in owners {
            let mut state = lock_owner(&cell);
            match self.tick_owner(&mut state, now) {
                Ok(sweep) => {
                    drop(state);
                    self.deliver(&sweep.nudges);
                    report.owners.push(sweep);
                }
                Err(err) => report.errors.push((owner_id, err.to_string())),
            }
        }
        report
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn tick_owner(&self, state: &mut OwnerState, now: DateTime<Utc>) -> Result<OwnerSweep> {
        let owner_id = state.owner_id;
        let mut events = Vec::new();
        let mut nudges = Vec::new();
        let mut missed = Vec::new();

        // Cycle advancement precedes everything else; penalties keep
        // accruing even while the owner is locked.
        for advance in state.registry.sweep(now) {
            events.push(Event::CycleMissed {
                cycle_id: advance.missed.cycle_id,
                protocol_id: advance.missed.protocol_id,
                due_at: advance.missed.due_at,
                at: now,
            });
            events.push(Event::CycleOpened {
                cycle_id: advance.opened.cycle_id,
                protocol_id: advance.opened.protocol_id,
                due_at: advance.opened.due_at,
                at: now,
            });
            state.nudged_cycles.remove(&advance.missed.cycle_id);
            nudges.push(self.nudge(
                state,
                NudgeKind::CycleMissed {
                    protocol_id: advance.missed.protocol_id,
                    cycle_id: advance.missed.cycle_id,
                    due_at: advance.missed.due_at,
                },
                now,
            ));

            if let Some(score_event) = state.score.apply_outcome(
                advance.missed.cycle_id,
                advance.missed.outcome,
                &self.config.score,
                now,
            ) {
                events.push(Event::ScoreChanged {
                    owner_id,
                    cause: score_event.cause.clone(),
                    delta: score_event.delta,
                    value: score_event.value_after,
                    at: now,
                });
                let value = state.score.value;
                if let Some(transition) = state.lockout.on_score_update(
                    value,
                    &score_event.cause,
                    &self.config.lockout,
                    now,
                ) {
                    self.push_lockout_outcome(owner_id, &transition, now, &mut events, &mut nudges);
                }
            }
            missed.push(advance.missed);
        }

        // Inactivity self-heal; each decay tick is its own score event.
        for decay_event in
            state
                .score
                .apply_due_decay(&self.config.score, self.config.decay_interval(), now)
        {
            events.push(Event::ScoreChanged {
                owner_id,
                cause: decay_event.cause.clone(),
                delta: decay_event.delta,
                value: decay_event.value_after,
                at: decay_event.at,
            });
        }

        // Guarded unlock edge: clear or re-arm.
        let value = state.score.value;
        if let Some(transition) = state.lockout.check(value, &self.config.lockout, now) {
            self.push_lockout_outcome(owner_id, &transition, now, &mut events, &mut nudges);
        }

        // Nag for cycles past due but still inside grace, once per cycle.
        let pending: Vec<(Uuid, Uuid, DateTime<Utc>)> = state
            .registry
            .active()
            .filter(|p| p.cycle.due_at < now && now <= p.deadline())
            .map(|p| (p.id, p.cycle.cycle_id, p.cycle.due_at))
            .collect();
        for (protocol_id, cycle_id, due_at) in pending {
            if state.nudged_cycles.insert(cycle_id) {
                nudges.push(self.nudge(
                    state,
                    NudgeKind::ProofDue {
                        protocol_id,
                        cycle_id,
                        due_at,
                    },
                    now,
                ));
            }
        }

        Ok(OwnerSweep {
            owner_id,
            missed,
            events,
            nudges,
        })
    }

    fn nudge(&self, state: &OwnerState, kind: NudgeKind, now: DateTime<Utc>) -> Nudge {
        let title = match &kind {
            NudgeKind::ProofDue { protocol_id, .. }
            | NudgeKind::CycleMissed { protocol_id, .. } => state
                .registry
                .get(*protocol_id)
                .map(|p| p.title.as_str()),
            _ => None,
        };
        Nudge::new(state.owner_id, kind, title, &self.config.quiet_hours, now)
    }

    fn push_lockout_outcome(
        &self,
        owner_id: Uuid,
        transition: &LockoutTransition,
        now: DateTime<Utc>,
        events: &mut Vec<Event>,
        nudges: &mut Vec<Nudge>,
    ) {
        match transition {
            LockoutTransition::Triggered { unlock_at } => {
                events.push(Event::LockoutTriggered {
                    owner_id,
                    unlock_at: *unlock_at,
                    at: now,
                });
                nudges.push(Nudge::new(
                    owner_id,
                    NudgeKind::LockoutTriggered {
                        unlock_at: *unlock_at,
                    },
                    None,
                    &self.config.quiet_hours,
                    now,
                ));
            }
            LockoutTransition::Extended { unlock_at } => {
                events.push(Event::LockoutExtended {
                    owner_id,
                    unlock_at: *unlock_at,
                    at: now,
                });
                nudges.push(Nudge::new(
                    owner_id,
                    NudgeKind::LockoutExtended {
                        unlock_at: *unlock_at,
                    },
                    None,
                    &self.config.quiet_hours,
                    now,
                ));
            }
            LockoutTransition::Cleared => {
                events.push(Event::LockoutCleared { owner_id, at: now });
            }
        }
    }

    /// Best-effort delivery; a notifier failure never rolls back state.
    fn deliver(&self, nudges: &[Nudge]) {
        for nudge in nudges {
            if let Err(err) = self.notifier.notify(nudge) {
                eprintln!("notifier failure (ignored): {err}");
            }
        }
    }
}

fn lock_owner(cell: &Arc<Mutex<OwnerState>>) -> MutexGuard<'_, OwnerState> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

fn reject_if_locked(state: &OwnerState) -> Result<()> {
    if state.lockout.is_locked() {
        return Err(EngineError::LockedOut {
            owner_id: state.owner_id,
            unlock_at: state.lockout.unlock_at,
        });
    }
    Ok(())
}
