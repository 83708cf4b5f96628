//! Per-owner protocol registry.
//!
//! One registry per owner; the engine serializes all mutation through the
//! owner lock, so the registry itself carries no synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CycleOutcome, Protocol, ProtocolCycle, ProtocolStatus, Schedule};
use crate::error::EngineError;
use crate::proof::ProofRef;

/// Result of one cycle advancement: the finalized missed cycle and the
/// freshly opened one that replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleAdvance {
    pub missed: ProtocolCycle,
    pub opened: ProtocolCycle,
}

/// Table of one owner's protocols and their cycle state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolRegistry {
    protocols: Vec<Protocol>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }

    pub fn get(&self, protocol_id: Uuid) -> Option<&Protocol> {
        self.protocols.iter().find(|p| p.id == protocol_id)
    }

    /// Non-archived protocols.
    pub fn active(&self) -> impl Iterator<Item = &Protocol> {
        self.protocols.iter().filter(|p| !p.archived)
    }

    /// Pending cycles of non-archived protocols.
    pub fn active_cycles(&self) -> Vec<ProtocolCycle> {
        self.active().map(|p| p.cycle.clone()).collect()
    }

    /// Locate a cycle by id, current or finalized.
    pub fn find_cycle(&self, cycle_id: Uuid) -> Option<(&Protocol, &ProtocolCycle)> {
        for protocol in &self.protocols {
            if protocol.cycle.cycle_id == cycle_id {
                return Some((protocol, &protocol.cycle));
            }
            if let Some(cycle) = protocol.history.iter().find(|c| c.cycle_id == cycle_id) {
                return Some((protocol, cycle));
            }
        }
        None
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Commit to a new protocol. Fails with `InvalidSchedule` if the rule
    /// cannot produce a first due time in the future.
    pub fn commit(
        &mut self,
        owner_id: Uuid,
        title: impl Into<String>,
        schedule: Schedule,
        grace_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Protocol, EngineError> {
        if grace_minutes < 0 {
            return Err(EngineError::InvalidSchedule {
                reason: format!("grace must be non-negative, got {grace_minutes} minutes"),
            });
        }
        schedule
            .validate()
            .map_err(|reason| EngineError::InvalidSchedule { reason })?;
        let first_due = schedule
            .first_due_after(now)
            .ok_or_else(|| EngineError::InvalidSchedule {
                reason: "recurrence produces no future due time".into(),
            })?;

        let id = Uuid::new_v4();
        let protocol = Protocol {
            id,
            owner_id,
            title: title.into(),
            schedule,
            grace_minutes,
            status: ProtocolStatus::Scheduled,
            archived: false,
            cycle: ProtocolCycle::open(id, first_due),
            history: Vec::new(),
            created_at: now,
        };
        self.protocols.push(protocol.clone());
        Ok(protocol)
    }

    /// Advance one protocol if its grace deadline has passed.
    ///
    /// Idempotent: a second call at the same `now` returns None. The missed
    /// cycle is finalized, moved to history, and replaced by the next
    /// occurrence per the schedule.
    pub fn advance_cycle(
        &mut self,
        protocol_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<CycleAdvance>, EngineError> {
        let protocol = self
            .protocols
            .iter_mut()
            .find(|p| p.id == protocol_id)
            .ok_or_else(|| EngineError::not_found("protocol", protocol_id))?;

        if protocol.archived {
            return Ok(None);
        }
        if now <= protocol.deadline() {
            // Not yet expired; only the status may move forward.
            if protocol.cycle.due_at < now {
                protocol.status = ProtocolStatus::AwaitingProof;
            }
            return Ok(None);
        }

        let next_due = protocol
            .schedule
            .next_after(protocol.cycle.due_at)
            .ok_or_else(|| EngineError::InvalidSchedule {
                reason: "recurrence produces no next due time".into(),
            })?;

        let mut missed = protocol.cycle.clone();
        missed.outcome = CycleOutcome::Missed;
        let opened = ProtocolCycle::open(protocol.id, next_due);

        protocol.history.push(missed.clone());
        protocol.cycle = opened.clone();
        protocol.status = ProtocolStatus::Missed;

        Ok(Some(CycleAdvance { missed, opened }))
    }

    /// Advance every protocol to a fixpoint, catching up all elapsed
    /// periods (several missed periods produce several Missed cycles).
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<CycleAdvance> {
        let ids: Vec<Uuid> = self.protocols.iter().map(|p| p.id).collect();
        let mut advances = Vec::new();
        for id in ids {
            loop {
                match self.advance_cycle(id, now) {
                    Ok(Some(advance)) => advances.push(advance),
                    Ok(None) => break,
                    // advance_cycle on a known id only errors for a rule
                    // that stopped producing due times; stop advancing it.
                    Err(_) => break,
                }
            }
        }
        advances
    }

    /// Record proof against a pending cycle.
    ///
    /// Rejected submissions leave the cycle untouched: `CycleNotPending`
    /// for finalized cycles, `DeadlineExceeded` past the grace window.
    pub fn submit_proof(
        &mut self,
        cycle_id: Uuid,
        proof_ref: ProofRef,
        now: DateTime<Utc>,
    ) -> Result<ProtocolCycle, EngineError> {
        // Finalized cycles are immutable; resubmission reports their outcome.
        if let Some(finalized) = self
            .protocols
            .iter()
            .flat_map(|p| p.history.iter())
            .find(|c| c.cycle_id == cycle_id)
        {
            return Err(EngineError::CycleNotPending {
                cycle_id,
                outcome: finalized.outcome,
            });
        }

        let protocol = self
            .protocols
            .iter_mut()
            .find(|p| !p.archived && p.cycle.cycle_id == cycle_id)
            .ok_or_else(|| EngineError::not_found("cycle", cycle_id))?;

        let due_at = protocol.cycle.due_at;
        let grace_ended_at = protocol.deadline();
        if now > grace_ended_at {
            return Err(EngineError::DeadlineExceeded {
                cycle_id,
                due_at,
                grace_ended_at,
            });
        }

        let outcome = if now <= due_at {
            CycleOutcome::OnTime
        } else {
            CycleOutcome::Late
        };

        let mut finalized = protocol.cycle.clone();
        finalized.outcome = outcome;
        finalized.submitted_at = Some(now);
        finalized.proof_ref = Some(proof_ref);

        let next_due = protocol
            .schedule
            .next_after(due_at)
            .ok_or_else(|| EngineError::InvalidSchedule {
                reason: "recurrence produces no next due time".into(),
            })?;

        protocol.history.push(finalized.clone());
        protocol.cycle = ProtocolCycle::open(protocol.id, next_due);
        protocol.status = ProtocolStatus::Verified;

        Ok(finalized)
    }

    /// Stop future cycles. The current pending cycle is abandoned without
    /// penalty; history is kept.
    pub fn archive(&mut self, protocol_id: Uuid) -> Result<(), EngineError> {
        let protocol = self
            .protocols
            .iter_mut()
            .find(|p| p.id == protocol_id)
            .ok_or_else(|| EngineError::not_found("protocol", protocol_id))?;
        protocol.archived = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Recurrence;
    use chrono::{NaiveTime, TimeZone};

    fn at(d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, mi, 0).unwrap()
    }

    fn daily_at(h: u32, m: u32) -> Schedule {
        Schedule::new(Recurrence::Daily, NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn registry_with_protocol(grace_minutes: i64) -> (ProtocolRegistry, Uuid, Uuid) {
        let mut registry = ProtocolRegistry::new();
        let owner = Uuid::new_v4();
        let protocol = registry
            .commit(owner, "Evening review", daily_at(22, 0), grace_minutes, at(1, 10, 0))
            .unwrap();
        let id = protocol.id;
        let cycle_id = protocol.cycle.cycle_id;
        (registry, id, cycle_id)
    }

    #[test]
    fn commit_opens_first_pending_cycle() {
        let (registry, id, _) = registry_with_protocol(30);
        let protocol = registry.get(id).unwrap();
        assert_eq!(protocol.status, ProtocolStatus::Scheduled);
        assert_eq!(protocol.cycle.outcome, CycleOutcome::Pending);
        assert_eq!(protocol.cycle.due_at, at(1, 22, 0));
    }

    #[test]
    fn commit_rejects_invalid_rules() {
        let mut registry = ProtocolRegistry::new();
        let owner = Uuid::new_v4();
        let schedule = Schedule::new(
            Recurrence::Weekly { days: vec![] },
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        );
        let err = registry
            .commit(owner, "Broken", schedule, 30, at(1, 0, 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSchedule { .. }));

        let err = registry
            .commit(owner, "Negative grace", daily_at(8, 0), -5, at(1, 0, 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSchedule { .. }));
    }

    #[test]
    fn advance_is_noop_before_grace_deadline() {
        let (mut registry, id, _) = registry_with_protocol(30);
        // Due 22:00 + 30m grace; 22:15 is inside the window.
        assert!(registry.advance_cycle(id, at(1, 22, 15)).unwrap().is_none());
        assert_eq!(
            registry.get(id).unwrap().status,
            ProtocolStatus::AwaitingProof
        );
    }

    #[test]
    fn advance_finalizes_missed_and_opens_next() {
        let (mut registry, id, first_cycle) = registry_with_protocol(30);
        let advance = registry.advance_cycle(id, at(1, 22, 31)).unwrap().unwrap();
        assert_eq!(advance.missed.cycle_id, first_cycle);
        assert_eq!(advance.missed.outcome, CycleOutcome::Missed);
        assert_eq!(advance.opened.due_at, at(2, 22, 0));

        let protocol = registry.get(id).unwrap();
        assert_eq!(protocol.status, ProtocolStatus::Missed);
        assert_eq!(protocol.cycle.cycle_id, advance.opened.cycle_id);
        // Idempotent: nothing further is due at the same instant.
        assert!(registry.advance_cycle(id, at(1, 22, 31)).unwrap().is_none());
    }

    #[test]
    fn single_pending_cycle_at_all_times() {
        let (mut registry, id, _) = registry_with_protocol(30);
        // Three days elapse unobserved; the sweep catches all of them up.
        let advances = registry.sweep(at(4, 21, 0));
        assert_eq!(advances.len(), 3);
        let protocol = registry.get(id).unwrap();
        let pending = std::iter::once(&protocol.cycle)
            .chain(protocol.history.iter())
            .filter(|c| c.outcome == CycleOutcome::Pending)
            .count();
        assert_eq!(pending, 1);
        assert_eq!(protocol.cycle.due_at, at(4, 22, 0));
    }

    #[test]
    fn submit_on_time_and_late() {
        let (mut registry, id, cycle_id) = registry_with_protocol(30);
        let finalized = registry
            .submit_proof(cycle_id, ProofRef::for_bytes(b"evidence"), at(1, 21, 50))
            .unwrap();
        assert_eq!(finalized.outcome, CycleOutcome::OnTime);
        assert_eq!(finalized.submitted_at, Some(at(1, 21, 50)));
        assert_eq!(registry.get(id).unwrap().status, ProtocolStatus::Verified);

        // The next cycle is already open; a late submission within grace.
        let next_cycle = registry.get(id).unwrap().cycle.cycle_id;
        let finalized = registry
            .submit_proof(next_cycle, ProofRef::for_bytes(b"evidence-2"), at(2, 22, 10))
            .unwrap();
        assert_eq!(finalized.outcome, CycleOutcome::Late);
    }

    #[test]
    fn submit_after_grace_rejected_without_mutation() {
        let (mut registry, id, cycle_id) = registry_with_protocol(30);
        let err = registry
            .submit_proof(cycle_id, ProofRef::for_bytes(b"too-late"), at(1, 22, 31))
            .unwrap_err();
        assert!(matches!(err, EngineError::DeadlineExceeded { .. }));

        let protocol = registry.get(id).unwrap();
        assert_eq!(protocol.cycle.cycle_id, cycle_id);
        assert_eq!(protocol.cycle.outcome, CycleOutcome::Pending);
        assert!(protocol.cycle.proof_ref.is_none());
    }

    #[test]
    fn double_submit_hits_cycle_not_pending() {
        let (mut registry, _, cycle_id) = registry_with_protocol(30);
        registry
            .submit_proof(cycle_id, ProofRef::for_bytes(b"evidence"), at(1, 21, 0))
            .unwrap();
        let err = registry
            .submit_proof(cycle_id, ProofRef::for_bytes(b"again"), at(1, 21, 5))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::CycleNotPending {
                outcome: CycleOutcome::OnTime,
                ..
            }
        ));
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let (mut registry, _, _) = registry_with_protocol(30);
        let missing = Uuid::new_v4();
        assert!(matches!(
            registry.advance_cycle(missing, at(1, 23, 0)),
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            registry.submit_proof(missing, ProofRef::for_bytes(b"x"), at(1, 21, 0)),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn archived_protocols_never_advance() {
        let (mut registry, id, _) = registry_with_protocol(30);
        registry.archive(id).unwrap();
        assert!(registry.advance_cycle(id, at(3, 0, 0)).unwrap().is_none());
        assert!(registry.sweep(at(5, 0, 0)).is_empty());
        assert!(registry.active_cycles().is_empty());
    }

    #[test]
    fn grace_boundary_is_inclusive() {
        let (mut registry, _, cycle_id) = registry_with_protocol(30);
        // Exactly at due+grace the submission still lands, as Late.
        let finalized = registry
            .submit_proof(cycle_id, ProofRef::for_bytes(b"on the wire"), at(1, 22, 30))
            .unwrap();
        assert_eq!(finalized.outcome, CycleOutcome::Late);
    }

    #[test]
    fn registry_round_trips_as_json() {
        let (registry, _, _) = registry_with_protocol(45);
        let json = serde_json::to_string(&registry).unwrap();
        let decoded: ProtocolRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, registry);
    }
}
