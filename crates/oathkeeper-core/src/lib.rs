//! # Oathkeeper Core Library
//!
//! This library provides the core business logic for Oathkeeper, a personal
//! accountability enforcement service: users commit to recurring obligations
//! ("protocols"), must submit proof of completion before a deadline, and
//! carry a bounded accountability score whose collapse triggers a timed,
//! re-arming lockout.
//!
//! ## Architecture
//!
//! - **Protocol Registry**: per-owner table of protocols; "schedule to next
//!   due time" is a pure function so cycle advancement is idempotent
//! - **Scoring Engine**: append-only score history with deterministic replay
//! - **Lockout State Machine**: guard-checked unlock edge that re-arms while
//!   the score stays below threshold
//! - **Engine**: orchestrator behind a per-owner single-writer lock; the
//!   caller drives it by invoking `tick()` on a fixed cadence
//! - **Storage**: SQLite audit log and TOML configuration
//!
//! ## Key Components
//!
//! - [`Engine`]: public contract (`commit`, `submit`, `status`, `tick`)
//! - [`ProtocolRegistry`]: cycle lifecycle per owner
//! - [`AccountabilityScore`]: bounded score with event history
//! - [`LockoutState`]: access-lock state machine
//! - [`ProofStore`]: content-addressed proof persistence port
//! - [`Notifier`]: fire-and-forget notification decision port

pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod lockout;
pub mod notify;
pub mod proof;
pub mod protocol;
pub mod score;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    CommitOutcome, Engine, OwnerState, OwnerSweep, StatusSnapshot, SubmitOutcome, TickReport,
};
pub use error::{ConfigError, EngineError, ProofError, ProofStoreError, Result, StoreError};
pub use events::Event;
pub use lockout::{LockStatus, LockoutPolicy, LockoutState, LockoutTransition};
pub use notify::{
    NotificationChannel, Notifier, Nudge, NudgeKind, NullNotifier, QuietHoursPolicy,
};
pub use proof::{
    FsProofStore, InMemoryProofStore, ProofMetadata, ProofPolicy, ProofRef, ProofStore,
};
pub use protocol::{
    CycleAdvance, CycleOutcome, Protocol, ProtocolCycle, ProtocolRegistry, ProtocolStatus,
    Recurrence, Schedule,
};
pub use score::{AccountabilityScore, ScoreCause, ScoreEvent, ScoreWeights, SCORE_MAX, SCORE_MIN};
pub use storage::{ComplianceStats, Config, CycleRecord, Database};
