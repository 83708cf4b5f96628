//! Core error types for oathkeeper-core.
//!
//! This module defines the engine error taxonomy using thiserror. Every
//! operation returns these as typed results; nothing is silently swallowed.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::CycleOutcome;

/// Core error type for oathkeeper-core.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The recurrence rule cannot produce a first due time in the future.
    #[error("Invalid schedule: {reason}")]
    InvalidSchedule { reason: String },

    /// Proof was submitted against a cycle whose outcome is already finalized.
    #[error("Cycle {cycle_id} is not pending (outcome: {outcome:?})")]
    CycleNotPending {
        cycle_id: Uuid,
        outcome: CycleOutcome,
    },

    /// Proof arrived after the grace deadline. The cycle is left untouched.
    #[error("Deadline exceeded for cycle {cycle_id}: due {due_at}, grace ended {grace_ended_at}")]
    DeadlineExceeded {
        cycle_id: Uuid,
        due_at: DateTime<Utc>,
        grace_ended_at: DateTime<Utc>,
    },

    /// Owner is locked out; protocol-mutating operations are rejected.
    #[error("Owner {owner_id} is locked out")]
    LockedOut {
        owner_id: Uuid,
        unlock_at: Option<DateTime<Utc>>,
    },

    /// The proof store port failed or timed out. No engine state changed.
    #[error("Proof store unavailable: {0}")]
    ProofStoreUnavailable(#[from] ProofStoreError),

    /// Referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Proof artifact failed validation.
    #[error("Proof rejected: {0}")]
    Proof(#[from] ProofError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for `NotFound` with a displayable id.
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Proof validation errors.
#[derive(Error, Debug)]
pub enum ProofError {
    /// Empty artifact
    #[error("proof artifact is empty")]
    Empty,

    /// Artifact exceeds the configured size cap
    #[error("proof artifact is {size_bytes} bytes, cap is {max_bytes}")]
    TooLarge { size_bytes: u64, max_bytes: u64 },

    /// Content type not in the allow list
    #[error("unsupported proof content type: {content_type}")]
    UnsupportedType { content_type: String },
}

/// Proof store port errors.
#[derive(Error, Debug)]
pub enum ProofStoreError {
    /// The store did not answer within the bounded call window.
    #[error("proof store call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Underlying IO failure
    #[error("proof store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure
    #[error("proof store backend error: {0}")]
    Backend(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Result type alias for EngineError
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
