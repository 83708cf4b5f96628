//! SQLite-based audit storage.
//!
//! Provides persistent storage for:
//! - Owner-state snapshots (key-value, JSON)
//! - Append-only finalized cycle log
//! - Append-only score event log
//! - Compliance statistics

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use super::data_dir;
use crate::score::ScoreEvent;

/// One finalized cycle, as recorded in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle_id: Uuid,
    pub protocol_id: Uuid,
    pub owner_id: Uuid,
    pub due_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub outcome: String,
    pub proof_ref: Option<String>,
}

/// Aggregate compliance numbers for one owner.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComplianceStats {
    pub total_cycles: u64,
    pub on_time: u64,
    pub late: u64,
    pub missed: u64,
}

/// SQLite database for engine audit storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/oathkeeper/oathkeeper.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("oathkeeper.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    #[cfg(test)]
    pub fn open_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cycle_log (
                cycle_id     TEXT PRIMARY KEY,
                protocol_id  TEXT NOT NULL,
                owner_id     TEXT NOT NULL,
                due_at       TEXT NOT NULL,
                submitted_at TEXT,
                outcome      TEXT NOT NULL,
                proof_ref    TEXT
            );

            CREATE TABLE IF NOT EXISTS score_events (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id    TEXT NOT NULL,
                at          TEXT NOT NULL,
                cause       TEXT NOT NULL,
                delta       REAL NOT NULL,
                value_after REAL NOT NULL
            );

            -- Create indexes for common query patterns
            CREATE INDEX IF NOT EXISTS idx_cycle_log_owner ON cycle_log(owner_id);
            CREATE INDEX IF NOT EXISTS idx_cycle_log_owner_outcome ON cycle_log(owner_id, outcome);
            CREATE INDEX IF NOT EXISTS idx_score_events_owner ON score_events(owner_id);",
        )?;
        Ok(())
    }

    // ── Key-value store ──────────────────────────────────────────────

    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
        rows.next().transpose()
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// All kv entries whose key starts with `prefix`.
    pub fn kv_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM kv WHERE key LIKE ?1 || '%'")?;
        let rows = stmt.query_map(params![prefix], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect()
    }

    // ── Audit log ────────────────────────────────────────────────────

    /// Record a finalized cycle. Re-recording the same cycle is a no-op.
    pub fn record_cycle(&self, record: &CycleRecord) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR IGNORE INTO cycle_log
                (cycle_id, protocol_id, owner_id, due_at, submitted_at, outcome, proof_ref)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.cycle_id.to_string(),
                record.protocol_id.to_string(),
                record.owner_id.to_string(),
                record.due_at.to_rfc3339(),
                record.submitted_at.map(|t| t.to_rfc3339()),
                record.outcome,
                record.proof_ref,
            ],
        )?;
        Ok(())
    }

    /// Append one score event to the audit log.
    pub fn record_score_event(
        &self,
        owner_id: Uuid,
        event: &ScoreEvent,
    ) -> Result<i64, rusqlite::Error> {
        let cause = serde_json::to_string(&event.cause)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.conn.execute(
            "INSERT INTO score_events (owner_id, at, cause, delta, value_after)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                owner_id.to_string(),
                event.at.to_rfc3339(),
                cause,
                event.delta,
                event.value_after,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn stats(&self, owner_id: Uuid) -> Result<ComplianceStats, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT outcome, COUNT(*)
             FROM cycle_log
             WHERE owner_id = ?1
             GROUP BY outcome",
        )?;

        let mut stats = ComplianceStats::default();
        let rows = stmt.query_map(params![owner_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;

        for row in rows {
            let (outcome, count) = row?;
            stats.total_cycles += count;
            match outcome.as_str() {
                "on_time" => stats.on_time += count,
                "late" => stats.late += count,
                "missed" => stats.missed += count,
                _ => {}
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::ScoreCause;
    use chrono::TimeZone;

    fn record(owner_id: Uuid, outcome: &str) -> CycleRecord {
        CycleRecord {
            cycle_id: Uuid::new_v4(),
            protocol_id: Uuid::new_v4(),
            owner_id,
            due_at: Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0).unwrap(),
            submitted_at: None,
            outcome: outcome.to_string(),
            proof_ref: None,
        }
    }

    #[test]
    fn kv_round_trip_and_prefix_scan() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("missing").unwrap().is_none());

        db.kv_set("owner_state:a", "{}").unwrap();
        db.kv_set("owner_state:b", "{\"x\":1}").unwrap();
        db.kv_set("other", "y").unwrap();
        db.kv_set("owner_state:a", "{\"updated\":true}").unwrap();

        assert_eq!(
            db.kv_get("owner_state:a").unwrap().as_deref(),
            Some("{\"updated\":true}")
        );
        let entries = db.kv_prefix("owner_state:").unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn cycle_log_is_idempotent_per_cycle() {
        let db = Database::open_memory().unwrap();
        let owner = Uuid::new_v4();
        let rec = record(owner, "missed");
        db.record_cycle(&rec).unwrap();
        db.record_cycle(&rec).unwrap();

        let stats = db.stats(owner).unwrap();
        assert_eq!(stats.total_cycles, 1);
        assert_eq!(stats.missed, 1);
    }

    #[test]
    fn stats_group_by_outcome() {
        let db = Database::open_memory().unwrap();
        let owner = Uuid::new_v4();
        db.record_cycle(&record(owner, "on_time")).unwrap();
        db.record_cycle(&record(owner, "on_time")).unwrap();
        db.record_cycle(&record(owner, "late")).unwrap();
        db.record_cycle(&record(owner, "missed")).unwrap();
        // A different owner's cycles stay out of the aggregate.
        db.record_cycle(&record(Uuid::new_v4(), "missed")).unwrap();

        let stats = db.stats(owner).unwrap();
        assert_eq!(stats.total_cycles, 4);
        assert_eq!(stats.on_time, 2);
        assert_eq!(stats.late, 1);
        assert_eq!(stats.missed, 1);
    }

    #[test]
    fn score_events_append() {
        let db = Database::open_memory().unwrap();
        let owner = Uuid::new_v4();
        let event = ScoreEvent {
            at: Utc.with_ymd_and_hms(2025, 6, 1, 22, 31, 0).unwrap(),
            cause: ScoreCause::Decay,
            delta: 0.1,
            value_after: 5.1,
        };
        let first = db.record_score_event(owner, &event).unwrap();
        let second = db.record_score_event(owner, &event).unwrap();
        assert!(second > first);
    }
}
