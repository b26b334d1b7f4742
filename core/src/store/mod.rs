//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Pipeline stages and detectors never execute SQL directly; detectors
//! never touch the store at all.

use crate::{error::LeakageResult, event::EventLogEntry};
mod detections;
mod sources;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{
    params,
    types::{Type, Value},
    Connection, Row,
};

pub struct LeakageStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl LeakageStore {
    pub fn open(path: &str) -> LeakageResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LeakageResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new in-memory database (isolated).
    pub fn reopen(&self) -> LeakageResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LeakageResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_sources.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_detections.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, started_at: DateTime<Utc>) -> LeakageResult<()> {
        self.conn.execute(
            "INSERT INTO runs (run_id, started_at) VALUES (?1, ?2)",
            params![run_id, started_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn complete_run(
        &self,
        run_id: &str,
        completed_at: DateTime<Utc>,
        status: &str,
    ) -> LeakageResult<()> {
        self.conn.execute(
            "UPDATE runs SET completed_at = ?2, status = ?3 WHERE run_id = ?1",
            params![run_id, completed_at.to_rfc3339(), status],
        )?;
        Ok(())
    }

    pub fn run_status(&self, run_id: &str) -> LeakageResult<Option<String>> {
        use rusqlite::OptionalExtension;
        let status = self
            .conn
            .query_row(
                "SELECT status FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> LeakageResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, seq, stage, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.run_id,
                entry.seq,
                entry.stage,
                entry.event_type,
                entry.payload,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn events_for_run(&self, run_id: &str) -> LeakageResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, seq, stage, event_type, payload
             FROM event_log WHERE run_id = ?1
             ORDER BY seq ASC, id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    run_id:     row.get(1)?,
                    seq:        row.get(2)?,
                    stage:      row.get(3)?,
                    event_type: row.get(4)?,
                    payload:    row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// ── Column helpers ─────────────────────────────────────────────

const DATE_FORMAT: &str = "%Y-%m-%d";

fn date_text(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) if !text.is_empty() => NaiveDate::parse_from_str(&text, DATE_FORMAT)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        _ => Ok(None),
    }
}

/// NULL and non-numeric values read as 0. SQLite keeps text that does not
/// parse as a number in a REAL column, so a bad cell must not fail the load.
fn num_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<f64> {
    Ok(match row.get::<_, Value>(idx)? {
        Value::Real(v) => v,
        Value::Integer(i) => i as f64,
        Value::Null => 0.0,
        other => {
            log::debug!("column {idx}: non-numeric {:?} read as 0", other.data_type());
            0.0
        }
    })
}

fn bool_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<bool> {
    Ok(match row.get::<_, Value>(idx)? {
        Value::Integer(i) => i != 0,
        Value::Real(v) => v != 0.0,
        Value::Null => false,
        other => {
            log::debug!("column {idx}: non-numeric {:?} read as false", other.data_type());
            false
        }
    })
}

fn parsed_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
