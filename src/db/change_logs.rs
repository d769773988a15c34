//! Append-only audit trail
//!
//! One row per changed field. Rows are never updated or deleted; the weekly
//! rollover purges assignments only, history is retained.

use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::ScheduleError;

/// Field names recorded in the trail.
pub const FIELD_CODE: &str = "code";
pub const FIELD_DESCRIPTION: &str = "description";

/// One immutable change record.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeLogRow {
    pub id: i64,
    /// RFC 3339 instant of the accepted mutation
    pub at: String,
    pub actor: String,
    pub target: String,
    pub date: NaiveDate,
    pub field: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl ChangeLogRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            at: row.get("at")?,
            actor: row.get("actor")?,
            target: row.get("target")?,
            date: row.get("date")?,
            field: row.get("field")?,
            before: row.get("before_value")?,
            after: row.get("after_value")?,
        })
    }
}

/// Append one change record inside the caller's transaction.
#[allow(clippy::too_many_arguments)]
pub fn insert(
    conn: &Connection,
    at: &str,
    actor: &str,
    target: &str,
    date: NaiveDate,
    field: &str,
    before: Option<&str>,
    after: Option<&str>,
) -> Result<(), ScheduleError> {
    conn.execute(
        "INSERT INTO change_logs (at, actor, target, date, field, before_value, after_value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![at, actor, target, date, field, before, after],
    )?;
    Ok(())
}

/// Most recent entries, newest first.
pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<ChangeLogRow>, ScheduleError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, at, actor, target, date, field, before_value, after_value
         FROM change_logs
         ORDER BY at DESC, id DESC
         LIMIT ?1",
    )?;

    let rows = stmt
        .query_map(params![limit], ChangeLogRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}
