//! Day-row CRUD operations

use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::error::ScheduleError;
use crate::week::WeekPeriod;

/// One relational day-row as stored.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentRow {
    pub date: NaiveDate,
    /// Officer field as written; not necessarily canonical
    pub officer: String,
    pub code: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub updated_at: Option<String>,
}

impl AssignmentRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            date: row.get("date")?,
            officer: row.get("officer")?,
            code: row.get("code")?,
            description: row.get("description")?,
            created_by: row.get("created_by")?,
            updated_by: row.get("updated_by")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// All day-rows inside the period, ordered by date then officer.
pub fn list_for_period(
    conn: &Connection,
    period: &WeekPeriod,
) -> Result<Vec<AssignmentRow>, ScheduleError> {
    let mut stmt = conn.prepare_cached(
        "SELECT date, officer, code, description, created_by, updated_by, updated_at
         FROM assignments
         WHERE date >= ?1 AND date <= ?2
         ORDER BY date ASC, officer ASC",
    )?;

    let rows = stmt
        .query_map(params![period.start, period.end], AssignmentRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Fetch a single cell.
pub fn get(
    conn: &Connection,
    date: NaiveDate,
    officer: &str,
) -> Result<Option<AssignmentRow>, ScheduleError> {
    let mut stmt = conn.prepare_cached(
        "SELECT date, officer, code, description, created_by, updated_by, updated_at
         FROM assignments
         WHERE date = ?1 AND officer = ?2",
    )?;

    let mut rows = stmt.query(params![date, officer])?;
    match rows.next()? {
        Some(row) => Ok(Some(AssignmentRow::from_row(row)?)),
        None => Ok(None),
    }
}

/// Insert or update one cell. `created_by` is stamped on first insert only;
/// updates overwrite code, description, and the update metadata atomically.
pub fn upsert(
    conn: &Connection,
    date: NaiveDate,
    officer: &str,
    code: &str,
    description: Option<&str>,
    actor: &str,
    at: &str,
) -> Result<(), ScheduleError> {
    conn.execute(
        "INSERT INTO assignments (date, officer, code, description, created_by, updated_by, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)
         ON CONFLICT(date, officer) DO UPDATE SET
             code = excluded.code,
             description = excluded.description,
             updated_by = excluded.updated_by,
             updated_at = excluded.updated_at",
        params![date, officer, code, description, actor, at],
    )?;
    Ok(())
}

/// Remove one cell; true when a row existed.
pub fn delete(conn: &Connection, date: NaiveDate, officer: &str) -> Result<bool, ScheduleError> {
    let n = conn.execute(
        "DELETE FROM assignments WHERE date = ?1 AND officer = ?2",
        params![date, officer],
    )?;
    Ok(n > 0)
}

/// Delete every day-row; the rollover purge.
pub fn purge_all(conn: &Connection) -> Result<usize, ScheduleError> {
    let n = conn.execute("DELETE FROM assignments", [])?;
    Ok(n)
}
