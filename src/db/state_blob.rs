//! Serialized snapshot store
//!
//! The second physical representation of the week: one row whose JSON
//! payload mirrors every cell plus the period/roster/code metadata the
//! reporting collaborator needs. Fallback for descriptions during the
//! merge; never authoritative for codes.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ScheduleConfig;
use crate::error::ScheduleError;
use crate::week::WeekPeriod;

/// Signature block shown under the rendered schedule; admin-editable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signatures {
    #[serde(default)]
    pub left_name: String,
    #[serde(default)]
    pub left_role: String,
    #[serde(default)]
    pub right_name: String,
    #[serde(default)]
    pub right_role: String,
}

/// Presentation metadata carried by the snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotMeta {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub period_label: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub signatures: Option<Signatures>,
}

/// One mirrored cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotCell {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// The whole serialized week.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub meta: SnapshotMeta,
    #[serde(default)]
    pub period: Option<WeekPeriod>,
    #[serde(default)]
    pub dates: Vec<NaiveDate>,
    #[serde(default)]
    pub codes: Vec<String>,
    /// canonical name -> date -> cell
    #[serde(default)]
    pub by_officer: BTreeMap<String, BTreeMap<NaiveDate, SnapshotCell>>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl StateSnapshot {
    /// A blank snapshot for a new period, stamped from configuration.
    pub fn fresh(config: &ScheduleConfig, period: WeekPeriod, now_iso: &str) -> Self {
        let mut snapshot = Self {
            meta: SnapshotMeta {
                created_at: Some(now_iso.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        snapshot.stamp(config, period, now_iso);
        snapshot
    }

    /// Re-stamp period, dates, codes, and title from configuration.
    ///
    /// Runs on every save so stored policy can never drift from current
    /// configuration.
    pub fn stamp(&mut self, config: &ScheduleConfig, period: WeekPeriod, now_iso: &str) {
        self.meta.title = config.title.clone();
        self.meta.period_label = format!(
            "{} a {}",
            period.start.format("%d/%m/%Y"),
            period.end.format("%d/%m/%Y")
        );
        if self.meta.created_at.is_none() {
            self.meta.created_at = Some(now_iso.to_string());
        }
        self.period = Some(period);
        self.dates = period.dates();
        self.codes = config.codes.iter().map(|c| c.token.clone()).collect();
        self.updated_at = Some(now_iso.to_string());
    }

    pub fn cell(&self, canonical: &str, date: NaiveDate) -> Option<&SnapshotCell> {
        self.by_officer.get(canonical).and_then(|days| days.get(&date))
    }

    pub fn set_cell(&mut self, canonical: &str, date: NaiveDate, cell: SnapshotCell) {
        self.by_officer
            .entry(canonical.to_string())
            .or_default()
            .insert(date, cell);
    }

    /// Remove a cell; prunes the officer entry when it empties out.
    pub fn clear_cell(&mut self, canonical: &str, date: NaiveDate) {
        if let Some(days) = self.by_officer.get_mut(canonical) {
            days.remove(&date);
            if days.is_empty() {
                self.by_officer.remove(canonical);
            }
        }
    }
}

/// Load the snapshot. A missing row yields `None`; a corrupt payload is
/// logged and treated as missing rather than poisoning every read.
pub fn load(conn: &Connection) -> Result<Option<StateSnapshot>, ScheduleError> {
    let payload: Option<String> = conn
        .query_row("SELECT payload FROM state_store WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    let Some(payload) = payload else {
        return Ok(None);
    };

    match serde_json::from_str(&payload) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            warn!("Discarding unparseable state snapshot: {}", e);
            Ok(None)
        }
    }
}

/// Persist the snapshot (insert-or-update of the single row).
pub fn save(conn: &Connection, snapshot: &StateSnapshot) -> Result<(), ScheduleError> {
    let payload = serde_json::to_string(snapshot)?;
    conn.execute(
        "INSERT INTO state_store (id, payload, updated_at)
         VALUES (1, ?1, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET payload = ?1, updated_at = datetime('now')",
        params![payload],
    )?;
    Ok(())
}
