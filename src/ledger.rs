//! Assignment ledger
//!
//! The write/read engine over the two stores: resolves the active window,
//! advances it (purging the finished week) behind a compare-and-swap,
//! merges the relational day-rows with the snapshot, validates and applies
//! update batches, and records the audit trail.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Officer, ScheduleConfig};
use crate::db::change_logs::{self, ChangeLogRow, FIELD_CODE, FIELD_DESCRIPTION};
use crate::db::state_blob::{self, Signatures, SnapshotCell, SnapshotMeta, StateSnapshot};
use crate::db::{assignments, ScheduleDb};
use crate::error::ScheduleError;
use crate::identity::IdentityResolver;
use crate::lock::{Actor, LockPolicy};
use crate::week::{resolve_week, WeekPeriod};

/// One requested cell change.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    pub canonical_name: String,
    pub date: NaiveDate,
    /// Empty string clears the cell
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Result of an accepted batch.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    /// Items that changed stored state; idempotent re-writes count zero
    pub applied_count: usize,
}

/// Provenance of a description shown in the view.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CellMeta {
    pub updated_by: Option<String>,
    pub updated_at: Option<String>,
}

/// The resolved week, ready for display or rendering. Maps are keyed
/// `"canonical_name|YYYY-MM-DD"` (see [`cell_key`]).
#[derive(Debug, Clone, Serialize)]
pub struct WeekView {
    pub period: WeekPeriod,
    pub dates: Vec<NaiveDate>,
    pub officers: Vec<Officer>,
    pub codes: Vec<String>,
    pub assignments: BTreeMap<String, String>,
    pub notes: BTreeMap<String, String>,
    pub notes_meta: BTreeMap<String, CellMeta>,
    pub locked: bool,
    pub meta: SnapshotMeta,
}

/// Composite map key used by the view and its consumers.
pub fn cell_key(canonical_name: &str, date: NaiveDate) -> String {
    format!("{}|{}", canonical_name, date)
}

struct MergedCell {
    code: String,
    description: Option<String>,
    meta: CellMeta,
}

struct PlannedWrite {
    date: NaiveDate,
    target: String,
    /// `None` clears the cell
    code: Option<String>,
    description: Option<String>,
}

/// The schedule engine.
pub struct AssignmentLedger {
    db: ScheduleDb,
    config: ScheduleConfig,
    resolver: IdentityResolver,
    lock: LockPolicy,
}

impl AssignmentLedger {
    pub fn new(db: ScheduleDb, config: ScheduleConfig) -> Result<Self, ScheduleError> {
        config.validate()?;
        let resolver = IdentityResolver::new(&config.roster);
        let lock = LockPolicy::new(config.close_hour, config.utc_offset_hours)?;
        Ok(Self {
            db,
            config,
            resolver,
            lock,
        })
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn lock_policy(&self) -> &LockPolicy {
        &self.lock
    }

    /// Login-context identity resolution for the auth collaborator.
    pub fn resolve_login(&self, input: &str) -> Result<&Officer, ScheduleError> {
        self.resolver.resolve_login(input)
    }

    /// The window that should be active at `now`.
    pub fn active_period(&self, now: DateTime<Utc>) -> WeekPeriod {
        let today = self.lock.civil(now).date_naive();
        resolve_week(today, self.config.cutover, self.config.week_override)
    }

    /// Advance the stored period marker to the active window if it moved.
    ///
    /// Idempotent under concurrent callers: the marker update is keyed on
    /// the previous bounds, so only the caller whose conditional write
    /// lands performs the purge and the snapshot reseed, all inside one
    /// transaction. Returns the active period and whether a purge ran.
    pub fn advance_period(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(WeekPeriod, bool), ScheduleError> {
        let period = self.active_period(now);
        let now_iso = iso(now);

        let rolled = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let stored: Option<NaiveDate> = tx
                .query_row(
                    "SELECT start_date FROM period_marker WHERE id = 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            let rolled = match stored {
                Some(start) if start == period.start => false,
                Some(start) => {
                    let n = tx.execute(
                        "UPDATE period_marker
                         SET start_date = ?1, end_date = ?2
                         WHERE id = 1 AND start_date = ?3",
                        params![period.start, period.end, start],
                    )?;
                    if n == 1 {
                        let purged = assignments::purge_all(&tx)?;
                        let snapshot = StateSnapshot::fresh(&self.config, period, &now_iso);
                        state_blob::save(&tx, &snapshot)?;
                        info!(purged, start = %period.start, "Advanced week period");
                        true
                    } else {
                        // lost the race; the winner already purged
                        false
                    }
                }
                None => {
                    tx.execute(
                        "INSERT INTO period_marker (id, start_date, end_date) VALUES (1, ?1, ?2)",
                        params![period.start, period.end],
                    )?;
                    let snapshot = StateSnapshot::fresh(&self.config, period, &now_iso);
                    state_blob::save(&tx, &snapshot)?;
                    info!(start = %period.start, "Seeded initial week period");
                    false
                }
            };

            tx.commit()?;
            Ok(rolled)
        })?;

        Ok((period, rolled))
    }

    /// Resolve, reconcile, and return the active week.
    pub fn week_view(&self, now: DateTime<Utc>) -> Result<WeekView, ScheduleError> {
        let (period, _) = self.advance_period(now)?;
        let now_iso = iso(now);

        let (cells, meta) = self.db.with_conn(|conn| {
            let rows = assignments::list_for_period(conn, &period)?;
            let snapshot = state_blob::load(conn)?
                .unwrap_or_else(|| StateSnapshot::fresh(&self.config, period, &now_iso));
            let cells = self.merge(rows, &snapshot);
            Ok((cells, snapshot.meta))
        })?;

        let mut view_assignments = BTreeMap::new();
        let mut notes = BTreeMap::new();
        let mut notes_meta = BTreeMap::new();

        for ((canonical, date), cell) in cells {
            let key = cell_key(&canonical, date);
            view_assignments.insert(key.clone(), cell.code);
            if let Some(description) = cell.description {
                notes.insert(key.clone(), description);
                notes_meta.insert(key, cell.meta);
            }
        }

        Ok(WeekView {
            period,
            dates: period.dates(),
            officers: self.config.roster.clone(),
            codes: self.config.codes.iter().map(|c| c.token.clone()).collect(),
            assignments: view_assignments,
            notes,
            notes_meta,
            locked: self.lock.is_locked(now),
            meta,
        })
    }

    /// Two-store merge for the steady state.
    ///
    /// Day-rows define which cells exist and always win on code. The
    /// snapshot contributes only descriptions, and only where the row has
    /// none and both stores agree on the code. Rows whose officer or code
    /// cannot be reconciled are dropped from the view, not errored.
    fn merge(
        &self,
        rows: Vec<assignments::AssignmentRow>,
        snapshot: &StateSnapshot,
    ) -> BTreeMap<(String, NaiveDate), MergedCell> {
        use std::collections::btree_map::Entry;

        let mut cells = BTreeMap::new();

        for row in rows {
            let Some(officer) = self.resolver.resolve_stored(&row.officer) else {
                debug!(officer = %row.officer, "Dropping day-row with unresolvable officer");
                continue;
            };
            let Some(code) = self.canonical_code(&row.code) else {
                debug!(code = %row.code, "Dropping day-row with unrecognized code");
                continue;
            };

            let candidate = MergedCell {
                code: code.to_string(),
                description: trimmed(row.description.as_deref()),
                meta: CellMeta {
                    updated_by: row.updated_by,
                    updated_at: row.updated_at,
                },
            };

            // two stored spellings can resolve to the same officer; the
            // most recently updated row wins the cell
            match cells.entry((officer.canonical_name.clone(), row.date)) {
                Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
                Entry::Occupied(mut slot) => {
                    if candidate.meta.updated_at > slot.get().meta.updated_at {
                        slot.insert(candidate);
                    }
                }
            }
        }

        for (canonical, days) in &snapshot.by_officer {
            for (date, blob_cell) in days {
                let Some(cell) = cells.get_mut(&(canonical.clone(), *date)) else {
                    continue;
                };
                if cell.description.is_some() {
                    continue;
                }
                let Some(description) = trimmed(blob_cell.description.as_deref()) else {
                    continue;
                };
                if self.canonical_code(&blob_cell.code) == Some(cell.code.as_str()) {
                    cell.description = Some(description);
                    cell.meta = CellMeta {
                        updated_by: blob_cell.updated_by.clone(),
                        updated_at: blob_cell.updated_at.clone(),
                    };
                }
            }
        }

        cells
    }

    /// Validate and apply a batch of cell changes.
    ///
    /// The lock gates the whole call; one invalid item rejects the whole
    /// batch; the write phase (day-rows, snapshot mirror, audit rows) is a
    /// single transaction.
    pub fn apply_updates(
        &self,
        actor: &Actor,
        updates: &[UpdateRequest],
        now: DateTime<Utc>,
        override_after_lock: bool,
    ) -> Result<ApplyOutcome, ScheduleError> {
        self.lock.check_write(actor, now, override_after_lock)?;

        let (period, _) = self.advance_period(now)?;
        let now_iso = iso(now);

        let mut planned = Vec::with_capacity(updates.len());
        for update in updates {
            planned.push(self.plan(actor, &period, update)?);
        }

        let applied_count = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let mut snapshot = state_blob::load(&tx)?
                .unwrap_or_else(|| StateSnapshot::fresh(&self.config, period, &now_iso));

            let mut applied = 0usize;
            for item in &planned {
                let row = assignments::get(&tx, item.date, &item.target)?;
                let prior_code = row
                    .as_ref()
                    .and_then(|r| self.canonical_code(&r.code))
                    .map(String::from);
                let mut prior_description =
                    row.as_ref().and_then(|r| trimmed(r.description.as_deref()));

                // prior descriptions follow the same fallback rule as reads
                if prior_description.is_none() {
                    if let (Some(code), Some(blob_cell)) =
                        (&prior_code, snapshot.cell(&item.target, item.date))
                    {
                        if self.canonical_code(&blob_cell.code) == Some(code.as_str()) {
                            prior_description = trimmed(blob_cell.description.as_deref());
                        }
                    }
                }

                let code_changed = prior_code != item.code;
                let description_changed = prior_description != item.description;
                // a clear must also remove residue invisible to reads, e.g.
                // a row whose stored code no longer maps to the enumeration
                let clears_residue = item.code.is_none()
                    && (row.is_some() || snapshot.cell(&item.target, item.date).is_some());
                if !code_changed && !description_changed && !clears_residue {
                    continue;
                }

                match &item.code {
                    None => {
                        assignments::delete(&tx, item.date, &item.target)?;
                        snapshot.clear_cell(&item.target, item.date);
                    }
                    Some(token) => {
                        assignments::upsert(
                            &tx,
                            item.date,
                            &item.target,
                            token,
                            item.description.as_deref(),
                            &actor.canonical_name,
                            &now_iso,
                        )?;
                        snapshot.set_cell(
                            &item.target,
                            item.date,
                            SnapshotCell {
                                code: token.clone(),
                                description: item.description.clone(),
                                updated_by: Some(actor.canonical_name.clone()),
                                updated_at: Some(now_iso.clone()),
                            },
                        );
                    }
                }

                if code_changed {
                    change_logs::insert(
                        &tx,
                        &now_iso,
                        &actor.canonical_name,
                        &item.target,
                        item.date,
                        FIELD_CODE,
                        prior_code.as_deref(),
                        item.code.as_deref(),
                    )?;
                }
                if description_changed {
                    change_logs::insert(
                        &tx,
                        &now_iso,
                        &actor.canonical_name,
                        &item.target,
                        item.date,
                        FIELD_DESCRIPTION,
                        prior_description.as_deref(),
                        item.description.as_deref(),
                    )?;
                }

                applied += 1;
            }

            snapshot.stamp(&self.config, period, &now_iso);
            state_blob::save(&tx, &snapshot)?;
            tx.commit()?;
            Ok(applied)
        })?;

        Ok(ApplyOutcome { applied_count })
    }

    /// Validate one update against the active period, roster, and code
    /// rules; resolve the effective write target.
    fn plan(
        &self,
        actor: &Actor,
        period: &WeekPeriod,
        update: &UpdateRequest,
    ) -> Result<PlannedWrite, ScheduleError> {
        if !period.contains(update.date) {
            return Err(ScheduleError::Validation(format!(
                "date {} is outside the active period",
                update.date
            )));
        }
        if self.config.officer(&update.canonical_name).is_none() {
            return Err(ScheduleError::Validation(format!(
                "unknown officer: {}",
                update.canonical_name
            )));
        }

        // Non-admins write to their own row regardless of the requested
        // target; the request's target field is display-side state only.
        let target = if actor.is_admin {
            update.canonical_name.clone()
        } else {
            actor.canonical_name.clone()
        };

        let raw = update.code.trim();
        if raw.is_empty() {
            return Ok(PlannedWrite {
                date: update.date,
                target,
                code: None,
                description: None,
            });
        }

        let Some(token) = self.canonical_code(raw) else {
            return Err(ScheduleError::Validation(format!(
                "unknown duty code: {}",
                raw
            )));
        };

        let needs_description = self
            .config
            .code(token)
            .map(|c| c.needs_description)
            .unwrap_or(false);

        let description = if needs_description {
            match trimmed(update.description.as_deref()) {
                Some(d) => Some(d),
                None => {
                    return Err(ScheduleError::Validation(format!(
                        "code {} requires a description",
                        token
                    )))
                }
            }
        } else {
            // other codes never store one; a write clears any leftover
            None
        };

        Ok(PlannedWrite {
            date: update.date,
            target,
            code: Some(token.to_string()),
            description,
        })
    }

    /// Most recent audit entries; admin only.
    pub fn change_logs(
        &self,
        actor: &Actor,
        limit: u32,
    ) -> Result<Vec<ChangeLogRow>, ScheduleError> {
        if !actor.is_admin {
            return Err(ScheduleError::Forbidden);
        }
        self.db.with_conn(|conn| change_logs::recent(conn, limit))
    }

    /// Update the snapshot's signature block; admin only.
    pub fn set_signatures(
        &self,
        actor: &Actor,
        signatures: Signatures,
        now: DateTime<Utc>,
    ) -> Result<(), ScheduleError> {
        if !actor.is_admin {
            return Err(ScheduleError::Forbidden);
        }

        let (period, _) = self.advance_period(now)?;
        let now_iso = iso(now);

        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut snapshot = state_blob::load(&tx)?
                .unwrap_or_else(|| StateSnapshot::fresh(&self.config, period, &now_iso));
            snapshot.meta.signatures = Some(signatures);
            snapshot.stamp(&self.config, period, &now_iso);
            state_blob::save(&tx, &snapshot)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Map a stored code spelling to its canonical token. Case and
    /// whitespace variants collapse; anything else is unrecognized.
    fn canonical_code(&self, raw: &str) -> Option<&str> {
        let folded = fold_code(raw);
        if folded.is_empty() {
            return None;
        }
        self.config
            .codes
            .iter()
            .find(|c| fold_code(&c.token) == folded)
            .map(|c| c.token.as_str())
    }
}

fn fold_code(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn iso(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}
