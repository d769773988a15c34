//! SQLite storage for the schedule core
//!
//! One database holds all four stores:
//!
//! - `period_marker` - the active week window, single row
//! - `assignments`   - relational day-rows, source of truth for codes
//! - `change_logs`   - append-only audit trail
//! - `state_store`   - serialized snapshot (single row, JSON payload)

pub mod assignments;
pub mod change_logs;
pub mod schema;
pub mod state_blob;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::ScheduleError;

/// Per-call bound on lock waits; expiry surfaces as a transient error.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database behind a mutex; one per process.
pub struct ScheduleDb {
    conn: Mutex<Connection>,
}

impl ScheduleDb {
    /// Open or create the schedule database.
    pub fn open(path: &Path) -> Result<Self, ScheduleError> {
        info!("Opening schedule database at {:?}", path);
        let conn = Connection::open(path)?;

        // WAL for concurrent readers during write transactions
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, ScheduleError> {
        debug!("Opening in-memory schedule database");
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, ScheduleError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;

        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read operation against the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ScheduleError>
    where
        F: FnOnce(&Connection) -> Result<T, ScheduleError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ScheduleError::StorageFatal(format!("lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run a write operation with exclusive access (transactions need `&mut`).
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, ScheduleError>
    where
        F: FnOnce(&mut Connection) -> Result<T, ScheduleError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| ScheduleError::StorageFatal(format!("lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Row counts across the stores.
    pub fn stats(&self) -> Result<DbStats, ScheduleError> {
        self.with_conn(|conn| {
            let assignment_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM assignments", [], |row| row.get(0))?;
            let change_log_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM change_logs", [], |row| row.get(0))?;

            Ok(DbStats {
                assignment_count: assignment_count as u64,
                change_log_count: change_log_count as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub assignment_count: u64,
    pub change_log_count: u64,
}

// Re-exports
pub use assignments::AssignmentRow;
pub use change_logs::ChangeLogRow;
pub use state_blob::{SnapshotCell, SnapshotMeta, StateSnapshot};
