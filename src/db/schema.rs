//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::ScheduleError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), ScheduleError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new schedule schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, ScheduleError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), ScheduleError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        [version],
    )?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), ScheduleError> {
    conn.execute_batch(SCHEDULE_SCHEMA)?;
    conn.execute_batch(INDEXES_SCHEMA)?;
    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, _from_version: i32) -> Result<(), ScheduleError> {
    // Migration steps go here as the schema evolves
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

const SCHEDULE_SCHEMA: &str = r#"
-- Active week window; a single row updated by compare-and-swap at rollover
CREATE TABLE IF NOT EXISTS period_marker (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL
);

-- Relational day-rows; source of truth for duty codes once populated.
-- officer holds free text as written: canonical for rows this core wrote,
-- possibly rank-prefixed or drifted for rows imported from older clients.
CREATE TABLE IF NOT EXISTS assignments (
    date TEXT NOT NULL,
    officer TEXT NOT NULL,
    code TEXT NOT NULL,
    description TEXT,
    created_by TEXT,
    updated_by TEXT,
    updated_at TEXT,
    PRIMARY KEY (date, officer)
);

-- Append-only audit trail; survives rollover
CREATE TABLE IF NOT EXISTS change_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    at TEXT NOT NULL,
    actor TEXT NOT NULL,
    target TEXT NOT NULL,
    date TEXT NOT NULL,
    field TEXT NOT NULL,
    before_value TEXT,
    after_value TEXT
);

-- Serialized snapshot of the whole week (single row, JSON payload)
CREATE TABLE IF NOT EXISTS state_store (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    payload TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_assignments_date ON assignments(date);
CREATE INDEX IF NOT EXISTS idx_change_logs_at ON change_logs(at);
"#;
