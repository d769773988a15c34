//! Error types for escala-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("unrecognized name: {0}")]
    IdentityNotResolved(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("edit window is closed")]
    Locked,

    #[error("operation not permitted for this actor")]
    Forbidden,

    #[error("storage timeout: {0}")]
    StorageTransient(String),

    #[error("storage failure: {0}")]
    StorageFatal(String),

    #[error("snapshot payload error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for ScheduleError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ffi::ErrorCode;

        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                // Bounded busy_timeout expired; caller may retry
                ScheduleError::StorageTransient(e.to_string())
            }
            _ => ScheduleError::StorageFatal(e.to_string()),
        }
    }
}

impl ScheduleError {
    /// True when the caller can reasonably retry the same request.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScheduleError::StorageTransient(_))
    }
}
