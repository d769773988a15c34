//! Weekend edit lock
//!
//! Edits close at the configured hour on Friday and stay closed through the
//! end of Sunday, evaluated in the fixed civil zone. While locked, only
//! admin actors carrying an explicit override assertion may write.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};

use crate::error::ScheduleError;

/// Authenticated actor identity, supplied per request by the auth
/// collaborator and trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub canonical_name: String,
    pub is_admin: bool,
}

pub struct LockPolicy {
    close_hour: u32,
    zone: FixedOffset,
}

impl LockPolicy {
    pub fn new(close_hour: u32, utc_offset_hours: i32) -> Result<Self, ScheduleError> {
        let zone = FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
            ScheduleError::Config(format!("invalid utc offset: {}", utc_offset_hours))
        })?;
        Ok(Self { close_hour, zone })
    }

    /// Convert an instant to the civil zone the schedule lives in.
    pub fn civil(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.zone)
    }

    /// True from Friday `close_hour`:00 through the end of Sunday.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        let local = self.civil(now);
        match local.weekday() {
            Weekday::Fri => local.hour() >= self.close_hour,
            Weekday::Sat | Weekday::Sun => true,
            _ => false,
        }
    }

    /// Gate a write request. Independent of the write-target axis: the
    /// caller still scopes which rows the actor may touch.
    pub fn check_write(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
        override_after_lock: bool,
    ) -> Result<(), ScheduleError> {
        if self.is_locked(now) && !(actor.is_admin && override_after_lock) {
            return Err(ScheduleError::Locked);
        }
        Ok(())
    }
}
