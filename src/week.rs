//! Week window resolution
//!
//! The editable period is always exactly one Monday..Sunday window, derived
//! from the clock on every read. Nothing here touches storage.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// One Monday..Sunday window, both dates inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekPeriod {
    /// The seven dates of the window, Monday first.
    pub fn dates(&self) -> Vec<NaiveDate> {
        (0..7)
            .map(|i| self.start + Duration::days(i))
            .collect()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Resolve the active week window.
///
/// `effective` is today bounded below by the override (when present) or the
/// cutover; the window starts on the Monday on or before `effective`. A
/// Sunday therefore lands 6 days past the prior Monday, not at the start of
/// a new window.
pub fn resolve_week(
    today: NaiveDate,
    cutover: NaiveDate,
    week_override: Option<NaiveDate>,
) -> WeekPeriod {
    let floor = week_override.unwrap_or(cutover);
    let effective = today.max(floor);

    let back = effective.weekday().num_days_from_monday() as i64;
    let start = effective - Duration::days(back);

    WeekPeriod {
        start,
        end: start + Duration::days(6),
    }
}
