//! Configuration for escala-core
//!
//! The roster and the duty-code list are configuration, not stored state:
//! every snapshot write re-stamps them from here, so storage can never
//! drift from current policy.

use std::collections::HashSet;
use std::path::Path;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// One officer on the fixed roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Officer {
    /// Unique key, independent of rank prefix or accenting
    pub canonical_name: String,
    /// e.g. "Maj PM"
    pub rank: String,
    /// Name as shown in the schedule grid
    pub display_name: String,
}

/// One duty code in the closed enumeration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DutyCode {
    pub token: String,
    /// Codes like OUTROS and FO* carry a mandatory free-text description
    #[serde(default)]
    pub needs_description: bool,
}

impl DutyCode {
    pub fn plain(token: &str) -> Self {
        Self {
            token: token.to_string(),
            needs_description: false,
        }
    }

    pub fn described(token: &str) -> Self {
        Self {
            token: token.to_string(),
            needs_description: true,
        }
    }
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Fixed civil UTC offset in hours (São Paulo runs UTC-3 year round)
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Hour (0-23) on Friday from which edits close for the weekend
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,

    /// Earliest Monday the system will ever display
    #[serde(default = "default_cutover")]
    pub cutover: NaiveDate,

    /// Optional manual override: force the week starting on this Monday
    #[serde(default)]
    pub week_override: Option<NaiveDate>,

    /// Snapshot title, shown by the reporting collaborator
    #[serde(default = "default_title")]
    pub title: String,

    /// Fixed roster, loaded at startup
    #[serde(default)]
    pub roster: Vec<Officer>,

    /// Closed duty-code enumeration
    #[serde(default = "default_codes")]
    pub codes: Vec<DutyCode>,
}

fn default_utc_offset() -> i32 {
    -3
}

fn default_close_hour() -> u32 {
    11
}

fn default_cutover() -> NaiveDate {
    // A Monday well in the past; deployments set their own
    NaiveDate::from_ymd_opt(2024, 1, 1).expect("fixed calendar date")
}

fn default_title() -> String {
    "Escala Semanal de Oficiais".to_string()
}

fn default_codes() -> Vec<DutyCode> {
    vec![
        DutyCode::plain("EXP"),
        DutyCode::plain("SR"),
        DutyCode::plain("MA"),
        DutyCode::plain("VE"),
        DutyCode::plain("FOJ"),
        DutyCode::described("FO*"),
        DutyCode::plain("LP"),
        DutyCode::plain("FÉRIAS"),
        DutyCode::plain("CFP_DIA"),
        DutyCode::plain("CFP_NOITE"),
        DutyCode::described("OUTROS"),
    ]
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset(),
            close_hour: default_close_hour(),
            cutover: default_cutover(),
            week_override: None,
            title: default_title(),
            roster: Vec::new(),
            codes: default_codes(),
        }
    }
}

impl ScheduleConfig {
    /// Load config from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScheduleError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScheduleError::Config(format!("read failed: {}", e)))?;
        toml::from_str(&content).map_err(|e| ScheduleError::Config(format!("parse failed: {}", e)))
    }

    /// Save config to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ScheduleError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ScheduleError::Config(format!("serialize failed: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| ScheduleError::Config(format!("write failed: {}", e)))
    }

    /// Reject configurations the engine cannot honor.
    ///
    /// Cutover and override must both be Mondays: the resolved window always
    /// starts on a Monday, so a mid-week bound could never be respected.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.close_hour > 23 {
            return Err(ScheduleError::Config(format!(
                "close_hour must be 0-23, got {}",
                self.close_hour
            )));
        }

        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(ScheduleError::Config(format!(
                "utc_offset_hours out of range: {}",
                self.utc_offset_hours
            )));
        }

        if self.cutover.weekday() != Weekday::Mon {
            return Err(ScheduleError::Config(format!(
                "cutover {} is not a Monday",
                self.cutover
            )));
        }

        if let Some(over) = self.week_override {
            if over.weekday() != Weekday::Mon {
                return Err(ScheduleError::Config(format!(
                    "week_override {} is not a Monday",
                    over
                )));
            }
        }

        let mut names = HashSet::new();
        for officer in &self.roster {
            if officer.canonical_name.trim().is_empty() {
                return Err(ScheduleError::Config(
                    "roster entry with empty canonical_name".to_string(),
                ));
            }
            if !names.insert(officer.canonical_name.as_str()) {
                return Err(ScheduleError::Config(format!(
                    "duplicate canonical_name: {}",
                    officer.canonical_name
                )));
            }
        }

        let mut tokens = HashSet::new();
        for code in &self.codes {
            if code.token.trim().is_empty() {
                return Err(ScheduleError::Config(
                    "duty code with empty token".to_string(),
                ));
            }
            if !tokens.insert(code.token.as_str()) {
                return Err(ScheduleError::Config(format!(
                    "duplicate duty code: {}",
                    code.token
                )));
            }
        }

        Ok(())
    }

    /// Look up a duty code by its canonical token.
    pub fn code(&self, token: &str) -> Option<&DutyCode> {
        self.codes.iter().find(|c| c.token == token)
    }

    /// Look up an officer by canonical name.
    pub fn officer(&self, canonical_name: &str) -> Option<&Officer> {
        self.roster
            .iter()
            .find(|o| o.canonical_name == canonical_name)
    }
}
