//! Active-window gate: decides from wall-clock time whether frames are processed.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("invalid time of day {0:?}, expected HH:MM")]
    InvalidTime(String),
    #[error("active window ends ({end}) before it starts ({start})")]
    InvertedWindow { start: NaiveTime, end: NaiveTime },
}

pub const DEFAULT_ACTIVE_DAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// Time-of-day and day-of-week range during which frames are processed.
///
/// Both bounds are inclusive at minute resolution: with an end of 23:59,
/// 23:59:59 is still active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveWindow {
    start: NaiveTime,
    end: NaiveTime,
    days: Vec<Weekday>,
}

impl ActiveWindow {
    pub fn new(start: &str, end: &str, days: &[Weekday]) -> Result<Self, GateError> {
        let start = parse_hhmm(start)?;
        let end = parse_hhmm(end)?;
        if end < start {
            return Err(GateError::InvertedWindow { start, end });
        }
        Ok(Self { start, end, days: days.to_vec() })
    }

    /// Pure function of the given local time; recomputed on every call.
    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        let minute = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(now.time());
        self.days.contains(&now.weekday()) && self.start <= minute && minute <= self.end
    }
}

impl Default for ActiveWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(7, 30, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN),
            days: DEFAULT_ACTIVE_DAYS.to_vec(),
        }
    }
}

fn parse_hhmm(s: &str) -> Result<NaiveTime, GateError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| GateError::InvalidTime(s.to_string()))
}
