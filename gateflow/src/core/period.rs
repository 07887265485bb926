//! Scheduling periods.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One scheduled occurrence of the pipeline.
///
/// Identified by its scheduled UTC instant. The identifier (`YYYY-MM-DD`) is
/// used to derive file paths and script parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period {
    scheduled_for: DateTime<Utc>,
}

impl Period {
    /// Creates a period for a scheduled instant.
    #[must_use]
    pub const fn new(scheduled_for: DateTime<Utc>) -> Self {
        Self { scheduled_for }
    }

    /// Creates a period at a given hour of a calendar day.
    ///
    /// Returns `None` for an invalid date or hour.
    #[must_use]
    pub fn on_day(year: i32, month: u32, day: u32, hour: u32) -> Option<Self> {
        let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, 0, 0)?;
        Some(Self::new(Utc.from_utc_datetime(&naive)))
    }

    /// Returns the scheduled instant.
    #[must_use]
    pub const fn scheduled_for(&self) -> DateTime<Utc> {
        self.scheduled_for
    }

    /// Returns the identifier, `YYYY-MM-DD`.
    #[must_use]
    pub fn id(&self) -> String {
        self.scheduled_for.format("%Y-%m-%d").to_string()
    }

    /// Returns the identifier without dashes, `YYYYMMDD`.
    #[must_use]
    pub fn id_nodash(&self) -> String {
        self.scheduled_for.format("%Y%m%d").to_string()
    }

    /// Returns the calendar day of the period.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.scheduled_for.date_naive()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl From<DateTime<Utc>> for Period {
    fn from(scheduled_for: DateTime<Utc>) -> Self {
        Self::new(scheduled_for)
    }
}
