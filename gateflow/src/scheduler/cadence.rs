//! Cron cadence: which periods are on the schedule.

use crate::core::Period;
use crate::errors::{ConfigurationError, ContractErrorInfo};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use cron::Schedule;
use std::str::FromStr;

/// A cron schedule anchored at a start instant.
///
/// Periods are the schedule's instants at or after `start`, truncated to
/// whole seconds. Five-field expressions get a leading seconds field of `0`.
#[derive(Debug, Clone)]
pub struct Cadence {
    schedule: Schedule,
    expression: String,
    start: DateTime<Utc>,
}

impl Cadence {
    /// Parses a cron expression.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` (`CONFIG-SCHEDULE`) if the expression
    /// does not parse.
    pub fn parse(expression: &str, start: DateTime<Utc>) -> Result<Self, ConfigurationError> {
        let normalized = normalize(expression);
        let schedule = Schedule::from_str(&normalized).map_err(|e| {
            ConfigurationError::new(format!("Invalid schedule '{expression}': {e}")).with_error_info(
                ContractErrorInfo::new("CONFIG-SCHEDULE", "Unparsable cron expression")
                    .with_context_entry("expression", expression)
                    .with_fix_hint("Use a cron expression such as '0 16 * * *'."),
            )
        })?;

        Ok(Self {
            schedule,
            expression: expression.trim().to_string(),
            start: start.trunc_subsecs(0),
        })
    }

    /// Returns the expression as configured.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Returns the start instant.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    fn from_start(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.schedule
            .after(&(self.start - Duration::seconds(1)))
            .skip_while(|instant| *instant < self.start)
    }

    /// Returns the first period on the schedule.
    #[must_use]
    pub fn first(&self) -> Option<Period> {
        self.from_start().next().map(Period::new)
    }

    /// Returns every period scheduled at or before `now`, oldest first.
    #[must_use]
    pub fn due_until(&self, now: DateTime<Utc>) -> Vec<Period> {
        self.from_start()
            .take_while(|instant| *instant <= now)
            .map(Period::new)
            .collect()
    }

    /// Returns the period after `period`.
    #[must_use]
    pub fn next(&self, period: Period) -> Option<Period> {
        self.schedule.after(&period.scheduled_for()).next().map(Period::new)
    }

    /// Returns the period immediately before `period`, or `None` for the
    /// first period.
    #[must_use]
    pub fn previous(&self, period: Period) -> Option<Period> {
        self.from_start()
            .take_while(|instant| *instant < period.scheduled_for())
            .last()
            .map(Period::new)
    }

    /// Returns true if `period` is one of the schedule's instants.
    #[must_use]
    pub fn contains(&self, period: Period) -> bool {
        let instant = period.scheduled_for();
        instant >= self.start
            && self
                .schedule
                .after(&(instant - Duration::seconds(1)))
                .next()
                == Some(instant)
    }
}

fn normalize(expression: &str) -> String {
    let expression = expression.trim();
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}
