//! Discovery schedule.
//!
//! Either the literal `once` or a cron expression with a seconds field
//! (`sec min hour day-of-month month day-of-week [year]`). Fire times are
//! computed by the pure function [`next_fire`]; the timer loop that acts
//! on them lives in the service.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sbomer_core::config::SCHEDULE_ONCE;

use crate::error::FetcherError;

#[derive(Debug, Clone)]
pub enum Schedule {
    /// A single pass right after start.
    Once,
    /// A pass at every fire time of the expression.
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    pub fn is_once(&self) -> bool {
        matches!(self, Self::Once)
    }
}

impl FromStr for Schedule {
    type Err = FetcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expression = s.trim();
        if expression == SCHEDULE_ONCE {
            return Ok(Self::Once);
        }
        cron::Schedule::from_str(expression)
            .map(|schedule| Self::Cron(Box::new(schedule)))
            .map_err(|e| FetcherError::Schedule {
                expression: expression.to_owned(),
                reason: e.to_string(),
            })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Once => f.write_str(SCHEDULE_ONCE),
            Self::Cron(schedule) => write!(f, "{schedule}"),
        }
    }
}

/// First fire time strictly after `now`. `None` for [`Schedule::Once`] and
/// for expressions with no future occurrence.
pub fn next_fire(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Once => None,
        Schedule::Cron(schedule) => schedule.after(&now).next(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    #[test]
    fn once_is_recognized() {
        let schedule: Schedule = "once".parse().unwrap();
        assert!(schedule.is_once());
        assert_eq!(next_fire(&schedule, at(0, 0, 0)), None);
        assert_eq!(schedule.to_string(), "once");
    }

    #[test]
    fn hourly_schedule_fires_on_the_hour() {
        let schedule: Schedule = "0 0 * * * *".parse().unwrap();
        assert_eq!(next_fire(&schedule, at(10, 15, 0)), Some(at(11, 0, 0)));
    }

    #[test]
    fn next_fire_is_strictly_after_now() {
        let schedule: Schedule = "0 30 2 * * *".parse().unwrap();
        let now = at(2, 30, 0);
        let next = next_fire(&schedule, now).unwrap();
        assert!(next > now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 2, 2, 30, 0).unwrap());
    }

    #[test]
    fn invalid_expression_is_rejected() {
        let err = "every tuesday".parse::<Schedule>().unwrap_err();
        assert!(matches!(err, FetcherError::Schedule { .. }));
    }

    #[test]
    fn expression_in_the_past_has_no_fire_time() {
        let schedule: Schedule = "0 0 0 1 1 * 2020".parse().unwrap();
        assert_eq!(next_fire(&schedule, at(0, 0, 0)), None);
    }
}
