// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Recurrence rules and the next start/recover times derived from them.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::{str::FromStr, time::Duration};

const EVERY_PREFIX: &str = "@every ";

#[derive(Clone, Debug)]
pub enum Recurrence {
    Cron(Box<cron::Schedule>),
    Every(Duration),
}

impl Recurrence {
    /// Accepts five field cron (minute precision), six field cron (with
    /// seconds) and `@every <duration>`.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        let invalid = |reason: String| Error::Cron(expression.to_string(), reason);

        if let Some(every) = expression.strip_prefix(EVERY_PREFIX) {
            let interval =
                humantime::parse_duration(every.trim()).map_err(|e| invalid(e.to_string()))?;
            if interval.is_zero() {
                return Err(invalid("interval must be positive".to_string()));
            }
            return Ok(Recurrence::Every(interval));
        }

        let normalized = match expression.split_whitespace().count() {
            5 => format!("0 {}", expression),
            6 => expression.to_string(),
            fields => return Err(invalid(format!("expected 5 or 6 fields, found {}", fields))),
        };
        cron::Schedule::from_str(&normalized)
            .map(|schedule| Recurrence::Cron(Box::new(schedule)))
            .map_err(|e| invalid(e.to_string()))
    }

    /// The first occurrence strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Recurrence::Cron(schedule) => schedule.after(&after).next(),
            Recurrence::Every(interval) => chrono::Duration::from_std(*interval)
                .ok()
                .and_then(|interval| after.checked_add_signed(interval)),
        }
    }
}

/// Scheduling times for an injection starting at `now`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NextTimes {
    pub next_start: Option<DateTime<Utc>>,
    pub next_recover: Option<DateTime<Utc>>,
}

impl NextTimes {
    /// `next_recover` is `now + duration`, `next_start` the next occurrence
    /// of the recurrence. A recurrence firing before the injection would
    /// be recovered is rejected.
    pub fn compute(
        now: DateTime<Utc>,
        duration: Option<Duration>,
        recurrence: Option<&Recurrence>,
    ) -> Result<Self> {
        let next_recover = duration
            .and_then(|duration| chrono::Duration::from_std(duration).ok())
            .and_then(|duration| now.checked_add_signed(duration));
        let next_start = recurrence.and_then(|recurrence| recurrence.next_after(now));

        if let (Some(start), Some(recover)) = (next_start, next_recover) {
            if recover > start {
                return Err(Error::ScheduleConflict);
            }
        }
        Ok(Self {
            next_start,
            next_recover,
        })
    }

    /// The earlier of the two times, if any is set.
    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        match (self.next_start, self.next_recover) {
            (Some(start), Some(recover)) => Some(start.min(recover)),
            (start, recover) => start.or(recover),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use claims::{assert_err, assert_matches, assert_ok, assert_some_eq};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_five_and_six_field_cron() {
        let five = assert_ok!(Recurrence::parse("*/15 * * * *"));
        assert_some_eq!(five.next_after(at(10, 7, 30)), at(10, 15, 0));

        let six = assert_ok!(Recurrence::parse("30 * * * * *"));
        assert_some_eq!(six.next_after(at(10, 7, 0)), at(10, 7, 30));

        assert_err!(Recurrence::parse("* * *"));
        assert_err!(Recurrence::parse("61 * * * *"));
    }

    #[test]
    fn test_every() {
        let every = assert_ok!(Recurrence::parse("@every 90s"));
        assert_some_eq!(every.next_after(at(10, 0, 0)), at(10, 1, 30));
        assert_err!(Recurrence::parse("@every soon"));
        assert_err!(Recurrence::parse("@every 0s"));
    }

    #[test]
    fn test_next_times() {
        let hourly = Recurrence::parse("0 * * * *").unwrap();
        let times = assert_ok!(NextTimes::compute(
            at(10, 0, 0),
            Some(Duration::from_secs(600)),
            Some(&hourly)
        ));
        assert_some_eq!(times.next_recover, at(10, 10, 0));
        assert_some_eq!(times.next_start, at(11, 0, 0));
        assert_some_eq!(times.earliest(), at(10, 10, 0));

        let times = assert_ok!(NextTimes::compute(at(10, 0, 0), None, None));
        assert_eq!(times.earliest(), None);

        assert_matches!(
            NextTimes::compute(at(10, 0, 0), Some(Duration::from_secs(7200)), Some(&hourly)),
            Err(Error::ScheduleConflict)
        );
    }
}
