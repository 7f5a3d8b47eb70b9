//! Working-day calendar arithmetic (C1).
//!
//! A task's dates are always expressed in terms of working days, not
//! calendar days: `addWorkDays`/`subWorkDays` step over non-working days,
//! and `workDaysBetween` counts only working days in a range. Exceptions
//! (named holidays or explicit working overrides) take precedence over the
//! weekday default.

use crate::error::CoreError;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Guard against calendars with no reachable working day (e.g. an empty
/// `workingDays` set combined with exceptions that never turn a day on).
const SCAN_LIMIT: u32 = 10_000;

/// An explicit override for a single date, taking precedence over the
/// weekday default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarException {
    pub working: bool,
    pub name: Option<String>,
}

/// Working-day calendar: a weekly pattern plus a sparse set of exceptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    working_days: BTreeSet<Weekday>,
    exceptions: BTreeMap<NaiveDate, CalendarException>,
}

impl Calendar {
    /// Builds a calendar, rejecting configurations where every weekday is
    /// off and no exception ever turns a day on (`ConfigError`).
    pub fn new(
        working_days: BTreeSet<Weekday>,
        exceptions: BTreeMap<NaiveDate, CalendarException>,
    ) -> Result<Self, CoreError> {
        let any_exception_working = exceptions.values().any(|e| e.working);
        if working_days.is_empty() && !any_exception_working {
            return Err(CoreError::Config(
                "calendar has no working days and no working exceptions".into(),
            ));
        }
        Ok(Self {
            working_days,
            exceptions,
        })
    }

    /// Standard Monday-Friday calendar with no exceptions.
    pub fn standard_five_day() -> Self {
        let working_days = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ]
        .into_iter()
        .collect();
        Self {
            working_days,
            exceptions: BTreeMap::new(),
        }
    }

    pub fn working_days(&self) -> &BTreeSet<Weekday> {
        &self.working_days
    }

    pub fn exceptions(&self) -> &BTreeMap<NaiveDate, CalendarException> {
        &self.exceptions
    }

    pub fn set_exception(&mut self, date: NaiveDate, exception: CalendarException) {
        self.exceptions.insert(date, exception);
    }

    pub fn clear_exception(&mut self, date: &NaiveDate) {
        self.exceptions.remove(date);
    }

    /// `d` is a working day iff an exception says so, else iff its weekday
    /// is in `workingDays`.
    pub fn is_working_day(&self, d: NaiveDate) -> bool {
        if let Some(exception) = self.exceptions.get(&d) {
            return exception.working;
        }
        self.working_days.contains(&d.weekday())
    }

    /// Rolls `d` forward to the next working day (returns `d` itself if it
    /// is already working).
    pub fn next_working_day(&self, d: NaiveDate) -> Result<NaiveDate, CoreError> {
        let mut cur = d;
        for _ in 0..SCAN_LIMIT {
            if self.is_working_day(cur) {
                return Ok(cur);
            }
            cur = cur
                .checked_add_days(Days::new(1))
                .ok_or_else(|| CoreError::Config("date overflow scanning calendar".into()))?;
        }
        Err(CoreError::CalendarExhausted { limit: SCAN_LIMIT })
    }

    /// Rolls `d` backward to the nearest working day (returns `d` itself if
    /// it is already working).
    pub fn prev_working_day(&self, d: NaiveDate) -> Result<NaiveDate, CoreError> {
        let mut cur = d;
        for _ in 0..SCAN_LIMIT {
            if self.is_working_day(cur) {
                return Ok(cur);
            }
            cur = cur
                .checked_sub_days(Days::new(1))
                .ok_or_else(|| CoreError::Config("date overflow scanning calendar".into()))?;
        }
        Err(CoreError::CalendarExhausted { limit: SCAN_LIMIT })
    }

    /// Advances `d` by `n` working days. `n = 0` rolls `d` forward to the
    /// next working day (if `d` itself is non-working); `n > 0` counts `n`
    /// working days forward from `d` (not counting `d` itself); `n < 0`
    /// counts `|n|` working days backward.
    pub fn add_work_days(&self, d: NaiveDate, n: i64) -> Result<NaiveDate, CoreError> {
        if n == 0 {
            return self.next_working_day(d);
        }
        let forward = n > 0;
        let mut remaining = n.unsigned_abs();
        let mut cur = d;
        let mut scanned = 0u32;
        while remaining > 0 {
            cur = if forward {
                cur.checked_add_days(Days::new(1))
            } else {
                cur.checked_sub_days(Days::new(1))
            }
            .ok_or_else(|| CoreError::Config("date overflow in calendar arithmetic".into()))?;
            scanned += 1;
            if scanned > SCAN_LIMIT {
                return Err(CoreError::CalendarExhausted { limit: SCAN_LIMIT });
            }
            if self.is_working_day(cur) {
                remaining -= 1;
            }
        }
        trace!(?d, n, result = ?cur, "add_work_days");
        Ok(cur)
    }

    /// `addWorkDays(d, -n)`.
    pub fn sub_work_days(&self, d: NaiveDate, n: i64) -> Result<NaiveDate, CoreError> {
        self.add_work_days(d, -n)
    }

    /// Number of working days in the half-open interval `[min(a,b), max(a,b))`,
    /// signed by whether `a <= b`.
    pub fn work_days_between(&self, a: NaiveDate, b: NaiveDate) -> i64 {
        let (lo, hi, sign) = if a <= b { (a, b, 1) } else { (b, a, -1) };
        let mut count = 0i64;
        let mut cur = lo;
        while cur < hi {
            if self.is_working_day(cur) {
                count += 1;
            }
            cur += chrono::Duration::days(1);
        }
        sign * count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rejects_empty_calendar() {
        let err = Calendar::new(BTreeSet::new(), BTreeMap::new());
        assert!(err.is_err());
    }

    #[test]
    fn five_day_week_treats_weekend_as_non_working() {
        let cal = Calendar::standard_five_day();
        assert!(cal.is_working_day(date(2024, 1, 1))); // Monday
        assert!(!cal.is_working_day(date(2024, 1, 6))); // Saturday
        assert!(!cal.is_working_day(date(2024, 1, 7))); // Sunday
    }

    #[test]
    fn exception_overrides_weekday_default() {
        let mut cal = Calendar::standard_five_day();
        cal.set_exception(
            date(2024, 1, 6),
            CalendarException {
                working: true,
                name: Some("makeup day".into()),
            },
        );
        assert!(cal.is_working_day(date(2024, 1, 6)));
    }

    #[test]
    fn five_day_task_starting_monday_ends_friday() {
        let cal = Calendar::standard_five_day();
        let start = date(2024, 1, 1);
        let end = cal.add_work_days(start, 5 - 1).unwrap();
        assert_eq!(end, date(2024, 1, 5));
    }

    #[test]
    fn holiday_exception_lengthens_task_by_one_calendar_day() {
        let mut cal = Calendar::standard_five_day();
        cal.set_exception(
            date(2024, 1, 3),
            CalendarException {
                working: false,
                name: Some("holiday".into()),
            },
        );
        let start = date(2024, 1, 1);
        let end = cal.add_work_days(start, 5 - 1).unwrap();
        assert_eq!(end, date(2024, 1, 8));
    }

    #[test]
    fn seven_day_week_is_calendar_day_arithmetic() {
        let working_days = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .collect();
        let cal = Calendar::new(working_days, BTreeMap::new()).unwrap();
        let start = date(2024, 1, 1);
        let end = cal.add_work_days(start, 6).unwrap();
        assert_eq!(end, date(2024, 1, 7));
    }

    #[test]
    fn add_then_subtract_returns_to_same_working_day() {
        let cal = Calendar::standard_five_day();
        let d = date(2024, 1, 3);
        let forward = cal.add_work_days(d, 10).unwrap();
        let back = cal.sub_work_days(forward, 10).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn work_days_between_is_signed() {
        let cal = Calendar::standard_five_day();
        let a = date(2024, 1, 1);
        let b = date(2024, 1, 8);
        assert_eq!(cal.work_days_between(a, b), 5);
        assert_eq!(cal.work_days_between(b, a), -5);
        assert_eq!(cal.work_days_between(a, a), 0);
    }

    #[test]
    fn zero_offset_rolls_non_working_day_forward() {
        let cal = Calendar::standard_five_day();
        let saturday = date(2024, 1, 6);
        assert_eq!(cal.add_work_days(saturday, 0).unwrap(), date(2024, 1, 8));
        let monday = date(2024, 1, 1);
        assert_eq!(cal.add_work_days(monday, 0).unwrap(), monday);
    }
}
