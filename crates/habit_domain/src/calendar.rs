use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Calendar day counted from 1970-01-01. Stored as a bare integer so that
/// day-boundary comparisons never depend on a timezone.
///
/// Parsed and deserialized values are limited to the dates chrono can
/// represent; arithmetic saturates instead of overflowing.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct EpochDay(pub i64);

impl EpochDay {
    pub const fn new(days: i64) -> Self {
        Self(days)
    }

    /// First day `NaiveDate` can represent.
    pub fn min_value() -> Self {
        Self::from(NaiveDate::MIN)
    }

    /// Last day `NaiveDate` can represent.
    pub fn max_value() -> Self {
        Self::from(NaiveDate::MAX)
    }

    pub fn today() -> Self {
        Self::from(Local::now().date_naive())
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    /// Sunday = 0 .. Saturday = 6. 1970-01-01 was a Thursday.
    pub fn weekday_index(self) -> usize {
        ((self.0.rem_euclid(7) + 4) % 7) as usize
    }

    pub fn to_naive_date(self) -> Option<NaiveDate> {
        let days = i32::try_from(self.0.checked_add(UNIX_EPOCH_FROM_CE)?).ok()?;
        NaiveDate::from_num_days_from_ce_opt(days)
    }

    /// Signed number of days from `self` to `other`.
    pub fn days_until(self, other: EpochDay) -> i64 {
        other.0.saturating_sub(self.0)
    }

    pub fn succ(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub fn pred(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Days `d` with `start < d < end`.
    pub fn days_strictly_between(start: EpochDay, end: EpochDay) -> DayRange {
        DayRange::new(start.succ(), end)
    }

    /// The `len` days ending at and including `self`, oldest first.
    pub fn window_ending(self, len: usize) -> DayRange {
        let len = i64::try_from(len).unwrap_or(i64::MAX);
        DayRange::new(Self(self.0.saturating_sub(len).saturating_add(1)), self.succ())
    }
}

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_FROM_CE: i64 = 719_163;

impl From<NaiveDate> for EpochDay {
    fn from(date: NaiveDate) -> Self {
        Self(date.num_days_from_ce() as i64 - UNIX_EPOCH_FROM_CE)
    }
}

impl TryFrom<i64> for EpochDay {
    type Error = ParseDayError;

    fn try_from(days: i64) -> Result<Self, Self::Error> {
        let day = Self(days);
        if day.to_naive_date().is_some() {
            Ok(day)
        } else {
            Err(ParseDayError::OutOfRange(days))
        }
    }
}

impl From<EpochDay> for i64 {
    fn from(day: EpochDay) -> Self {
        day.0
    }
}

impl Add<i64> for EpochDay {
    type Output = EpochDay;

    fn add(self, rhs: i64) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

impl Sub<i64> for EpochDay {
    type Output = EpochDay;

    fn sub(self, rhs: i64) -> Self::Output {
        Self(self.0.saturating_sub(rhs))
    }
}

impl fmt::Display for EpochDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive_date() {
            Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            None => write!(f, "day {}", self.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseDayError {
    #[error("`{0}` is neither an ISO date nor an epoch day")]
    Unrecognized(String),
    #[error("epoch day {0} is outside the supported calendar")]
    OutOfRange(i64),
}

impl FromStr for EpochDay {
    type Err = ParseDayError;

    /// Accepts `YYYY-MM-DD` or a raw epoch-day integer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self::from(date));
        }
        let days = trimmed
            .parse::<i64>()
            .map_err(|_| ParseDayError::Unrecognized(trimmed.to_string()))?;
        Self::try_from(days)
    }
}

/// Half-open range of days, iterated oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    next: EpochDay,
    end: EpochDay,
}

impl DayRange {
    pub fn new(start: EpochDay, end: EpochDay) -> Self {
        Self { next: start, end }
    }

    /// Next day the iterator yields.
    pub fn start(&self) -> EpochDay {
        self.next
    }

    pub fn is_empty(&self) -> bool {
        self.next >= self.end
    }
}

impl Iterator for DayRange {
    type Item = EpochDay;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let day = self.next;
        self.next = day.succ();
        Some(day)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.end.0.saturating_sub(self.next.0).max(0))
            .unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for DayRange {}
