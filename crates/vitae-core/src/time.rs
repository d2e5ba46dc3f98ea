//! Time primitives for the interview core
//!
//! Interview answers carry time in whatever shape the question produced:
//! a bare year, a date string, or a full instant. Everything is normalized
//! into [`TimePoint`], a millisecond instant, before it reaches the store.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A point on the life timeline, milliseconds since the Unix epoch.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimePoint(pub i64);

/// Numbers at or below this are read as calendar years, not epoch millis.
const MAX_BARE_YEAR: i64 = 9999;

impl TimePoint {
    pub const ZERO: TimePoint = TimePoint(0);

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        TimePoint(millis)
    }

    #[inline]
    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// January 1st (UTC) of the given year, or `None` outside chrono's range
    pub fn from_year(year: i32) -> Option<Self> {
        Self::from_ymd(year, 1, 1)
    }

    /// Midnight UTC of the given calendar date
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let dt = date.and_hms_opt(0, 0, 0)?;
        Some(TimePoint(dt.and_utc().timestamp_millis()))
    }

    /// Normalize an answer payload into a time point.
    ///
    /// Accepted shapes:
    /// - number: a bare year up to 9999, otherwise epoch milliseconds
    /// - string: a bare year, `YYYY-MM-DD`, or RFC 3339
    ///
    /// Anything else is unparseable and yields `None`; callers drop the
    /// field rather than fail the operation.
    pub fn normalize(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                let raw = n.as_i64()?;
                if (1..=MAX_BARE_YEAR).contains(&raw) {
                    Self::from_year(raw as i32)
                } else {
                    Some(TimePoint(raw))
                }
            }
            Value::String(s) => Self::parse_str(s.trim()),
            _ => None,
        }
    }

    fn parse_str(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        if s.len() <= 4 && s.bytes().all(|b| b.is_ascii_digit()) {
            return Self::from_year(s.parse().ok()?);
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            let dt = date.and_hms_opt(0, 0, 0)?;
            return Some(TimePoint(dt.and_utc().timestamp_millis()));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(TimePoint(dt.timestamp_millis()));
        }
        None
    }

    /// Calendar-correct year shift. A Feb 29 source clamps to Feb 28 when
    /// the target year is not a leap year.
    pub fn plus_years(self, years: i32) -> TimePoint {
        let Some(dt) = Utc.timestamp_millis_opt(self.0).single() else {
            // Out of chrono's range; fall back to a flat 365-day shift.
            let shift = 365 * 24 * 3600 * 1000 * years as i64;
            return TimePoint(self.0.saturating_add(shift));
        };
        let year = dt.year() + years;
        let date = NaiveDate::from_ymd_opt(year, dt.month(), dt.day())
            .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28));
        match date.and_then(|d| d.and_hms_opt(dt.hour(), dt.minute(), dt.second())) {
            Some(shifted) => TimePoint(shifted.and_utc().timestamp_millis()),
            None => self,
        }
    }

    /// Calendar year of this point (UTC)
    pub fn year(self) -> i32 {
        Utc.timestamp_millis_opt(self.0)
            .single()
            .map(|dt| dt.year())
            .unwrap_or(0)
    }

    /// The midpoint between two points
    pub fn midpoint(self, other: TimePoint) -> TimePoint {
        TimePoint(self.0 / 2 + other.0 / 2)
    }
}

impl Add<Duration> for TimePoint {
    type Output = TimePoint;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        TimePoint(self.0 + rhs.as_millis() as i64)
    }
}

impl Sub<Duration> for TimePoint {
    type Output = TimePoint;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        TimePoint(self.0 - rhs.as_millis() as i64)
    }
}

impl fmt::Debug for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Utc.timestamp_millis_opt(self.0).single() {
            Some(dt) => write!(f, "Time({})", dt.format("%Y-%m-%d")),
            None => write!(f, "Time({}ms)", self.0),
        }
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Utc.timestamp_millis_opt(self.0).single() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_bare_year_number() {
        let tp = TimePoint::normalize(&json!(1984)).unwrap();
        assert_eq!(tp, TimePoint::from_year(1984).unwrap());
        assert_eq!(tp.year(), 1984);
    }

    #[test]
    fn test_normalize_bare_year_string() {
        let tp = TimePoint::normalize(&json!("2001")).unwrap();
        assert_eq!(tp.year(), 2001);
    }

    #[test]
    fn test_normalize_date_string() {
        let tp = TimePoint::normalize(&json!("1999-06-15")).unwrap();
        assert_eq!(tp, TimePoint::from_ymd(1999, 6, 15).unwrap());
    }

    #[test]
    fn test_normalize_epoch_millis() {
        let tp = TimePoint::normalize(&json!(1_000_000_000_000i64)).unwrap();
        assert_eq!(tp.as_millis(), 1_000_000_000_000);
    }

    #[test]
    fn test_normalize_garbage_is_none() {
        assert!(TimePoint::normalize(&json!("not a date")).is_none());
        assert!(TimePoint::normalize(&json!(null)).is_none());
        assert!(TimePoint::normalize(&json!({"y": 1990})).is_none());
        assert!(TimePoint::normalize(&json!("")).is_none());
    }

    #[test]
    fn test_plus_years() {
        let tp = TimePoint::from_year(2000).unwrap();
        assert_eq!(tp.plus_years(1).year(), 2001);
        assert_eq!(tp.plus_years(10).year(), 2010);
    }

    #[test]
    fn test_plus_years_leap_day_clamps() {
        let leap = TimePoint::from_ymd(2004, 2, 29).unwrap();
        let shifted = leap.plus_years(1);
        assert_eq!(shifted, TimePoint::from_ymd(2005, 2, 28).unwrap());
    }

    #[test]
    fn test_ordering() {
        let a = TimePoint::from_year(1990).unwrap();
        let b = TimePoint::from_year(1991).unwrap();
        assert!(a < b);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_bare_year_roundtrips(year in 1i32..=9999) {
                let tp = TimePoint::normalize(&json!(year)).unwrap();
                prop_assert_eq!(tp.year(), year);
            }

            #[test]
            fn prop_plus_one_year_moves_forward(year in 1800i32..2100, month in 1u32..=12, day in 1u32..=28) {
                let tp = TimePoint::from_ymd(year, month, day).unwrap();
                let shifted = tp.plus_years(1);
                prop_assert!(shifted > tp);
                prop_assert_eq!(shifted.year(), year + 1);
            }
        }
    }
}
