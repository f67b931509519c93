//! Weekly recurring time windows
//!
//! A [`TimeWindow`] is a day-of-week plus time-of-day interval, inclusive on
//! both endpoints, used to gate forwarding (`forwardtime`) and rejection
//! (`rejecttime`) per strategy group.
//!
//! Windows never wrap across midnight or the week boundary. A caller who
//! needs `SAT 22:00 → SUN 02:00` expresses it as two windows
//! (`SAT 22:00 23:59` and `SUN 00:00 02:00`); ambiguous inputs are not
//! silently reinterpreted.
//!
//! # Literal syntax
//!
//! `"<DAYS> HH:MM HH:MM"` where `<DAYS>` is a three-letter day name
//! (`MON`..`SUN`, case insensitive) or a digit range `N-M` with
//! `N,M ∈ 1..=7` (1 = Monday, 7 = Sunday).
//!
//! # Example
//!
//! ```
//! use rule_router::TimeWindow;
//!
//! let w = TimeWindow::parse("MON 09:00 17:00").unwrap();
//! assert_eq!(w.to_string(), "MON 09:00 17:00");
//!
//! let w = TimeWindow::parse("1-5 08:30 18:00").unwrap();
//! assert_eq!(w.to_string(), "1-5 08:30 18:00");
//! ```

use std::fmt;

use chrono::{Datelike, Timelike};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// Day names indexed by ISO weekday number (1 = Monday).
const DAY_NAMES: [&str; 8] = ["XXX", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// A weekly recurring day+time interval, inclusive on both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    /// First day the window applies to (1 = Monday, 7 = Sunday).
    from_day: u8,
    /// Last day the window applies to, `>= from_day`.
    to_day: u8,
    from_hour: u8,
    from_min: u8,
    to_hour: u8,
    to_min: u8,
}

impl TimeWindow {
    /// Parse a window from its literal form `"<DAYS> HH:MM HH:MM"`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedTimeWindow`] on any deviation: wrong
    /// field count, unknown day name, day out of `1..=7`, `from_day` after
    /// `to_day`, or hours/minutes out of range.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let malformed = || ConfigError::MalformedTimeWindow(s.to_string());

        let fields: Vec<&str> = s.split_whitespace().collect();
        let [days, from, to] = fields.as_slice() else {
            return Err(malformed());
        };

        let (from_day, to_day) = parse_days(days).ok_or_else(malformed)?;
        let (from_hour, from_min) = parse_clock(from).ok_or_else(malformed)?;
        let (to_hour, to_min) = parse_clock(to).ok_or_else(malformed)?;

        Ok(Self {
            from_day,
            to_day,
            from_hour,
            from_min,
            to_hour,
            to_min,
        })
    }

    /// Check whether an instant falls inside the window.
    ///
    /// `t` is any calendar value carrying date and time-of-day, typically
    /// `Local::now().naive_local()`. Weekdays map Monday=1 … Sunday=7.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use rule_router::TimeWindow;
    ///
    /// let w = TimeWindow::parse("MON 09:00 17:00").unwrap();
    /// // 2026-01-05 is a Monday.
    /// let noon = NaiveDate::from_ymd_opt(2026, 1, 5)
    ///     .unwrap()
    ///     .and_hms_opt(12, 0, 0)
    ///     .unwrap();
    /// assert!(w.contains(&noon));
    /// ```
    #[must_use]
    pub fn contains<T: Datelike + Timelike>(&self, t: &T) -> bool {
        let weekday = t.weekday().number_from_monday();
        if weekday < u32::from(self.from_day) || weekday > u32::from(self.to_day) {
            return false;
        }

        let (hour, min) = (t.hour(), t.minute());
        if hour < u32::from(self.from_hour) || hour > u32::from(self.to_hour) {
            return false;
        }
        if hour == u32::from(self.from_hour) && min < u32::from(self.from_min) {
            return false;
        }
        if hour == u32::from(self.to_hour) && min > u32::from(self.to_min) {
            return false;
        }

        true
    }
}

/// Parse the day field: a three-letter name maps to `(d, d)`, a digit range
/// `N-M` to `(N, M)` with `N <= M`.
fn parse_days(s: &str) -> Option<(u8, u8)> {
    let upper = s.to_ascii_uppercase();
    if let Some(d) = DAY_NAMES.iter().skip(1).position(|n| *n == upper) {
        let d = u8::try_from(d).ok()? + 1;
        return Some((d, d));
    }

    let (from, to) = s.split_once('-')?;
    if from.len() != 1 || to.len() != 1 {
        return None;
    }
    let from: u8 = from.parse().ok()?;
    let to: u8 = to.parse().ok()?;
    if !(1..=7).contains(&from) || !(1..=7).contains(&to) || from > to {
        return None;
    }
    Some((from, to))
}

/// Parse `HH:MM` with 1-2 digit components, hour in `0..=23`, minute in
/// `0..=59`.
fn parse_clock(s: &str) -> Option<(u8, u8)> {
    let (hour, min) = s.split_once(':')?;
    if hour.is_empty() || hour.len() > 2 || min.is_empty() || min.len() > 2 {
        return None;
    }
    let hour: u8 = hour.parse().ok()?;
    let min: u8 = min.parse().ok()?;
    if hour > 23 || min > 59 {
        return None;
    }
    Some((hour, min))
}

impl fmt::Display for TimeWindow {
    /// Canonical form: single-day windows render the day name, ranges render
    /// `N-M`; times are zero-padded. `parse(w.to_string()) == w` holds for
    /// every valid window.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from_day == self.to_day {
            write!(f, "{}", DAY_NAMES[usize::from(self.from_day)])?;
        } else {
            write!(f, "{}-{}", self.from_day, self.to_day)?;
        }
        write!(
            f,
            " {:02}:{:02} {:02}:{:02}",
            self.from_hour, self.from_min, self.to_hour, self.to_min
        )
    }
}

impl Serialize for TimeWindow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TimeWindow {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}
