//! Simulated elapsed time as a floating-point number of seconds.
//!
//! [`TimeValue`] is the unit every clock period, countdown and global
//! timestamp is expressed in. It is deliberately a plain `f64` wrapper: clock
//! periods such as 7.5 ns are not representable in any fixed binary fraction,
//! so the clock layer compares countdowns against a precision window instead
//! of exact zero rather than pretending the arithmetic is exact.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::frequency::Frequency;

/// Seconds per minute.
pub const SECONDS_PER_MINUTE: f64 = 60.0;
/// Milliseconds per second.
pub const MS_PER_S: f64 = 1e3;
/// Microseconds per second.
pub const US_PER_S: f64 = 1e6;
/// Nanoseconds per second.
pub const NS_PER_S: f64 = 1e9;
/// Picoseconds per second.
pub const PS_PER_S: f64 = 1e12;
/// Femtoseconds per second.
pub const FS_PER_S: f64 = 1e15;
/// Attoseconds per second.
pub const AS_PER_S: f64 = 1e18;

/// An amount of simulated time, stored in seconds.
///
/// Values are non-negative during normal operation. Arithmetic is plain
/// floating-point arithmetic and is not guarded against overflow; adding to
/// [`TimeValue::MAX`] is the caller's problem.
#[derive(Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct TimeValue(f64);

impl TimeValue {
    /// Zero elapsed time.
    pub const ZERO: TimeValue = TimeValue(0.0);

    /// The largest representable time, used as the identity for minimum scans.
    pub const MAX: TimeValue = TimeValue(f64::MAX);

    /// Creates a time value from seconds.
    pub const fn from_seconds(s: f64) -> Self {
        Self(s)
    }

    /// Creates a time value from minutes.
    pub fn from_minutes(min: f64) -> Self {
        Self(min * SECONDS_PER_MINUTE)
    }

    /// Creates a time value from milliseconds.
    pub fn from_millis(ms: f64) -> Self {
        Self(ms / MS_PER_S)
    }

    /// Creates a time value from microseconds.
    pub fn from_micros(us: f64) -> Self {
        Self(us / US_PER_S)
    }

    /// Creates a time value from nanoseconds.
    pub fn from_nanos(ns: f64) -> Self {
        Self(ns / NS_PER_S)
    }

    /// Creates a time value from picoseconds.
    pub fn from_picos(ps: f64) -> Self {
        Self(ps / PS_PER_S)
    }

    /// Creates a time value from femtoseconds.
    pub fn from_femtos(fs: f64) -> Self {
        Self(fs / FS_PER_S)
    }

    /// Creates a time value from attoseconds.
    pub fn from_attos(att: f64) -> Self {
        Self(att / AS_PER_S)
    }

    /// Returns the time in minutes.
    pub fn minutes(self) -> f64 {
        self.0 / SECONDS_PER_MINUTE
    }

    /// Returns the time in seconds.
    pub const fn seconds(self) -> f64 {
        self.0
    }

    /// Returns the time in milliseconds.
    pub fn milliseconds(self) -> f64 {
        self.0 * MS_PER_S
    }

    /// Returns the time in microseconds.
    pub fn microseconds(self) -> f64 {
        self.0 * US_PER_S
    }

    /// Returns the time in nanoseconds.
    pub fn nanoseconds(self) -> f64 {
        self.0 * NS_PER_S
    }

    /// Returns the time in picoseconds.
    pub fn picoseconds(self) -> f64 {
        self.0 * PS_PER_S
    }

    /// Returns the time in femtoseconds.
    pub fn femtoseconds(self) -> f64 {
        self.0 * FS_PER_S
    }

    /// Returns the time in attoseconds.
    pub fn attoseconds(self) -> f64 {
        self.0 * AS_PER_S
    }

    /// Returns the frequency whose period is this duration.
    ///
    /// A zero duration yields an infinite frequency; callers must not ask a
    /// zero duration for its frequency.
    pub fn frequency(self) -> Frequency {
        Frequency::new(1.0 / self.0)
    }

    /// Converts to an integer count of `precision` units, rounding to nearest.
    ///
    /// This is how accumulated simulation time becomes a trace timestamp.
    /// Negative or NaN values saturate to zero.
    pub fn to_units(self, precision: TimeValue) -> u64 {
        (self.0 / precision.0).round() as u64
    }

    /// Returns `true` if this is exactly zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }

    /// Returns `true` if the value is finite and strictly positive.
    pub fn is_positive(self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }

    /// Returns the smaller of two time values.
    pub fn min(self, other: Self) -> Self {
        if other < self {
            other
        } else {
            self
        }
    }

    /// Returns the larger of two time values.
    pub fn max(self, other: Self) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }

    /// Returns `true` if the two values differ by less than `tolerance`.
    pub fn approx_eq(self, other: Self, tolerance: Self) -> bool {
        (self.0 - other.0).abs() < tolerance.0
    }
}

impl Add for TimeValue {
    type Output = TimeValue;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for TimeValue {
    type Output = TimeValue;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for TimeValue {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for TimeValue {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul<f64> for TimeValue {
    type Output = TimeValue;

    fn mul(self, rhs: f64) -> Self {
        Self(self.0 * rhs)
    }
}

impl Div<f64> for TimeValue {
    type Output = TimeValue;

    fn div(self, rhs: f64) -> Self {
        Self(self.0 / rhs)
    }
}

impl Sum for TimeValue {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// Display units from largest to smallest, as (suffix, units per second).
const DISPLAY_UNITS: [(&str, f64); 7] = [
    ("s", 1.0),
    ("ms", MS_PER_S),
    ("us", US_PER_S),
    ("ns", NS_PER_S),
    ("ps", PS_PER_S),
    ("fs", FS_PER_S),
    ("as", AS_PER_S),
];

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        if s == 0.0 {
            return write!(f, "0 s");
        }
        if !s.is_finite() || s == f64::MAX {
            return write!(f, "{s} s");
        }
        let (suffix, scale) = DISPLAY_UNITS
            .iter()
            .copied()
            .find(|&(_, scale)| (s * scale).abs() >= 1.0)
            .unwrap_or(DISPLAY_UNITS[DISPLAY_UNITS.len() - 1]);
        // Six decimals hide the binary representation error of the scaling.
        let scaled = (s * scale * 1e6).round() / 1e6;
        write!(f, "{scaled} {suffix}")
    }
}

impl fmt::Debug for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeValue({self})")
    }
}

/// Error type for parsing time strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time value: '{input}'")]
pub struct ParseTimeError {
    /// The input string that failed to parse.
    pub input: String,
}

/// Parse suffixes, ordered so that no suffix shadows a longer one ending in it.
const PARSE_UNITS: [(&str, f64); 9] = [
    ("min", 1.0 / SECONDS_PER_MINUTE),
    ("ms", MS_PER_S),
    ("us", US_PER_S),
    ("µs", US_PER_S),
    ("ns", NS_PER_S),
    ("ps", PS_PER_S),
    ("fs", FS_PER_S),
    ("as", AS_PER_S),
    ("s", 1.0),
];

impl FromStr for TimeValue {
    type Err = ParseTimeError;

    /// Parses strings like `"10ns"`, `"7.5 ns"`, `"1us"` or a bare number of seconds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseTimeError {
            input: s.to_string(),
        };
        let lower = s.to_ascii_lowercase();

        for (suffix, per_second) in PARSE_UNITS {
            if let Some(num) = lower.strip_suffix(suffix) {
                let val: f64 = num.trim().parse().map_err(|_| err())?;
                if !val.is_finite() || val < 0.0 {
                    return Err(err());
                }
                return Ok(TimeValue(val / per_second));
            }
        }

        let val: f64 = s.parse().map_err(|_| err())?;
        if !val.is_finite() || val < 0.0 {
            return Err(err());
        }
        Ok(TimeValue(val))
    }
}

impl Serialize for TimeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for TimeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimeVisitor;

        impl Visitor<'_> for TimeVisitor {
            type Value = TimeValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a time string like \"10ns\" or a number of seconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TimeValue, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<TimeValue, E> {
                Ok(TimeValue(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<TimeValue, E> {
                Ok(TimeValue(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<TimeValue, E> {
                Ok(TimeValue(v as f64))
            }
        }

        deserializer.deserialize_any(TimeVisitor)
    }
}
