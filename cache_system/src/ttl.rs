//! Time-to-live handling
//!
//! Callers express a TTL as "use the adapter default", a plain seconds count,
//! or a calendar interval. Everything funnels through [`TtlNormalizer`],
//! which turns the input into whole seconds, never negative, with 0 meaning
//! "does not expire".

use chrono::{DateTime, Months, TimeDelta, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::CacheError;

/// TTL requested for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Use the adapter's configured default
    #[default]
    Default,
    /// Explicit number of seconds; negative values normalize to 0
    Seconds(i64),
    /// Calendar interval resolved against the Unix epoch
    Interval(Interval),
}

impl Ttl {
    pub fn seconds(seconds: i64) -> Self {
        Self::Seconds(seconds)
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Self::Seconds(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
    }
}

impl From<i64> for Ttl {
    fn from(seconds: i64) -> Self {
        Self::Seconds(seconds)
    }
}

impl From<Interval> for Ttl {
    fn from(interval: Interval) -> Self {
        Self::Interval(interval)
    }
}

impl From<Option<Duration>> for Ttl {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Self::Default, Self::from)
    }
}

/// Calendar interval, with variable-length units kept separate so that
/// "1 month" means a real calendar month rather than 30 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    pub years: u32,
    pub months: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    /// Interval points backwards in time
    pub negative: bool,
}

impl Interval {
    pub fn years(years: u32) -> Self {
        Self { years, ..Self::default() }
    }

    pub fn months(months: u32) -> Self {
        Self { months, ..Self::default() }
    }

    pub fn days(days: u32) -> Self {
        Self { days, ..Self::default() }
    }

    pub fn hours(hours: u32) -> Self {
        Self { hours, ..Self::default() }
    }

    pub fn minutes(minutes: u32) -> Self {
        Self { minutes, ..Self::default() }
    }

    pub fn seconds(seconds: u32) -> Self {
        Self { seconds, ..Self::default() }
    }

    pub fn negated(mut self) -> Self {
        self.negative = !self.negative;
        self
    }

    /// Parse an ISO-8601 duration such as `P1M`, `PT90S`, `P2W` or
    /// `-P1Y2M3DT4H5M6S`.
    pub fn parse(input: &str) -> Result<Self, CacheError> {
        let invalid = || CacheError::validation(format!("invalid interval: {:?}", input));

        let (negative, rest) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        let rest = rest.strip_prefix('P').ok_or_else(invalid)?;
        if rest.is_empty() {
            return Err(invalid());
        }

        let mut interval = Self { negative, ..Self::default() };
        let mut in_time = false;
        let mut digits = String::new();
        let mut seen_unit = false;
        let mut seen_time_unit = false;

        for c in rest.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            if c == 'T' {
                if in_time || !digits.is_empty() {
                    return Err(invalid());
                }
                in_time = true;
                continue;
            }

            let amount: u32 = digits.parse().map_err(|_| invalid())?;
            digits.clear();
            seen_unit = true;
            seen_time_unit |= in_time;

            match (in_time, c) {
                (false, 'Y') => interval.years = amount,
                (false, 'M') => interval.months = amount,
                (false, 'W') => {
                    interval.days = amount.checked_mul(7).ok_or_else(invalid)?;
                }
                (false, 'D') => interval.days = amount,
                (true, 'H') => interval.hours = amount,
                (true, 'M') => interval.minutes = amount,
                (true, 'S') => interval.seconds = amount,
                _ => return Err(invalid()),
            }
        }

        if !digits.is_empty() || !seen_unit || (in_time && !seen_time_unit) {
            return Err(invalid());
        }

        Ok(interval)
    }

    /// Seconds between the Unix epoch and the epoch shifted by this interval.
    /// Saturates when the shifted date leaves chrono's representable range.
    pub fn to_seconds_from_epoch(&self) -> i64 {
        let saturated = if self.negative { i64::MIN } else { i64::MAX };
        self.shift(DateTime::<Utc>::UNIX_EPOCH)
            .map_or(saturated, |moment| moment.timestamp())
    }

    fn shift(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let months = self.years.checked_mul(12)?.checked_add(self.months)?;
        let clock = i64::from(self.hours) * 3600 + i64::from(self.minutes) * 60 + i64::from(self.seconds);
        let days = TimeDelta::try_days(i64::from(self.days))?;
        let clock = TimeDelta::try_seconds(clock)?;

        if self.negative {
            start
                .checked_sub_months(Months::new(months))?
                .checked_sub_signed(days)?
                .checked_sub_signed(clock)
        } else {
            start
                .checked_add_months(Months::new(months))?
                .checked_add_signed(days)?
                .checked_add_signed(clock)
        }
    }
}

impl FromStr for Interval {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        f.write_str("P")?;
        for (amount, unit) in [(self.years, 'Y'), (self.months, 'M'), (self.days, 'D')] {
            if amount > 0 {
                write!(f, "{}{}", amount, unit)?;
            }
        }
        if self.hours > 0 || self.minutes > 0 || self.seconds > 0 {
            f.write_str("T")?;
            for (amount, unit) in [(self.hours, 'H'), (self.minutes, 'M'), (self.seconds, 'S')] {
                if amount > 0 {
                    write!(f, "{}{}", amount, unit)?;
                }
            }
        }
        if *self == Self::default() || *self == Self::default().negated() {
            f.write_str("T0S")?;
        }
        Ok(())
    }
}

/// Turns a requested [`Ttl`] into concrete seconds for one adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TtlNormalizer {
    default_ttl: u64,
}

impl TtlNormalizer {
    pub fn new(default_ttl: u64) -> Self {
        Self { default_ttl }
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    pub fn normalize(&self, ttl: &Ttl) -> u64 {
        let seconds = match ttl {
            Ttl::Default => return self.default_ttl,
            Ttl::Seconds(seconds) => *seconds,
            Ttl::Interval(interval) => interval.to_seconds_from_epoch(),
        };

        u64::try_from(seconds).unwrap_or(0)
    }
}
