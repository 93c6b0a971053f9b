//! Time source for the consolidation stages.
//!
//! Every age, TTL and decay window is computed against a single injected
//! clock so that a stage sees one consistent "now" per run.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Convert a timestamp to the millisecond representation stored in SQLite.
pub fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Convert stored milliseconds back to a timestamp.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// A span of whole days. Negative or unrepresentable spans are rejected.
pub fn days(n: i64) -> Result<Duration> {
    span(n, Duration::try_days, "days")
}

pub fn hours(n: i64) -> Result<Duration> {
    span(n, Duration::try_hours, "hours")
}

pub fn minutes(n: i64) -> Result<Duration> {
    span(n, Duration::try_minutes, "minutes")
}

fn span(n: i64, make: fn(i64) -> Option<Duration>, unit: &str) -> Result<Duration> {
    if n < 0 {
        return Err(Error::validation(format!("{} must not be negative, got {}", unit, n)));
    }
    make(n).ok_or_else(|| Error::validation(format!("{} {} is out of range", n, unit)))
}

/// `now - by`, failing instead of overflowing the calendar.
pub fn earlier(now: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>> {
    now.checked_sub_signed(by)
        .ok_or_else(|| Error::validation(format!("{} before {} is out of range", by, now)))
}

/// `now + by`, failing instead of overflowing the calendar.
pub fn later(now: DateTime<Utc>, by: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(by)
        .ok_or_else(|| Error::validation(format!("{} after {} is out of range", by, now)))
}
