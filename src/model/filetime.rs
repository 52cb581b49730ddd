//! Windows FILETIME timestamps: 100 ns ticks since 1601-01-01 UTC.

use chrono::{DateTime, TimeZone, Utc};

/// Seconds between 1601-01-01 and 1970-01-01.
pub const EPOCH_DELTA_SECS: i64 = 11_644_473_600;
/// FILETIME ticks per second.
pub const TICKS_PER_SEC: u64 = 10_000_000;

/// A stored FILETIME. Zero means the timestamp was never recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct Filetime(pub u64);

impl Filetime {
    pub fn is_set(self) -> bool {
        self.0 != 0
    }

    /// Whole seconds since the Unix epoch (negative before 1970).
    pub fn to_unix(self) -> i64 {
        (self.0 / TICKS_PER_SEC) as i64 - EPOCH_DELTA_SECS
    }

    pub fn from_unix(secs: i64) -> Self {
        let ticks = (secs + EPOCH_DELTA_SECS).max(0) as u64 * TICKS_PER_SEC;
        Self(ticks)
    }

    /// The timestamp as a UTC date, or `None` when unset or out of range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        if !self.is_set() {
            return None;
        }
        let nanos = (self.0 % TICKS_PER_SEC) as u32 * 100;
        Utc.timestamp_opt(self.to_unix(), nanos).single()
    }

    /// Low 32 bits, the part that varies between messages.
    pub fn low_word(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}
