//! Time handling for recordings
//!
//! Device clocks carry no zone information in page times, so a
//! [`Timestamp`] is the device's wall-clock reading expressed as
//! milliseconds since the Unix epoch, as if that wall clock were UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display format for timestamps: `2012-05-17 12:34:56.000`
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Timestamp representing a point in time with millisecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Milliseconds since Unix epoch
    millis: i64,
}

impl Timestamp {
    /// Create a timestamp from milliseconds since Unix epoch
    pub fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    /// Create a timestamp from seconds since Unix epoch
    pub fn from_secs(secs: i64) -> Self {
        Self {
            millis: secs * 1_000,
        }
    }

    /// Create a timestamp from a device wall-clock reading
    pub fn from_naive(dt: NaiveDateTime) -> Self {
        Self {
            millis: dt.and_utc().timestamp_millis(),
        }
    }

    /// Get milliseconds since Unix epoch
    pub fn as_millis(&self) -> i64 {
        self.millis
    }

    /// Get seconds since Unix epoch
    pub fn as_secs(&self) -> i64 {
        self.millis.div_euclid(1_000)
    }

    /// Get fractional seconds since Unix epoch
    pub fn as_secs_f64(&self) -> f64 {
        self.millis as f64 / 1_000.0
    }

    /// Convert to chrono DateTime
    pub fn to_datetime(&self) -> DateTime<Utc> {
        let nanos = (self.millis.rem_euclid(1_000) * 1_000_000) as u32;
        DateTime::from_timestamp(self.as_secs(), nanos).unwrap_or_default()
    }

    /// Add duration in milliseconds
    pub fn add_millis(&self, millis: i64) -> Self {
        Self {
            millis: self.millis + millis,
        }
    }

    /// Timestamp of the `index`-th sample after this one at `frequency` Hz.
    ///
    /// The offset is `index / frequency` seconds scaled to milliseconds and
    /// truncated. It is computed as `index * 1000 / frequency` so that exact
    /// millisecond offsets are not lost to decimal representation error.
    pub fn sample_offset(&self, index: usize, frequency: f64) -> Self {
        let offset = (index as f64 * 1_000.0 / frequency).trunc() as i64;
        self.add_millis(offset)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().format(DISPLAY_FORMAT))
    }
}
