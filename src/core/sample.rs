//! Sample types produced by the decoder

use crate::core::temporal::Timestamp;
use serde::{Deserialize, Serialize};

/// Unpacked integer reading, before calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawSample {
    /// 12-bit signed x reading
    pub x: i16,
    /// 12-bit signed y reading
    pub y: i16,
    /// 12-bit signed z reading
    pub z: i16,
    /// 10-bit unsigned light reading
    pub light: u16,
    /// Button pressed during this sample
    pub button: bool,
}

impl RawSample {
    /// Create a raw reading with only the accelerometer axes set
    pub fn axes(x: i16, y: i16, z: i16) -> Self {
        Self {
            x,
            y,
            z,
            ..Default::default()
        }
    }
}

/// Calibrated sample in physical units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Absolute time of the sample
    pub timestamp: Timestamp,
    /// Acceleration along x, in g
    pub x: f64,
    /// Acceleration along y, in g
    pub y: f64,
    /// Acceleration along z, in g
    pub z: f64,
    /// Light level, in lux when the recording carries light calibration
    pub light: f64,
    /// Button state
    pub button: bool,
    /// Device temperature reported for the page holding this sample
    pub temperature: Option<f64>,
}

impl Sample {
    /// Acceleration triple `(x, y, z)`
    pub fn xyz(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }
}

/// Totals reported once a decode completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DecodeSummary {
    /// Number of data blocks decoded
    pub blocks: u32,
    /// Number of samples handed to the sink
    pub samples: u64,
    /// Timestamp of the first sample
    pub first: Option<Timestamp>,
    /// Timestamp of the last sample
    pub last: Option<Timestamp>,
}

impl DecodeSummary {
    /// Account for one emitted sample
    pub fn record(&mut self, sample: &Sample) {
        if self.first.is_none() {
            self.first = Some(sample.timestamp);
        }
        self.last = Some(sample.timestamp);
        self.samples += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(millis: i64) -> Sample {
        Sample {
            timestamp: Timestamp::from_millis(millis),
            x: 0.0,
            y: 0.0,
            z: 1.0,
            light: 0.0,
            button: false,
            temperature: None,
        }
    }

    #[test]
    fn test_summary_tracks_bounds() {
        let mut summary = DecodeSummary::default();
        summary.record(&sample_at(10));
        summary.record(&sample_at(20));
        summary.record(&sample_at(30));

        assert_eq!(summary.samples, 3);
        assert_eq!(summary.first, Some(Timestamp::from_millis(10)));
        assert_eq!(summary.last, Some(Timestamp::from_millis(30)));
    }

    #[test]
    fn test_raw_axes() {
        let raw = RawSample::axes(1, -2, 3);
        assert_eq!(raw.light, 0);
        assert!(!raw.button);
        assert_eq!((raw.x, raw.y, raw.z), (1, -2, 3));
    }
}
