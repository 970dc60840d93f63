//! Sample sinks: where decoded samples go

pub mod csv_sink;

pub use csv_sink::{CsvFileSink, CsvSink};

use crate::core::sample::Sample;
use crate::error::Result;

/// Consumer of decoded samples, fed in file order
pub trait SampleSink {
    /// Accept one sample
    fn write_sample(&mut self, sample: &Sample) -> Result<()>;

    /// Called once after the last sample of a successful decode
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory table
impl SampleSink for Vec<Sample> {
    fn write_sample(&mut self, sample: &Sample) -> Result<()> {
        self.push(*sample);
        Ok(())
    }
}
