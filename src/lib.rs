//! geneabin: decoder for GENEActiv-family accelerometer recordings
//!
//! Reads a recording's header (device identity, calibration, memory
//! layout), walks its data pages and unpacks the 12-bit tri-axial samples
//! into calibrated, timestamped readings.
//!
//! # Core Concepts
//!
//! - **Header**: device metadata and per-axis calibration, parsed once
//! - **Blocks**: pages of packed samples, each with its own start time
//! - **Samples**: `timestamp, x, y, z` in g, produced lazily in file order
//! - **Sinks**: consumers of samples, such as CSV files or in-memory tables
//!
//! # Example
//!
//! ```no_run
//! use geneabin::prelude::*;
//!
//! # fn example() -> geneabin::error::Result<()> {
//! let decoder = Decoder::open("demo.bin", &DecodeOptions::default())?;
//! println!("{} Hz", decoder.header().sampling_frequency);
//!
//! for sample in decoder.samples() {
//!     let sample = sample?;
//!     println!("{} {:.3} {:.3} {:.3}", sample.timestamp, sample.x, sample.y, sample.z);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod format;
pub mod output;

/// Top-level decode
pub mod decoder;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::{Config, DecodeOptions, OutputOptions, TimeFormat};
    pub use crate::core::*;
    pub use crate::decoder::{decode_parallel, Decoder};
    pub use crate::error::{Error, FormatError, Result};
    pub use crate::format::{DataBlock, RecordingHeader};
    pub use crate::output::{CsvFileSink, CsvSink, SampleSink};
}
