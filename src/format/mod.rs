//! Recording file format: header, data blocks and packed samples

pub mod block;
pub mod fields;
pub mod header;
pub mod unpack;
pub mod writer;

pub use block::{BlockIterator, DataBlock, PAGE_CAPACITY};
pub use header::{AxisCalibration, Calibration, LightCalibration, RecordingHeader};
pub use unpack::{pack_raw, unpack_block, unpack_raw};
pub use writer::{PageSpec, RecordingWriter};

use std::io::BufRead;

/// Read one line into `line`, replacing invalid UTF-8. Returns `false` at
/// end of input.
pub(crate) fn read_line<R: BufRead>(reader: &mut R, line: &mut String) -> std::io::Result<bool> {
    let mut buf = Vec::new();
    line.clear();
    if reader.read_until(b'\n', &mut buf)? == 0 {
        return Ok(false);
    }
    line.push_str(&String::from_utf8_lossy(&buf));
    Ok(true)
}
