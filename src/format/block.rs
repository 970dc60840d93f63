//! Data blocks (pages) and the forward-only block iterator

use crate::core::temporal::Timestamp;
use crate::error::{Error, FormatError, Result};
use crate::format::fields::{self, Line};
use crate::format::header::RecordingHeader;
use crate::format::read_line;
use crate::format::unpack::SAMPLE_BYTES;
use bytes::Bytes;
use std::io::BufRead;

/// Marker line opening every page
pub const PAGE_MARKER: &str = "Recorded Data";

/// Maximum samples one page can hold
pub const PAGE_CAPACITY: usize = 300;

/// Upper bound on sub-header lines between the marker and the payload
pub const MAX_SUBHEADER_LINES: usize = 16;

pub const FIELD_SEQUENCE: &str = "Sequence Number";
pub const FIELD_PAGE_TIME: &str = "Page Time";
pub const FIELD_TEMPERATURE: &str = "Temperature";
pub const FIELD_BATTERY: &str = "Battery voltage";
pub const FIELD_STATUS: &str = "Device Status";
pub const FIELD_PAGE_FREQUENCY: &str = "Measurement Frequency";

/// One page of packed samples with its sub-header
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    /// Position of the block in the file, from 0
    pub index: u32,
    /// Sequence number written by the device
    pub sequence: u32,
    /// Time of the first sample in the block
    pub start: Timestamp,
    /// Device temperature in degrees C
    pub temperature: Option<f64>,
    /// Battery voltage
    pub battery_voltage: Option<f64>,
    /// Frequency the page claims to be sampled at
    pub frequency: Option<f64>,
    /// Device status text
    pub status: Option<String>,
    /// Number of packed samples in `payload`
    pub sample_count: usize,
    /// Packed sample bytes
    pub payload: Bytes,
}

/// Iterator over the data blocks following a header.
///
/// Yields exactly `header.block_count` blocks. Running out of input first,
/// including a payload line cut off by the end of input, is a
/// [`FormatError::TruncatedFile`]. A block may not start before the last
/// sample of the block preceding it. The iterator is fused after the first
/// error.
pub struct BlockIterator<R> {
    reader: R,
    expected: u32,
    next_index: u32,
    /// Time of the last sample of the previous block
    previous_end: Option<Timestamp>,
    verify_sequence: bool,
    frequency: f64,
    line: String,
    failed: bool,
}

impl<R: BufRead> BlockIterator<R> {
    /// Create an iterator over a reader positioned just after the header
    pub fn new(reader: R, header: &RecordingHeader, verify_sequence: bool) -> Self {
        Self {
            reader,
            expected: header.block_count,
            next_index: 0,
            previous_end: None,
            verify_sequence,
            frequency: header.sampling_frequency,
            line: String::new(),
            failed: false,
        }
    }

    /// Number of blocks yielded so far
    pub fn decoded(&self) -> u32 {
        self.next_index
    }

    fn truncated(&self) -> Error {
        FormatError::TruncatedFile {
            expected: self.expected,
            decoded: self.next_index,
        }
        .into()
    }

    /// Read the next line, treating end of input as truncation
    fn next_line(&mut self) -> Result<()> {
        if read_line(&mut self.reader, &mut self.line)? {
            Ok(())
        } else {
            Err(self.truncated())
        }
    }

    fn read_block(&mut self) -> Result<DataBlock> {
        let index = self.next_index;

        loop {
            self.next_line()?;
            match fields::classify(&self.line) {
                Line::Blank => continue,
                Line::Title(PAGE_MARKER) => break,
                other => {
                    return Err(FormatError::corrupt_block(
                        index,
                        format!("expected '{PAGE_MARKER}', found {other:?}"),
                    )
                    .into())
                }
            }
        }

        let mut sub = SubHeader::default();
        let payload = loop {
            if sub.lines == MAX_SUBHEADER_LINES {
                return Err(FormatError::corrupt_block(index, "sub-header has no payload").into());
            }
            self.next_line()?;
            sub.lines += 1;
            let terminated = self.line.ends_with('\n');
            match fields::classify(&self.line) {
                Line::Blank => {}
                Line::Field(key, value) => sub.set(index, key, value)?,
                // Input ended inside the payload line
                Line::Title(_) if !terminated => return Err(self.truncated()),
                Line::Title(payload) => break decode_payload(index, payload)?,
            }
        };

        let sequence = sub
            .sequence
            .ok_or_else(|| FormatError::corrupt_block(index, "missing sequence number"))?;
        let start = sub
            .start
            .ok_or_else(|| FormatError::corrupt_block(index, "missing page time"))?;

        if self.verify_sequence && sequence != index {
            return Err(FormatError::corrupt_block(
                index,
                format!("sequence number {sequence} out of order"),
            )
            .into());
        }

        if let Some(previous) = self.previous_end {
            if start < previous {
                return Err(FormatError::OutOfOrderBlock {
                    block: index,
                    previous: previous.as_millis(),
                    current: start.as_millis(),
                }
                .into());
            }
        }

        if let Some(page_frequency) = sub.frequency {
            if (page_frequency - self.frequency).abs() > f64::EPSILON * self.frequency {
                tracing::warn!(
                    block = index,
                    page_frequency,
                    header_frequency = self.frequency,
                    "page frequency differs from header, using header frequency"
                );
            }
        }

        Ok(DataBlock {
            index,
            sequence,
            start,
            temperature: sub.temperature,
            battery_voltage: sub.battery_voltage,
            frequency: sub.frequency,
            status: sub.status,
            sample_count: payload.len() / SAMPLE_BYTES,
            payload,
        })
    }
}

impl<R: BufRead> Iterator for BlockIterator<R> {
    type Item = Result<DataBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.next_index >= self.expected {
            if self.reader.fill_buf().is_ok_and(|b| !b.is_empty()) {
                tracing::debug!(blocks = self.expected, "ignoring data after last declared block");
            }
            self.failed = true;
            return None;
        }

        match self.read_block() {
            Ok(block) => {
                tracing::debug!(
                    block = block.index,
                    samples = block.sample_count,
                    start = %block.start,
                    "read block"
                );
                let last = block.sample_count.saturating_sub(1);
                self.previous_end = Some(block.start.sample_offset(last, self.frequency));
                self.next_index += 1;
                Some(Ok(block))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Sub-header fields collected while scanning a page
#[derive(Default)]
struct SubHeader {
    lines: usize,
    sequence: Option<u32>,
    start: Option<Timestamp>,
    temperature: Option<f64>,
    battery_voltage: Option<f64>,
    frequency: Option<f64>,
    status: Option<String>,
}

impl SubHeader {
    fn set(&mut self, block: u32, key: &str, value: &str) -> Result<()> {
        let bad = |what: &str| FormatError::corrupt_block(block, format!("{what} {value:?}"));
        match key {
            FIELD_SEQUENCE => {
                let sequence = fields::parse_integer(value)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| bad("invalid sequence number"))?;
                self.sequence = Some(sequence);
            }
            FIELD_PAGE_TIME => {
                let time = fields::parse_device_time(value).ok_or_else(|| bad("invalid page time"))?;
                self.start = Some(Timestamp::from_naive(time));
            }
            FIELD_TEMPERATURE => self.temperature = fields::parse_decimal(value),
            FIELD_BATTERY => self.battery_voltage = fields::parse_decimal(value),
            FIELD_PAGE_FREQUENCY => self.frequency = fields::parse_frequency(value),
            FIELD_STATUS if !value.is_empty() => self.status = Some(value.to_string()),
            _ => {}
        }
        Ok(())
    }
}

/// Decode the hex payload line, checking it against the page layout
fn decode_payload(block: u32, text: &str) -> Result<Bytes> {
    if text.len() % (SAMPLE_BYTES * 2) != 0 {
        return Err(FormatError::corrupt_block(
            block,
            format!("payload length {} is not a whole number of samples", text.len()),
        )
        .into());
    }
    let count = text.len() / (SAMPLE_BYTES * 2);
    if count > PAGE_CAPACITY {
        return Err(FormatError::corrupt_block(
            block,
            format!("{count} samples exceed page capacity {PAGE_CAPACITY}"),
        )
        .into());
    }
    let bytes = hex::decode(text)
        .map_err(|e| FormatError::corrupt_block(block, format!("payload is not hex: {e}")))?;
    Ok(Bytes::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sample::RawSample;
    use crate::format::writer::{PageSpec, RecordingWriter};
    use std::io::Cursor;

    fn blocks_of(bytes: Vec<u8>, verify: bool) -> Vec<Result<DataBlock>> {
        let mut cursor = Cursor::new(bytes);
        let header = RecordingHeader::parse(&mut cursor).unwrap();
        BlockIterator::new(cursor, &header, verify).collect()
    }

    fn format_err(result: &Result<DataBlock>) -> &FormatError {
        match result {
            Err(Error::Format(e)) => e,
            other => panic!("expected format error, got {:?}", other),
        }
    }

    fn writer_with_pages(counts: &[usize]) -> RecordingWriter {
        let mut writer = RecordingWriter::new("012345", 100.0);
        for (i, &count) in counts.iter().enumerate() {
            writer.push_page(PageSpec::new(
                i as i64 * 3_000,
                vec![RawSample::axes(1, 2, 3); count],
            ));
        }
        writer
    }

    #[test]
    fn test_iterates_declared_blocks() {
        let blocks = blocks_of(writer_with_pages(&[300, 300, 17]).to_bytes(), true);
        assert_eq!(blocks.len(), 3);

        let blocks: Vec<DataBlock> = blocks.into_iter().map(|b| b.unwrap()).collect();
        assert_eq!(blocks[0].sample_count, 300);
        assert_eq!(blocks[2].sample_count, 17);
        assert_eq!(blocks[1].sequence, 1);
        assert_eq!(blocks[1].start.as_millis() - blocks[0].start.as_millis(), 3_000);
        assert_eq!(blocks[0].temperature, Some(21.5));
        assert_eq!(blocks[0].status.as_deref(), Some("Recording"));
    }

    #[test]
    fn test_truncated_after_header() {
        let mut writer = writer_with_pages(&[300, 300]);
        let header_len = writer.header_bytes().len();
        let bytes = writer.to_bytes()[..header_len].to_vec();

        let blocks = blocks_of(bytes, true);
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            format_err(&blocks[0]),
            &FormatError::TruncatedFile {
                expected: 2,
                decoded: 0,
            }
        );

        writer.declare_pages(5);
        let blocks = blocks_of(writer.to_bytes(), true);
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            format_err(&blocks[2]),
            &FormatError::TruncatedFile {
                expected: 5,
                decoded: 2,
            }
        );
    }

    #[test]
    fn test_truncated_inside_payload() {
        let bytes = writer_with_pages(&[300]).to_bytes();
        let cut = bytes.len() - 10;
        let blocks = blocks_of(bytes[..cut].to_vec(), true);
        assert_eq!(
            format_err(&blocks[0]),
            &FormatError::TruncatedFile {
                expected: 1,
                decoded: 0,
            }
        );
    }

    #[test]
    fn test_truncated_on_sample_boundary() {
        let bytes = writer_with_pages(&[300, 300]).to_bytes();
        // Drop the final CRLF and the last 50 samples, 12 hex digits each
        let cut = bytes.len() - 2 - 50 * SAMPLE_BYTES * 2;
        let blocks = blocks_of(bytes[..cut].to_vec(), true);

        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].is_ok());
        assert_eq!(
            format_err(&blocks[1]),
            &FormatError::TruncatedFile {
                expected: 2,
                decoded: 1,
            }
        );
    }

    #[test]
    fn test_partial_sample_in_payload_is_corrupt() {
        let mut bytes = writer_with_pages(&[3]).to_bytes();
        // Remove two hex digits, keep the line terminator
        let end = bytes.len() - 2;
        bytes.drain(end - 2..end);
        let blocks = blocks_of(bytes, true);
        assert!(matches!(
            format_err(&blocks[0]),
            FormatError::CorruptBlockHeader { block: 0, reason } if reason.contains("whole number")
        ));
    }

    #[test]
    fn test_short_page_before_last() {
        let mut writer = RecordingWriter::new("012345", 100.0);
        writer.push_page(PageSpec::new(0, vec![RawSample::default(); 2]));
        writer.push_page(PageSpec::new(20, vec![RawSample::default(); 300]));
        let blocks: Vec<DataBlock> = blocks_of(writer.to_bytes(), true)
            .into_iter()
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(blocks[0].sample_count, 2);
        assert_eq!(blocks[1].sample_count, 300);
    }

    #[test]
    fn test_over_capacity_is_corrupt() {
        let blocks = blocks_of(writer_with_pages(&[301]).to_bytes(), true);
        assert!(matches!(
            format_err(&blocks[0]),
            FormatError::CorruptBlockHeader { block: 0, reason } if reason.contains("capacity")
        ));
    }

    #[test]
    fn test_missing_marker_is_corrupt() {
        let text = String::from_utf8(writer_with_pages(&[3]).to_bytes()).unwrap();
        let text = text.replace(PAGE_MARKER, "Recorded Dada");
        let blocks = blocks_of(text.into_bytes(), true);
        assert!(matches!(
            format_err(&blocks[0]),
            FormatError::CorruptBlockHeader { block: 0, .. }
        ));
    }

    #[test]
    fn test_sequence_verification() {
        let mut writer = writer_with_pages(&[3]);
        writer.push_page(PageSpec::new(3_000, vec![RawSample::default(); 3]).with_sequence(7));
        let bytes = writer.to_bytes();

        let blocks = blocks_of(bytes.clone(), true);
        assert!(blocks[0].is_ok());
        assert!(matches!(
            format_err(&blocks[1]),
            FormatError::CorruptBlockHeader { block: 1, .. }
        ));

        let blocks = blocks_of(bytes, false);
        assert_eq!(blocks[1].as_ref().unwrap().sequence, 7);
    }

    #[test]
    fn test_out_of_order_block() {
        let mut writer = RecordingWriter::new("012345", 100.0);
        writer.push_page(PageSpec::new(6_000, vec![RawSample::default(); 3]));
        writer.push_page(PageSpec::new(3_000, vec![RawSample::default(); 3]));
        let blocks = blocks_of(writer.to_bytes(), true);
        assert!(matches!(
            format_err(&blocks[1]),
            FormatError::OutOfOrderBlock { block: 1, .. }
        ));
    }

    #[test]
    fn test_overlapping_pages() {
        let mut writer =
            RecordingWriter::new("012345", 100.0).with_start(Timestamp::from_millis(0));
        writer.push_page(PageSpec::new(0, vec![RawSample::default(); 300]));
        writer.push_page(PageSpec::new(1_000, vec![RawSample::default(); 300]));
        let blocks = blocks_of(writer.to_bytes(), true);

        assert!(blocks[0].is_ok());
        assert_eq!(
            format_err(&blocks[1]),
            &FormatError::OutOfOrderBlock {
                block: 1,
                previous: 2_990,
                current: 1_000,
            }
        );
    }

    #[test]
    fn test_page_may_start_at_previous_last_sample() {
        let mut writer = RecordingWriter::new("012345", 100.0);
        writer.push_page(PageSpec::new(0, vec![RawSample::default(); 3]));
        writer.push_page(PageSpec::new(20, vec![RawSample::default(); 3]));
        let blocks = blocks_of(writer.to_bytes(), true);
        assert!(blocks.iter().all(|b| b.is_ok()));
    }

    #[test]
    fn test_fused_after_error() {
        let mut cursor = Cursor::new(writer_with_pages(&[301, 3]).to_bytes());
        let header = RecordingHeader::parse(&mut cursor).unwrap();
        let mut blocks = BlockIterator::new(cursor, &header, true);
        assert!(blocks.next().unwrap().is_err());
        assert!(blocks.next().is_none());
        assert_eq!(blocks.decoded(), 0);
    }

    #[test]
    fn test_trailing_data_is_ignored() {
        let mut bytes = writer_with_pages(&[3]).to_bytes();
        bytes.extend_from_slice(b"\r\nleftover bytes\r\n");
        let blocks = blocks_of(bytes, true);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_ok());
    }
}
