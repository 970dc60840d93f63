//! Sample unpacking: bit-level field extraction and calibration
//!
//! Each packed sample occupies 48 bits, most significant bit first:
//!
//! | bits | field |
//! |------|-------|
//! | 12   | x, two's complement |
//! | 12   | y, two's complement |
//! | 12   | z, two's complement |
//! | 10   | light, unsigned |
//! | 1    | button |
//! | 1    | reserved |

use crate::core::sample::{RawSample, Sample};
use crate::format::block::DataBlock;
use crate::format::header::RecordingHeader;

/// Width of one axis field
pub const AXIS_BITS: u32 = 12;

/// Width of the light field
pub const LIGHT_BITS: u32 = 10;

/// Bytes per packed sample
pub const SAMPLE_BYTES: usize = 6;

/// Sign-extend the low `bits` bits of `value` to a full `i64`
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    debug_assert!(bits > 0 && bits <= 64);
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// MSB-first reader of arbitrary-width fields over a byte slice
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Bit position from the start of `data`
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Bits left to read
    pub fn remaining(&self) -> usize {
        self.data.len() * 8 - self.position
    }

    /// Read an unsigned field of `bits` (at most 64) bits
    pub fn read_unsigned(&mut self, bits: u32) -> Option<u64> {
        if bits > 64 || bits as usize > self.remaining() {
            return None;
        }
        let mut value = 0u64;
        let mut needed = bits;
        while needed > 0 {
            let byte = self.data[self.position / 8];
            let bit_in_byte = (self.position % 8) as u32;
            let available = 8 - bit_in_byte;
            let take = available.min(needed);
            let chunk = (byte >> (available - take)) & (((1u16 << take) - 1) as u8);
            value = (value << take) | chunk as u64;
            self.position += take as usize;
            needed -= take;
        }
        Some(value)
    }

    /// Read a two's-complement field of `bits` bits
    pub fn read_signed(&mut self, bits: u32) -> Option<i64> {
        self.read_unsigned(bits).map(|v| sign_extend(v, bits))
    }
}

/// MSB-first writer, the inverse of [`BitReader`]
pub struct BitWriter {
    data: Vec<u8>,
    /// Bits used in the last byte of `data`, 0 when byte aligned
    used: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            used: 0,
        }
    }

    /// Append the low `bits` bits of `value`
    pub fn write(&mut self, value: u64, bits: u32) {
        let mut remaining = bits;
        while remaining > 0 {
            if self.used == 0 {
                self.data.push(0);
            }
            let free = 8 - self.used;
            let take = free.min(remaining);
            let chunk = ((value >> (remaining - take)) & ((1u64 << take) - 1)) as u8;
            if let Some(last) = self.data.last_mut() {
                *last |= chunk << (free - take);
            }
            self.used = (self.used + take) % 8;
            remaining -= take;
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Unpack every complete sample in `payload`
pub fn unpack_raw(payload: &[u8]) -> Vec<RawSample> {
    let mut reader = BitReader::new(payload);
    let mut samples = Vec::with_capacity(payload.len() / SAMPLE_BYTES);
    while reader.remaining() >= SAMPLE_BYTES * 8 {
        samples.push(read_sample(&mut reader));
    }
    samples
}

fn read_sample(reader: &mut BitReader<'_>) -> RawSample {
    // Callers check that a whole sample remains, so no field can run short.
    let mut signed = |bits| reader.read_signed(bits).unwrap_or_default() as i16;
    let x = signed(AXIS_BITS);
    let y = signed(AXIS_BITS);
    let z = signed(AXIS_BITS);
    let light = reader.read_unsigned(LIGHT_BITS).unwrap_or_default() as u16;
    let button = reader.read_unsigned(1).unwrap_or_default() == 1;
    let _reserved = reader.read_unsigned(1);
    RawSample {
        x,
        y,
        z,
        light,
        button,
    }
}

/// Pack samples into the 48-bit layout. Axis values outside the 12-bit
/// range and light values outside 10 bits are truncated to their low bits.
pub fn pack_raw(samples: &[RawSample]) -> Vec<u8> {
    let mut writer = BitWriter::new();
    for sample in samples {
        writer.write(sample.x as u64, AXIS_BITS);
        writer.write(sample.y as u64, AXIS_BITS);
        writer.write(sample.z as u64, AXIS_BITS);
        writer.write(sample.light as u64, LIGHT_BITS);
        writer.write(sample.button as u64, 1);
        writer.write(0, 1);
    }
    writer.into_bytes()
}

/// Produce the calibrated samples of one block, in order
pub fn unpack_block(block: &DataBlock, header: &RecordingHeader) -> Vec<Sample> {
    let cal = &header.calibration;
    unpack_raw(&block.payload)
        .into_iter()
        .enumerate()
        .map(|(i, raw)| Sample {
            timestamp: block.start.sample_offset(i, header.sampling_frequency),
            x: cal.x.apply(raw.x),
            y: cal.y.apply(raw.y),
            z: cal.z.apply(raw.z),
            light: header
                .light
                .map_or(raw.light as f64, |light| light.apply(raw.light)),
            button: raw.button,
            temperature: block.temperature,
        })
        .collect()
}
