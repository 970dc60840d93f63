//! Recording header: device identity, calibration and memory layout
//!
//! The header is a run of titled sections holding `Key:Value` lines. It
//! ends with the `Number of Pages` field of the `Memory Status` section,
//! after which the first data page begins.

use crate::core::temporal::Timestamp;
use crate::error::{FormatError, Result};
use crate::format::fields::{self, Line};
use crate::format::read_line;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::BufRead;

/// Device type accepted by this decoder
pub const DEVICE_FAMILY: &str = "GENEActiv";

/// Upper bound on header lines before giving up on finding the page count
pub const MAX_HEADER_LINES: usize = 256;

/// First section of every recording
pub const SECTION_IDENTITY: &str = "Device Identity";
pub const SECTION_CONFIGURATION: &str = "Configuration Info";
pub const SECTION_SUBJECT: &str = "Subject Info";
pub const SECTION_CALIBRATION: &str = "Calibration Data";
pub const SECTION_MEMORY: &str = "Memory Status";

pub const FIELD_SERIAL: &str = "Device Unique Serial Code";
pub const FIELD_DEVICE_TYPE: &str = "Device Type";
pub const FIELD_MODEL: &str = "Device Model";
pub const FIELD_FIRMWARE: &str = "Device Firmware";
pub const FIELD_FREQUENCY: &str = "Measurement Frequency";
pub const FIELD_START_TIME: &str = "Start Time";
pub const FIELD_TIME_ZONE: &str = "Time Zone";
pub const FIELD_VOLTS: &str = "Volts";
pub const FIELD_LUX: &str = "Lux";
pub const FIELD_PAGES: &str = "Number of Pages";

const AXES: [char; 3] = ['x', 'y', 'z'];

/// Gain and offset turning a raw axis reading into g: `raw * gain + offset`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisCalibration {
    pub gain: f64,
    pub offset: f64,
}

impl AxisCalibration {
    /// Identity calibration, leaves raw readings unchanged
    pub const IDENTITY: AxisCalibration = AxisCalibration {
        gain: 1.0,
        offset: 0.0,
    };

    /// Build from the device's integer coefficients, which define
    /// `g = (raw * 100 - offset) / gain`
    pub fn from_device(gain: i64, offset: i64) -> Option<Self> {
        if gain == 0 {
            return None;
        }
        let gain = gain as f64;
        Some(Self {
            gain: 100.0 / gain,
            offset: -(offset as f64) / gain,
        })
    }

    /// Apply to a raw reading
    pub fn apply(&self, raw: i16) -> f64 {
        raw as f64 * self.gain + self.offset
    }
}

/// Per-axis calibration coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calibration {
    pub x: AxisCalibration,
    pub y: AxisCalibration,
    pub z: AxisCalibration,
}

impl Calibration {
    pub const IDENTITY: Calibration = Calibration {
        x: AxisCalibration::IDENTITY,
        y: AxisCalibration::IDENTITY,
        z: AxisCalibration::IDENTITY,
    };
}

/// Light sensor calibration: `lux = raw * lux / volts`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LightCalibration {
    pub volts: f64,
    pub lux: f64,
}

impl LightCalibration {
    pub fn apply(&self, raw: u16) -> f64 {
        raw as f64 * self.lux / self.volts
    }
}

/// Parsed recording header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingHeader {
    /// Device serial identifier
    pub serial: String,
    /// Device type, when declared
    pub device_type: Option<String>,
    /// Hardware model
    pub model: Option<String>,
    /// Firmware / format version string
    pub firmware: Option<String>,
    /// Accelerometer calibration
    pub calibration: Calibration,
    /// Light sensor calibration, when declared
    pub light: Option<LightCalibration>,
    /// Configured recording start
    pub start_time: Timestamp,
    /// Samples per second
    pub sampling_frequency: f64,
    /// Number of data blocks (pages) that follow the header
    pub block_count: u32,
    /// Time zone text as written by the configuring software
    pub time_zone: Option<String>,
    /// Every header field, keyed `Section/Key`
    pub metadata: BTreeMap<String, String>,
}

impl RecordingHeader {
    /// Parse the header from a reader positioned at the start of the file.
    ///
    /// On success the reader is positioned at the first data block.
    pub fn parse<R: BufRead>(reader: &mut R) -> Result<Self> {
        let fields = HeaderFields::read(reader)?;
        let header = fields.into_header()?;
        tracing::debug!(
            serial = %header.serial,
            frequency = header.sampling_frequency,
            blocks = header.block_count,
            "parsed recording header"
        );
        Ok(header)
    }

    /// Look up a raw header field
    pub fn field(&self, section: &str, key: &str) -> Option<&str> {
        self.metadata
            .get(&metadata_key(section, key))
            .map(String::as_str)
    }
}

fn metadata_key(section: &str, key: &str) -> String {
    format!("{section}/{key}")
}

/// Raw `Section/Key -> value` pairs, gathered before interpretation
struct HeaderFields {
    values: BTreeMap<String, String>,
}

impl HeaderFields {
    fn read<R: BufRead>(reader: &mut R) -> Result<Self> {
        let mut values = BTreeMap::new();
        let mut section: Option<String> = None;
        let mut line = String::new();

        for _ in 0..MAX_HEADER_LINES {
            if !read_line(reader, &mut line)? {
                return Err(FormatError::TruncatedHeader.into());
            }

            match fields::classify(&line) {
                Line::Blank => {}
                Line::Title(title) => {
                    if section.is_none() && title != SECTION_IDENTITY {
                        return Err(FormatError::UnsupportedVersion(format!(
                            "expected '{SECTION_IDENTITY}', found '{title}'"
                        ))
                        .into());
                    }
                    section = Some(title.to_string());
                }
                Line::Field(key, value) => {
                    let Some(current) = section.as_deref() else {
                        return Err(FormatError::UnsupportedVersion(format!(
                            "expected '{SECTION_IDENTITY}', found field '{key}'"
                        ))
                        .into());
                    };

                    if current == SECTION_IDENTITY && key == FIELD_DEVICE_TYPE {
                        check_device_type(value)?;
                    }

                    values.insert(metadata_key(current, key), value.to_string());

                    if current == SECTION_MEMORY && key == FIELD_PAGES {
                        return Ok(Self { values });
                    }
                }
            }
        }

        Err(FormatError::MissingField {
            section: SECTION_MEMORY,
            field: FIELD_PAGES,
        }
        .into())
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.values
            .get(&metadata_key(section, key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn require(&self, section: &'static str, key: &'static str) -> Result<&str> {
        self.get(section, key).ok_or_else(|| {
            FormatError::MissingField {
                section,
                field: key,
            }
            .into()
        })
    }

    fn calibration(&self) -> Result<Calibration> {
        let mut pairs = Vec::with_capacity(AXES.len());
        for axis in AXES {
            let gain = self.get(SECTION_CALIBRATION, &format!("{axis} gain"));
            let offset = self.get(SECTION_CALIBRATION, &format!("{axis} offset"));
            if let (Some(gain), Some(offset)) = (gain, offset) {
                pairs.push((axis, gain, offset));
            }
        }
        if pairs.len() < AXES.len() {
            return Err(FormatError::IncompleteCalibration { found: pairs.len() }.into());
        }

        let mut axes = Vec::with_capacity(AXES.len());
        for (axis, gain, offset) in pairs {
            let g = fields::parse_integer(gain)
                .ok_or_else(|| FormatError::malformed(format!("{axis} gain"), gain))?;
            let o = fields::parse_integer(offset)
                .ok_or_else(|| FormatError::malformed(format!("{axis} offset"), offset))?;
            let cal = AxisCalibration::from_device(g, o)
                .ok_or_else(|| FormatError::malformed(format!("{axis} gain"), gain))?;
            axes.push(cal);
        }

        Ok(Calibration {
            x: axes[0],
            y: axes[1],
            z: axes[2],
        })
    }

    fn light(&self) -> Result<Option<LightCalibration>> {
        let (Some(volts), Some(lux)) = (
            self.get(SECTION_CALIBRATION, FIELD_VOLTS),
            self.get(SECTION_CALIBRATION, FIELD_LUX),
        ) else {
            return Ok(None);
        };
        let volts_value = fields::parse_decimal(volts)
            .filter(|v| *v != 0.0)
            .ok_or_else(|| FormatError::malformed(FIELD_VOLTS, volts))?;
        let lux_value =
            fields::parse_decimal(lux).ok_or_else(|| FormatError::malformed(FIELD_LUX, lux))?;
        Ok(Some(LightCalibration {
            volts: volts_value,
            lux: lux_value,
        }))
    }

    fn into_header(self) -> Result<RecordingHeader> {
        // Calibration errors take precedence over other missing fields.
        let calibration = self.calibration()?;

        let serial = self.require(SECTION_IDENTITY, FIELD_SERIAL)?.to_string();
        let frequency = self.require(SECTION_CONFIGURATION, FIELD_FREQUENCY)?;
        let start = self.require(SECTION_CONFIGURATION, FIELD_START_TIME)?;
        let pages = self.require(SECTION_MEMORY, FIELD_PAGES)?;

        let sampling_frequency = fields::parse_frequency(frequency)
            .filter(|f| f.is_finite() && *f > 0.0)
            .ok_or_else(|| FormatError::malformed(FIELD_FREQUENCY, frequency))?;
        let start_time = fields::parse_device_time(start)
            .map(Timestamp::from_naive)
            .ok_or_else(|| FormatError::malformed(FIELD_START_TIME, start))?;
        let block_count = fields::parse_integer(pages)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| FormatError::malformed(FIELD_PAGES, pages))?;
        let light = self.light()?;

        let owned = |section: &str, key: &str| self.get(section, key).map(str::to_string);
        let device_type = owned(SECTION_IDENTITY, FIELD_DEVICE_TYPE);
        let model = owned(SECTION_IDENTITY, FIELD_MODEL);
        let firmware = owned(SECTION_IDENTITY, FIELD_FIRMWARE);
        let time_zone = owned(SECTION_SUBJECT, FIELD_TIME_ZONE)
            .or_else(|| owned(SECTION_CONFIGURATION, FIELD_TIME_ZONE));

        Ok(RecordingHeader {
            serial,
            device_type,
            model,
            firmware,
            calibration,
            light,
            start_time,
            sampling_frequency,
            block_count,
            time_zone,
            metadata: self.values,
        })
    }
}

fn check_device_type(value: &str) -> Result<()> {
    let family = DEVICE_FAMILY.to_ascii_lowercase();
    if value.is_empty() || value.to_ascii_lowercase().contains(&family) {
        Ok(())
    } else {
        Err(FormatError::UnsupportedVersion(format!("device type '{value}'")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::format::writer::RecordingWriter;
    use std::io::{BufRead, Cursor};

    fn header_text() -> String {
        let writer = RecordingWriter::new("012345", 100.0);
        String::from_utf8(writer.header_bytes()).unwrap()
    }

    fn parse_str(text: &str) -> Result<RecordingHeader> {
        RecordingHeader::parse(&mut Cursor::new(text.as_bytes().to_vec()))
    }

    fn format_err(result: Result<RecordingHeader>) -> FormatError {
        match result {
            Err(Error::Format(e)) => e,
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_header() {
        let header = parse_str(&header_text()).unwrap();
        assert_eq!(header.serial, "012345");
        assert_eq!(header.device_type.as_deref(), Some("GENEActiv"));
        assert_eq!(header.sampling_frequency, 100.0);
        assert_eq!(header.block_count, 0);
        assert_eq!(header.start_time.to_string(), "2012-05-17 12:34:56.000");
        assert_eq!(header.field(SECTION_MEMORY, FIELD_PAGES), Some("0"));
        assert_eq!(header.time_zone.as_deref(), Some("GMT +00:00"));
    }

    #[test]
    fn test_header_leaves_cursor_at_first_block() {
        let mut text = header_text();
        text.push_str("Recorded Data\r\n");
        let mut cursor = Cursor::new(text.into_bytes());

        RecordingHeader::parse(&mut cursor).unwrap();

        let mut next = String::new();
        cursor.read_line(&mut next).unwrap();
        assert_eq!(next, "Recorded Data\r\n");
    }

    #[test]
    fn test_device_calibration_conversion() {
        let cal = AxisCalibration::from_device(25548, -53).unwrap();
        // 1 g reading: raw * 100 = gain + offset
        let raw = ((25548 - 53) / 100) as i16;
        let g = cal.apply(raw);
        assert!((g - (raw as f64 * 100.0 + 53.0) / 25548.0).abs() < 1e-12);
        assert!(AxisCalibration::from_device(0, 10).is_none());
    }

    #[test]
    fn test_tolerates_padding() {
        let padded = header_text()
            .replace("x gain:", "  x gain :  ")
            .replace("\r\n\r\n", "\r\n \t\r\n\r\n\0\0\r\n");
        let header = parse_str(&padded).unwrap();
        assert_eq!(header.serial, "012345");
    }

    #[test]
    fn test_incomplete_calibration() {
        let text = header_text().replace("z offset:", "z offzet:");
        assert_eq!(
            format_err(parse_str(&text)),
            FormatError::IncompleteCalibration { found: 2 }
        );

        let text = header_text()
            .replace("y gain:", "# y gain:")
            .replace("x offset:", "# x offset:");
        assert_eq!(
            format_err(parse_str(&text)),
            FormatError::IncompleteCalibration { found: 1 }
        );
    }

    #[test]
    fn test_truncated_header() {
        let text = header_text();
        let cut = text.find(SECTION_MEMORY).unwrap();
        assert_eq!(
            format_err(parse_str(&text[..cut])),
            FormatError::TruncatedHeader
        );
    }

    #[test]
    fn test_foreign_file_is_unsupported() {
        assert!(matches!(
            format_err(parse_str("EDF+ header\r\n")),
            FormatError::UnsupportedVersion(_)
        ));

        let text = header_text().replace("Device Type:GENEActiv", "Device Type:OtherBand");
        assert!(matches!(
            format_err(parse_str(&text)),
            FormatError::UnsupportedVersion(_)
        ));
    }

    #[test]
    fn test_missing_and_malformed_fields() {
        let text = header_text().replace(
            "Device Unique Serial Code:012345",
            "Device Unique Serial Code:",
        );
        assert_eq!(
            format_err(parse_str(&text)),
            FormatError::MissingField {
                section: SECTION_IDENTITY,
                field: FIELD_SERIAL,
            }
        );

        let text =
            header_text().replace("Measurement Frequency:100 Hz", "Measurement Frequency:0 Hz");
        assert!(matches!(
            format_err(parse_str(&text)),
            FormatError::MalformedField { ref field, .. } if field == FIELD_FREQUENCY
        ));

        let text = header_text().replace("Number of Pages:0", "Number of Pages:-4");
        assert!(matches!(
            format_err(parse_str(&text)),
            FormatError::MalformedField { ref field, .. } if field == FIELD_PAGES
        ));
    }

    #[test]
    fn test_header_without_page_count_is_bounded() {
        let mut text = header_text().replace("Number of Pages:0", "");
        for i in 0..MAX_HEADER_LINES {
            text.push_str(&format!("Note {i}:filler\r\n"));
        }
        assert_eq!(
            format_err(parse_str(&text)),
            FormatError::MissingField {
                section: SECTION_MEMORY,
                field: FIELD_PAGES,
            }
        );
    }
}
