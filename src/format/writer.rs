//! Recording writer: emits well-formed recordings
//!
//! Used to produce demo files and test fixtures. Device calibration is
//! written as integer gain/offset pairs the way the device stores them.

use crate::core::sample::RawSample;
use crate::core::temporal::Timestamp;
use crate::error::Result;
use crate::format::block::{PAGE_CAPACITY, PAGE_MARKER};
use crate::format::unpack::pack_raw;
use chrono::NaiveDate;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Device time format: `2012-05-17 12:34:56:000`
const DEVICE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S:%3f";

/// One page to be written
#[derive(Debug, Clone)]
pub struct PageSpec {
    /// Page time as an offset from the recording start, in ms
    pub offset_millis: i64,
    /// Samples in the page
    pub samples: Vec<RawSample>,
    /// Sequence number; defaults to the page's position
    pub sequence: Option<u32>,
    /// Temperature reported in the sub-header
    pub temperature: f64,
}

impl PageSpec {
    pub fn new(offset_millis: i64, samples: Vec<RawSample>) -> Self {
        Self {
            offset_millis,
            samples,
            sequence: None,
            temperature: 21.5,
        }
    }

    /// Override the sequence number written for this page
    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Set the reported temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Builder for a complete recording
#[derive(Debug, Clone)]
pub struct RecordingWriter {
    serial: String,
    frequency: f64,
    start: Timestamp,
    /// Device `(gain, offset)` integers for x, y, z. `None` leaves the axis out.
    calibration: [Option<(i64, i64)>; 3],
    light: Option<(u32, u32)>,
    pages: Vec<PageSpec>,
    declared_pages: Option<u32>,
}

impl RecordingWriter {
    /// Create a writer with identity calibration (gain 100, offset 0)
    pub fn new(serial: impl Into<String>, frequency: f64) -> Self {
        let start = NaiveDate::from_ymd_opt(2012, 5, 17)
            .and_then(|d| d.and_hms_opt(12, 34, 56))
            .map(Timestamp::from_naive)
            .unwrap_or_else(|| Timestamp::from_millis(0));
        Self {
            serial: serial.into(),
            frequency,
            start,
            calibration: [Some((100, 0)); 3],
            light: Some((300, 800)),
            pages: Vec::new(),
            declared_pages: None,
        }
    }

    /// Synthetic recording of a wrist at rest with a slow sway on x and y.
    ///
    /// Calibration is 256 counts per g on every axis, so z sits near 1 g.
    pub fn demo(pages: u32, frequency: f64) -> Self {
        let mut writer = Self::new("DEMO00", frequency)
            .with_axis_calibration(0, 25_600, 0)
            .with_axis_calibration(1, 25_600, 0)
            .with_axis_calibration(2, 25_600, 0);
        let page_millis = PAGE_CAPACITY as f64 * 1_000.0 / frequency;

        for page in 0..pages as usize {
            let samples = (0..PAGE_CAPACITY)
                .map(|i| {
                    let t = (page * PAGE_CAPACITY + i) as f64 / frequency;
                    let sway = (t * std::f64::consts::TAU * 0.25).sin();
                    RawSample {
                        x: (sway * 64.0).round() as i16,
                        y: (sway * -32.0).round() as i16,
                        z: 256 + (sway * 8.0).round() as i16,
                        light: ((t / 10.0).rem_euclid(1.0) * 1_023.0) as u16,
                        button: false,
                    }
                })
                .collect();
            let offset = (page as f64 * page_millis).trunc() as i64;
            writer.push_page(PageSpec::new(offset, samples));
        }
        writer
    }

    /// Set the recording start time
    pub fn with_start(mut self, start: Timestamp) -> Self {
        self.start = start;
        self
    }

    /// Set device calibration integers for one axis (0 = x, 1 = y, 2 = z)
    pub fn with_axis_calibration(mut self, axis: usize, gain: i64, offset: i64) -> Self {
        self.calibration[axis] = Some((gain, offset));
        self
    }

    /// Drop the calibration pair of one axis
    pub fn without_axis_calibration(mut self, axis: usize) -> Self {
        self.calibration[axis] = None;
        self
    }

    /// Append a page
    pub fn push_page(&mut self, page: PageSpec) {
        self.pages.push(page);
    }

    /// Override the page count written in the header
    pub fn declare_pages(&mut self, count: u32) {
        self.declared_pages = Some(count);
    }

    fn device_time(&self, offset_millis: i64) -> String {
        self.start
            .add_millis(offset_millis)
            .to_datetime()
            .format(DEVICE_TIME_FORMAT)
            .to_string()
    }

    /// Header section only
    pub fn header_bytes(&self) -> Vec<u8> {
        let start = self.device_time(0);
        let pages = self
            .declared_pages
            .unwrap_or(self.pages.len() as u32);

        let mut out = String::new();
        let mut line = |text: String| {
            out.push_str(&text);
            out.push_str("\r\n");
        };

        line("Device Identity".into());
        line(format!("Device Unique Serial Code:{}", self.serial));
        line("Device Type:GENEActiv".into());
        line("Device Model:1.1".into());
        line("Device Firmware:GENEActiv 1.1 FW v01.05".into());
        line(format!("Calibration Date:{start}"));
        line(String::new());
        line("Device Capabilities".into());
        line("Accelerometer Range:-8 to 8".into());
        line("Accelerometer Resolution:0.0039".into());
        line("Accelerometer Units:g".into());
        line("Light Meter Range:0 to 5000".into());
        line("Light Meter Resolution:5".into());
        line("Light Meter Units:lux".into());
        line("Temperature Sensor Range:-30 to 70".into());
        line("Temperature Sensor Resolution:0.1".into());
        line("Temperature Sensor Units:deg. C".into());
        line(String::new());
        line("Configuration Info".into());
        line(format!("Measurement Frequency:{} Hz", self.frequency));
        line("Measurement Period:168 Hours".into());
        line(format!("Start Time:{start}"));
        line("Study Centre:".into());
        line("Study Code:".into());
        line("Investigator ID:".into());
        line("Exercise Type:".into());
        line("Config Operator ID:".into());
        line(format!("Config Time:{start}"));
        line("Config Notes:".into());
        line(String::new());
        line("Subject Info".into());
        line("Subject Code:".into());
        line("Date of Birth:".into());
        line("Sex:".into());
        line("Height:".into());
        line("Weight:".into());
        line("Handedness Code:".into());
        line("Time Zone:GMT +00:00".into());
        line(String::new());
        line("Calibration Data".into());
        for (axis, pair) in ['x', 'y', 'z'].iter().zip(self.calibration) {
            if let Some((gain, offset)) = pair {
                line(format!("{axis} gain:{gain}"));
                line(format!("{axis} offset:{offset}"));
            }
        }
        if let Some((volts, lux)) = self.light {
            line(format!("Volts:{volts}"));
            line(format!("Lux:{lux}"));
        }
        line(String::new());
        line("Memory Status".into());
        line(format!("Number of Pages:{pages}"));

        out.into_bytes()
    }

    fn page_text(&self, position: usize, page: &PageSpec) -> String {
        let mut out = String::new();
        let sequence = page.sequence.unwrap_or(position as u32);
        let payload = hex::encode_upper(pack_raw(&page.samples));
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "{PAGE_MARKER}\r\n\
             Device Unique Serial Code:{}\r\n\
             Sequence Number:{sequence}\r\n\
             Page Time:{}\r\n\
             Unassigned:\r\n\
             Temperature:{:.1}\r\n\
             Battery voltage:4.0\r\n\
             Device Status:Recording\r\n\
             Measurement Frequency:{:.1}\r\n\
             {payload}\r\n",
            self.serial,
            self.device_time(page.offset_millis),
            page.temperature,
            self.frequency,
        );
        out
    }

    /// Complete recording
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header_bytes();
        for (position, page) in self.pages.iter().enumerate() {
            out.extend_from_slice(self.page_text(position, page).as_bytes());
        }
        out
    }

    /// Write the recording to `sink`
    pub fn write_to<W: Write>(&self, sink: &mut W) -> Result<()> {
        sink.write_all(&self.to_bytes())?;
        sink.flush()?;
        Ok(())
    }

    /// Write the recording to a file, creating parent directories
    pub fn create<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        self.write_to(&mut file)?;
        file.sync_all()?;
        Ok(())
    }
}
