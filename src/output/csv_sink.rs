//! CSV output

use crate::config::{OutputOptions, TimeFormat};
use crate::core::sample::Sample;
use crate::error::{Error, Result};
use crate::output::SampleSink;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const COLUMNS: [&str; 4] = ["timestamp", "x", "y", "z"];
pub const EXTENDED_COLUMNS: [&str; 3] = ["light", "button", "temperature"];

/// Writes samples as CSV rows to any writer
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    options: OutputOptions,
}

impl<W: Write> CsvSink<W> {
    /// Wrap `inner` and write the title row
    pub fn new(inner: W, options: OutputOptions) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        let mut title_row: Vec<&str> = COLUMNS.to_vec();
        if options.extended {
            title_row.extend(EXTENDED_COLUMNS);
        }
        writer.write_record(&title_row)?;
        Ok(Self { writer, options })
    }

    fn row(&self, sample: &Sample) -> Vec<String> {
        let timestamp = match self.options.time_format {
            TimeFormat::Iso => sample.timestamp.to_string(),
            TimeFormat::EpochMs => sample.timestamp.as_millis().to_string(),
        };
        let mut row = vec![
            timestamp,
            format!("{:.6}", sample.x),
            format!("{:.6}", sample.y),
            format!("{:.6}", sample.z),
        ];
        if self.options.extended {
            row.push(format!("{:.2}", sample.light));
            row.push(if sample.button { "1" } else { "0" }.to_string());
            row.push(sample.temperature.map_or(String::new(), |t| format!("{:.1}", t)));
        }
        row
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Output(e.to_string()))
    }
}

impl<W: Write> SampleSink for CsvSink<W> {
    fn write_sample(&mut self, sample: &Sample) -> Result<()> {
        let row = self.row(sample);
        self.writer.write_record(&row)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// CSV file that only appears at its final path once the decode succeeds.
///
/// Rows go to `<path>.partial`; [`SampleSink::finish`] renames it into
/// place. Dropping the sink unfinished removes the partial file, so a
/// failed decode leaves no output behind.
pub struct CsvFileSink {
    inner: Option<CsvSink<File>>,
    staging: PathBuf,
    target: PathBuf,
}

impl CsvFileSink {
    pub fn create<P: AsRef<Path>>(path: P, options: OutputOptions) -> Result<Self> {
        let target = path.as_ref().to_path_buf();
        let mut name = target
            .file_name()
            .ok_or_else(|| Error::Output(format!("not a file path: {}", target.display())))?
            .to_os_string();
        name.push(".partial");
        let staging = target.with_file_name(name);

        let file = File::create(&staging)?;
        Ok(Self {
            inner: Some(CsvSink::new(file, options)?),
            staging,
            target,
        })
    }

    /// Final output path
    pub fn path(&self) -> &Path {
        &self.target
    }
}

impl SampleSink for CsvFileSink {
    fn write_sample(&mut self, sample: &Sample) -> Result<()> {
        match self.inner.as_mut() {
            Some(sink) => sink.write_sample(sample),
            None => Err(Error::Output("sink already finished".to_string())),
        }
    }

    fn finish(&mut self) -> Result<()> {
        let Some(sink) = self.inner.take() else {
            return Ok(());
        };
        let file = sink.into_inner()?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&self.staging, &self.target)?;
        tracing::debug!(path = %self.target.display(), "wrote csv output");
        Ok(())
    }
}

impl Drop for CsvFileSink {
    fn drop(&mut self) {
        if let Some(sink) = self.inner.take() {
            drop(sink);
            if let Err(e) = std::fs::remove_file(&self.staging) {
                tracing::warn!(path = %self.staging.display(), error = %e, "could not remove partial output");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::temporal::Timestamp;
    use tempfile::TempDir;

    fn sample(millis: i64, x: f64) -> Sample {
        Sample {
            timestamp: Timestamp::from_millis(millis),
            x,
            y: -0.5,
            z: 1.0 / 3.0,
            light: 2.5,
            button: true,
            temperature: Some(21.5),
        }
    }

    fn render(options: OutputOptions, samples: &[Sample]) -> String {
        let mut sink = CsvSink::new(Vec::new(), options).unwrap();
        for s in samples {
            sink.write_sample(s).unwrap();
        }
        sink.finish().unwrap();
        String::from_utf8(sink.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_default_columns() {
        let text = render(OutputOptions::default(), &[sample(10, 1.01)]);
        assert_eq!(
            text,
            "timestamp,x,y,z\n1970-01-01 00:00:00.010,1.010000,-0.500000,0.333333\n"
        );
    }

    #[test]
    fn test_epoch_and_extended_columns() {
        let options = OutputOptions {
            time_format: TimeFormat::EpochMs,
            extended: true,
        };
        let text = render(options, &[sample(1_337_258_096_000, 0.0)]);
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("timestamp,x,y,z,light,button,temperature")
        );
        assert_eq!(
            lines.next(),
            Some("1337258096000,0.000000,-0.500000,0.333333,2.50,1,21.5")
        );
    }

    #[test]
    fn test_file_sink_renames_on_finish() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");

        let mut sink = CsvFileSink::create(&path, OutputOptions::default()).unwrap();
        sink.write_sample(&sample(0, 1.0)).unwrap();
        assert!(!path.exists());
        sink.finish().unwrap();
        drop(sink);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(!temp_dir.path().join("out.csv.partial").exists());
    }

    #[test]
    fn test_file_sink_discards_unfinished_output() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");

        let mut sink = CsvFileSink::create(&path, OutputOptions::default()).unwrap();
        sink.write_sample(&sample(0, 1.0)).unwrap();
        assert!(temp_dir.path().join("out.csv.partial").exists());
        drop(sink);

        assert!(!path.exists());
        assert!(!temp_dir.path().join("out.csv.partial").exists());
    }
}
