//! Decoder and output configuration
//!
//! Every field has a default, so a JSON config file only needs the keys it
//! changes:
//!
//! ```json
//! { "workers": 4, "output": { "time_format": "epoch-ms" } }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Timestamp representation in tabular output
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum TimeFormat {
    /// `2012-05-17 12:34:56.000`, device clock
    #[default]
    Iso,
    /// Integer milliseconds since the Unix epoch, device clock read as UTC
    EpochMs,
}

/// Options that change how a recording is validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Require page sequence numbers to match their position in the file
    pub verify_sequence: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            verify_sequence: true,
        }
    }
}

/// Options for tabular output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    pub time_format: TimeFormat,
    /// Also write light, button and temperature columns
    pub extended: bool,
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub decode: DecodeOptions,
    pub output: OutputOptions,
    /// Blocks unpacked concurrently; 1 decodes sequentially
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            decode: DecodeOptions::default(),
            output: OutputOptions::default(),
            workers: 1,
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text).map_err(|e| {
            Error::Configuration(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), ?config, "loaded configuration");
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Configuration("workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.decode.verify_sequence);
        assert_eq!(config.output.time_format, TimeFormat::Iso);
        assert!(!config.output.extended);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_partial_json() {
        let config: Config =
            serde_json::from_str(r#"{ "output": { "time_format": "epoch-ms" } }"#).unwrap();
        assert_eq!(config.output.time_format, TimeFormat::EpochMs);
        assert!(config.decode.verify_sequence);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_from_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("geneabin.json");
        std::fs::write(
            &path,
            r#"{ "workers": 4, "decode": { "verify_sequence": false } }"#,
        )
        .unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.workers, 4);
        assert!(!config.decode.verify_sequence);
    }

    #[test]
    fn test_invalid_config() {
        let temp_dir = TempDir::new().unwrap();

        let path = temp_dir.path().join("zero.json");
        std::fs::write(&path, r#"{ "workers": 0 }"#).unwrap();
        let err = Config::from_json_file(&path).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");

        let path = temp_dir.path().join("broken.json");
        std::fs::write(&path, "{ workers").unwrap();
        let err = Config::from_json_file(&path).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");

        let err = Config::from_json_file(temp_dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.kind(), "IoError");
    }
}
