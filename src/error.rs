//! Error types for geneabin

use thiserror::Error;

/// Result type alias for geneabin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for geneabin
#[derive(Error, Debug)]
pub enum Error {
    /// IO errors (missing file, permission denied, stream closed mid-read)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Structural violations of the recording layout
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Sample sink failures
    #[error("Output error: {0}")]
    Output(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A parallel unpack task did not complete
    #[error("Worker error: {0}")]
    Worker(String),
}

impl Error {
    /// Category name used when presenting the error to a user
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "IoError",
            Error::Format(_) => "FormatError",
            Error::Output(_) => "OutputError",
            Error::Configuration(_) => "ConfigError",
            Error::Worker(_) => "WorkerError",
        }
    }

    /// Get the format error, if this is one
    pub fn as_format(&self) -> Option<&FormatError> {
        match self {
            Error::Format(e) => Some(e),
            _ => None,
        }
    }
}

/// Structural violations of a recording. All of them are fatal for the
/// decode in progress.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    /// Calibration section holds fewer than three complete axis pairs
    #[error("incomplete calibration: found {found} of 3 axis gain/offset pairs")]
    IncompleteCalibration { found: usize },

    /// Stream ended before the declared number of blocks was read
    #[error("truncated file: header declares {expected} blocks, only {decoded} present")]
    TruncatedFile { expected: u32, decoded: u32 },

    /// Stream ended inside the header
    #[error("truncated file: header ended before the memory status section")]
    TruncatedHeader,

    /// Block sub-header or payload violates the page layout
    #[error("corrupt header in block {block}: {reason}")]
    CorruptBlockHeader { block: u32, reason: String },

    /// Not a recording this decoder understands
    #[error("unsupported recording version: {0}")]
    UnsupportedVersion(String),

    /// Required header field is absent
    #[error("missing header field '{field}' in section '{section}'")]
    MissingField {
        section: &'static str,
        field: &'static str,
    },

    /// Header field is present but cannot be interpreted
    #[error("malformed header field '{field}': {value:?}")]
    MalformedField { field: String, value: String },

    /// Block starts before the last sample of the previous block
    #[error("block {block} starts at {current} ms, before the previous block ends at {previous} ms")]
    OutOfOrderBlock {
        block: u32,
        previous: i64,
        current: i64,
    },
}

impl FormatError {
    pub(crate) fn malformed(field: impl Into<String>, value: impl Into<String>) -> Self {
        FormatError::MalformedField {
            field: field.into(),
            value: value.into(),
        }
    }

    pub(crate) fn corrupt_block(block: u32, reason: impl Into<String>) -> Self {
        FormatError::CorruptBlockHeader {
            block,
            reason: reason.into(),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Output(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Worker(e.to_string())
    }
}
