//! CLI commands

use crate::config::{Config, TimeFormat};
use crate::error::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// geneabin CLI
#[derive(Parser, Debug)]
#[command(name = "geneabin", version)]
#[command(about = "Decode GENEActiv accelerometer recordings into timestamp,x,y,z CSV")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Convert arguments used when no subcommand is given
    #[command(flatten)]
    pub convert: ConvertArgs,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a recording into CSV (the default)
    Convert(ConvertArgs),
    /// Print the recording header as JSON
    Info {
        /// Recording to inspect
        #[arg(short, long, default_value = "demo.bin")]
        input: PathBuf,
    },
    /// Write a synthetic recording
    Demo {
        /// Where to write the recording
        #[arg(short, long, default_value = "demo.bin")]
        output: PathBuf,
        /// Number of pages to generate
        #[arg(long, default_value = "10")]
        pages: u32,
        /// Sampling frequency in Hz
        #[arg(long, default_value = "100")]
        frequency: f64,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// Recording to decode
    #[arg(short, long, default_value = "demo.bin")]
    pub input: PathBuf,

    /// CSV file to write, or `-` for standard output
    #[arg(short, long, default_value = "demo.csv")]
    pub output: PathBuf,

    /// Timestamp column format
    #[arg(long, value_enum)]
    pub time_format: Option<TimeFormat>,

    /// Also write light, button and temperature columns
    #[arg(long)]
    pub extended: bool,

    /// Blocks to unpack concurrently
    #[arg(long)]
    pub workers: Option<usize>,

    /// Accept pages whose sequence number does not match their position
    #[arg(long)]
    pub no_verify_sequence: bool,

    /// JSON configuration file; flags given on the command line win
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ConvertArgs {
    /// Build the effective configuration: file (or defaults), then flags
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        if let Some(time_format) = self.time_format {
            config.output.time_format = time_format;
        }
        if self.extended {
            config.output.extended = true;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.no_verify_sequence {
            config.decode.verify_sequence = false;
        }
        config.validate()?;
        Ok(config)
    }

    /// Output goes to standard output
    pub fn is_stdout(&self) -> bool {
        self.output.as_os_str() == "-"
    }
}
