//! geneabin: Main entry point

use anyhow::Context;
use clap::Parser;
use geneabin::cli::{Cli, Commands, ConvertArgs};
use geneabin::config::Config;
use geneabin::decoder::{decode_parallel, Decoder};
use geneabin::error::Error;
use geneabin::format::RecordingWriter;
use geneabin::output::{CsvFileSink, CsvSink, SampleSink};
use std::io::BufRead;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let result = match cli.command {
        None => convert(&cli.convert).await,
        Some(Commands::Convert(args)) => convert(&args).await,
        Some(Commands::Info { input }) => info(&input),
        Some(Commands::Demo {
            output,
            pages,
            frequency,
        }) => demo(&output, pages, frequency),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {err:#}", error_kind(&err));
            ExitCode::FAILURE
        }
    }
}

/// Category of a CLI failure, `Error` when it did not come from the library
fn error_kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<Error>().map_or("Error", Error::kind)
}

fn init_tracing(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn convert(args: &ConvertArgs) -> anyhow::Result<()> {
    let config = args.resolve_config()?;
    let decoder = Decoder::open(&args.input, &config.decode)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let result = if args.is_stdout() {
        let mut sink = CsvSink::new(std::io::stdout().lock(), config.output)?;
        run(decoder, &config, &mut sink).await
    } else {
        let mut sink = CsvFileSink::create(&args.output, config.output)
            .with_context(|| format!("creating {}", args.output.display()))?;
        run(decoder, &config, &mut sink).await
    };
    result.with_context(|| format!("decoding {}", args.input.display()))
}

async fn run<R, S>(decoder: Decoder<R>, config: &Config, sink: &mut S) -> anyhow::Result<()>
where
    R: BufRead + Send + 'static,
    S: SampleSink,
{
    let summary = if config.workers > 1 {
        decode_parallel(decoder, config.workers, sink).await?
    } else {
        decoder.decode_into(sink)?
    };
    tracing::info!(
        blocks = summary.blocks,
        samples = summary.samples,
        "conversion complete"
    );
    Ok(())
}

fn info(input: &Path) -> anyhow::Result<()> {
    let decoder = Decoder::open(input, &Default::default())
        .with_context(|| format!("reading {}", input.display()))?;
    println!("{}", serde_json::to_string_pretty(decoder.header())?);
    Ok(())
}

fn demo(output: &Path, pages: u32, frequency: f64) -> anyhow::Result<()> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return Err(Error::Configuration(format!(
            "frequency must be positive, got {frequency}"
        ))
        .into());
    }
    RecordingWriter::demo(pages, frequency)
        .create(output)
        .with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(path = %output.display(), pages, "wrote demo recording");
    Ok(())
}
