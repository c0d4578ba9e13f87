use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use outbreak_watch::alerts::{JsonLinesReporter, LogReporter, ReportSink};
use outbreak_watch::collectors::{LineSource, PayloadSource};
use outbreak_watch::config::{Config, ReportFormat};
use outbreak_watch::error::ConfigError;
use outbreak_watch::{LoopMessage, Pipeline, Runtime};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Log filter used when RUST_LOG is not set; the text report stream logs at info and warn
const DEFAULT_LOG_FILTER: &str = "info";

/// Command-line arguments for outbreak watch
#[derive(Parser)]
#[command(
    name = "outbreak-watch",
    about = "Streaming outbreak detection over hospital case reports",
    long_about = "Reads newline-delimited JSON case reports, keeps per-hospital windowed metrics, \
                  learns an outbreak risk classifier from them as data accumulates, and reports \
                  critical fevers, outbreak candidates and risk predictions."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Read case reports from a file instead of stdin
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Report output format (overrides the configuration file)
    #[arg(short, long, value_enum)]
    format: Option<FormatArg>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Text => ReportFormat::Text,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// A missing config file is allowed (defaults are used); a missing input
    /// file is not.
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        if let Some(ref input_path) = self.input {
            if !input_path.is_file() {
                return Err(format!(
                    "Input path is not a readable file: {}",
                    input_path.display()
                ));
            }
        }

        Ok(())
    }

    /// Convert config path to string safely, handling non-UTF-8 paths
    fn config_path_str(&self) -> Result<Option<&str>, String> {
        match &self.config {
            Some(path) => match path.to_str() {
                Some(path_str) => Ok(Some(path_str)),
                None => Err(format!(
                    "Configuration file path contains invalid UTF-8 characters: {}",
                    path.display()
                )),
            },
            None => Ok(None),
        }
    }
}

/// Load configuration from file or use defaults
///
/// An unreadable file falls back to defaults with a warning; a file that does
/// not parse or validate falls back to defaults with an error.
fn load_config(config_path: Option<&str>) -> Result<Config, ConfigError> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            match Config::from_file(Path::new(path)) {
                Ok(config) => Ok(config),
                Err(ConfigError::ReadError(_)) => {
                    warn!(
                        "Configuration file '{}' not found or unreadable, using defaults",
                        path
                    );
                    Ok(Config::default())
                }
                Err(e) => {
                    error!("Configuration error in '{}': {}", path, e);
                    warn!("Using default configuration due to invalid config file");
                    Ok(Config::default())
                }
            }
        }
        None => {
            info!("Using default configuration");
            Ok(Config::default())
        }
    }
}

fn report_sink(format: ReportFormat) -> Arc<dyn ReportSink> {
    match format {
        ReportFormat::Text => Arc::new(LogReporter),
        ReportFormat::Json => Arc::new(JsonLinesReporter::stdout()),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    cli.validate().map_err(anyhow::Error::msg)?;
    let config_path = cli.config_path_str().map_err(anyhow::Error::msg)?;
    let mut config = load_config(config_path)?;
    if let Some(format) = cli.format {
        config.output.format = format.into();
    }

    let source: Box<dyn PayloadSource> = match &cli.input {
        Some(path) => {
            info!("Reading case reports from {}", path.display());
            Box::new(
                LineSource::open(path)
                    .with_context(|| format!("Failed to open input file {}", path.display()))?,
            )
        }
        None => {
            info!("Reading case reports from stdin");
            Box::new(LineSource::stdin())
        }
    };

    let pipeline = Arc::new(Pipeline::new(&config, report_sink(config.output.format)));
    let mut runtime = Runtime::new(&config, pipeline);

    let shutdown = runtime.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if let Err(e) = shutdown.send(LoopMessage::Shutdown) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("Error setting SIGINT handler for graceful shutdown")?;

    info!("Outbreak watch is running. Press Ctrl+C to stop.");
    let reason = runtime.run(source).context("Failed to start runtime")?;
    info!("Outbreak watch finished ({:?})", reason);
    Ok(())
}

fn logger(env: env_logger::Env<'_>) -> env_logger::Builder {
    env_logger::Builder::from_env(env.default_filter_or(DEFAULT_LOG_FILTER))
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    logger(env_logger::Env::default()).init();

    info!("Starting outbreak watch");

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
