//! `vod-migrate` command line entry point
//!
//! ```text
//! vod-migrate migrate config.toml
//! vod-migrate pull urls.txt --config config.json --log-format json
//! ```

mod app;

use clap::{Parser, Subcommand};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(
    name = "vod-migrate",
    version,
    about = "Resumable media migration into the VOD platform"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", value_parser = parse_level)]
    log_level: LogLevel,

    /// Console log format (pretty, json, compact)
    #[arg(long, global = true, value_parser = parse_format)]
    log_format: Option<LogFormat>,

    /// Also write every log line to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Migrate a local directory, URL list or bucket described by a TOML config
    Migrate {
        /// Path to the TOML configuration file
        config: PathBuf,
    },
    /// Ask the platform to pull every URL of a run list
    Pull {
        /// Run list: URL[,MediaName[,ClassId[,MediaStoragePath]]] per line
        run_list: PathBuf,

        /// Path to the JSON configuration file
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
    },
}

fn parse_level(value: &str) -> Result<LogLevel, String> {
    value.parse().map_err(|e: core_runtime::Error| e.to_string())
}

fn parse_format(value: &str) -> Result<LogFormat, String> {
    value.parse().map_err(|e: core_runtime::Error| e.to_string())
}

impl Cli {
    fn logging_config(&self) -> LoggingConfig {
        let mut config = LoggingConfig::default().with_level(self.log_level);
        if let Some(format) = self.log_format {
            config = config.with_format(format);
        }

        let log_file = match (&self.log_file, &self.command) {
            (Some(path), _) => Some(path.clone()),
            // Pull runs always keep a timestamped log file
            (None, Command::Pull { .. }) => Some(PathBuf::from(format!(
                "pull_upload_{}.log",
                chrono::Local::now().format("%Y%m%d_%H%M%S")
            ))),
            (None, Command::Migrate { .. }) => None,
        };
        match log_file {
            Some(path) => config.with_log_file(path),
            None => config,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.logging_config()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match &cli.command {
        Command::Migrate { config } => app::run_migrate(config).await,
        Command::Pull { run_list, config } => app::run_pull(run_list, config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
