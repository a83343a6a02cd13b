#[cfg(feature = "cli")]
pub mod cli;
pub mod settings;
pub mod store;

#[cfg(feature = "cli")]
use crate::utils::logger::{LoggerOptions, DEFAULT_LOG_LOCATION};
#[cfg(feature = "cli")]
use clap::{ArgAction, Parser};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "auto-file-sorter", version)]
#[command(about = "Automatically sorts files in a directory based on their extension.")]
pub struct CliConfig {
    /// Enable debugging by setting logging level to DEBUG
    #[arg(short = 'D', long = "debug")]
    pub debug: bool,

    /// Increase output verbosity (up to 3 levels; third requires debugging)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Location of the log file
    #[arg(short = 'L', long, value_name = "LOCATION", default_value = DEFAULT_LOG_LOCATION)]
    pub log_location: PathBuf,

    /// Location of the extension configs
    #[arg(short = 'C', long, value_name = "PATH", default_value = store::DEFAULT_CONFIGS_LOCATION)]
    pub configs: PathBuf,

    /// Write the log file as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: cli::Command,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn logger_options(&self) -> LoggerOptions {
        LoggerOptions {
            debug: self.debug,
            verbosity: self.verbose,
            log_location: cli::absolute(&self.log_location),
            json: self.log_json,
        }
    }
}
