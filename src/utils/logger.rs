use crate::utils::error::{Result, SorterError};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// 搬移紀錄專用的 target，相當於獨立的 MOVE 等級
pub const AUDIT_TARGET: &str = "auto_file_sorter::audit";
/// 設定變更專用的 target，相當於獨立的 CONFIG 等級
pub const CONFIG_TARGET: &str = "auto_file_sorter::config";

pub const MAX_VERBOSITY_LEVEL: u8 = 3;
pub const DEFAULT_LOG_LOCATION: &str = "auto-file-sorter.log";

#[derive(Debug, Clone)]
pub struct LoggerOptions {
    pub debug: bool,
    pub verbosity: u8,
    pub log_location: PathBuf,
    pub json: bool,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            debug: false,
            verbosity: 0,
            log_location: PathBuf::from(DEFAULT_LOG_LOCATION),
            json: false,
        }
    }
}

/// `-v` → WARN, `-vv` → INFO, `-vvv` (或更多) → DEBUG
pub fn stderr_level(verbosity: u8) -> Option<LevelFilter> {
    match verbosity.min(MAX_VERBOSITY_LEVEL) {
        0 => None,
        1 => Some(LevelFilter::WARN),
        2 => Some(LevelFilter::INFO),
        _ => Some(LevelFilter::DEBUG),
    }
}

fn build_filter(level: LevelFilter, from_env: bool) -> EnvFilter {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|value| from_env && !value.trim().is_empty())
        .unwrap_or_else(|| format!("auto_file_sorter={}", level));

    // audit/config targets stay visible regardless of verbosity
    EnvFilter::new(format!(
        "{},{}=info,{}=info",
        directives, AUDIT_TARGET, CONFIG_TARGET
    ))
}

pub fn init_cli_logger(options: &LoggerOptions) -> Result<()> {
    let file = File::create(&options.log_location).map_err(|e| SorterError::ConfigUnavailable {
        path: options.log_location.clone(),
        reason: format!("cannot open log file: {}", e),
    })?;

    let file_level = if options.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);
    if options.json {
        layers.push(
            file_layer
                .json()
                .with_filter(build_filter(file_level, true))
                .boxed(),
        );
    } else {
        layers.push(file_layer.with_filter(build_filter(file_level, true)).boxed());
    }

    if let Some(level) = stderr_level(options.verbosity) {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_filter(build_filter(level, false))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| SorterError::SettingsError {
            message: format!("logger already initialised: {}", e),
        })
}
