use auto_file_sorter::adapters::autostart::NoopAutostart;
use auto_file_sorter::app::configure::{handle_read, handle_write};
use auto_file_sorter::app::track::{run_tracking, TrackRequest};
use auto_file_sorter::config::cli::Command;
use auto_file_sorter::config::settings::SettingsFile;
use auto_file_sorter::utils::logger::{self, MAX_VERBOSITY_LEVEL};
use auto_file_sorter::utils::validation::Validate;
use auto_file_sorter::{CliConfig, JsonConfigStore, SorterError, TracingAuditSink};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let config = CliConfig::parse();

    // 初始化日誌
    if let Err(e) = logger::init_cli_logger(&config.logger_options()) {
        eprintln!("❌ {}", e.user_friendly_message());
        return ExitCode::FAILURE;
    }

    tracing::debug!("Parsed arguments: {:?}", config);
    if config.verbose > MAX_VERBOSITY_LEVEL {
        tracing::warn!(
            "⚠️ Maximum verbosity level is {}, extra -v flags are ignored",
            MAX_VERBOSITY_LEVEL
        );
    }
    if config.verbose >= MAX_VERBOSITY_LEVEL && !config.debug {
        tracing::warn!("⚠️ Debug output on stderr also requires -D/--debug for the log file");
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("❌ {} (Severity: {:?})", e, e.severity());
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());

            ExitCode::from(e.severity().exit_code() as u8)
        }
    }
}

async fn run(config: CliConfig) -> Result<(), SorterError> {
    let configs = auto_file_sorter::config::cli::absolute(&config.configs);
    let store = Arc::new(JsonConfigStore::new(configs.clone()));

    match config.command {
        Command::Track(args) => {
            let settings = match &args.settings {
                Some(path) => {
                    let settings = SettingsFile::from_file(path)?;
                    settings.validate()?;
                    Some(settings)
                }
                None => None,
            };

            let watch_config = args.watch_config || settings.as_ref().is_some_and(SettingsFile::watch_config);
            let request = TrackRequest {
                directories: args.tracked_paths(),
                options: args.session_options(settings.as_ref()),
                autostart: args.autostart,
                command: std::env::args().collect(),
                watch_config: watch_config.then(|| configs.clone()),
            };

            tracing::info!("🚀 Starting auto-file-sorter {}", env!("CARGO_PKG_VERSION"));
            run_tracking(request, store, Arc::new(TracingAuditSink), &NoopAutostart).await
        }
        Command::Write(args) => {
            let map = handle_write(store.as_ref(), &args.changes()).await?;
            println!("✅ {} mapping(s) saved to {}", map.len(), configs.display());
            Ok(())
        }
        Command::Read(args) => {
            for (extension, destination) in handle_read(store.as_ref(), &args.extensions).await? {
                println!("{}: {}", extension, destination.display());
            }
            Ok(())
        }
    }
}
