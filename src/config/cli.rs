use crate::app::configure::ConfigChanges;
use crate::config::settings::SettingsFile;
use crate::core::session::SessionOptions;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Track one or more directories
    Track(TrackArgs),
    /// Write to the configs
    Write(WriteArgs),
    /// Read from the configs
    Read(ReadArgs),
}

#[derive(Debug, Clone, Args)]
pub struct TrackArgs {
    /// Paths to the directories to be tracked
    #[arg(value_name = "PATHS", required = true)]
    pub paths: Vec<PathBuf>,

    /// Register the current command to run on startup
    #[arg(short = 'A', long = "autostart")]
    pub autostart: bool,

    /// TOML file with session settings
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Quiet period before a file is considered complete
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Maximum "name (n).ext" candidates tried on a name clash
    #[arg(long, value_name = "N")]
    pub max_candidates: Option<u32>,

    /// Size of the worker pool performing moves
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Seconds running moves may take to finish at shutdown
    #[arg(long, value_name = "SECS")]
    pub grace_secs: Option<u64>,

    /// Reload the extension configs whenever the file changes
    #[arg(long)]
    pub watch_config: bool,
}

impl TrackArgs {
    /// 預設值 ← 設定檔 ← 命令列參數
    pub fn session_options(&self, settings: Option<&SettingsFile>) -> SessionOptions {
        let mut options = SessionOptions::default();
        if let Some(settings) = settings {
            settings.apply(&mut options);
        }
        if let Some(ms) = self.debounce_ms {
            options.debounce = Duration::from_millis(ms);
        }
        if let Some(candidates) = self.max_candidates {
            options.max_candidates = candidates;
        }
        if let Some(workers) = self.workers {
            options.workers = workers;
        }
        if let Some(secs) = self.grace_secs {
            options.grace_period = Duration::from_secs(secs);
        }
        options
    }

    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.paths.iter().map(|p| absolute(p)).collect()
    }
}

#[derive(Debug, Clone, Args)]
pub struct WriteArgs {
    /// Add path for extension
    #[arg(short = 'a', long = "add", num_args = 2, value_names = ["EXTENSION", "PATH"])]
    pub add: Option<Vec<String>>,

    /// Delete extension(s) and their path from the configs
    #[arg(short = 'd', long = "delete", num_args = 1.., value_name = "EXTENSION")]
    pub delete: Vec<String>,

    /// Load new configs from JSON file(s) into the configs
    #[arg(short = 'l', long = "load", num_args = 1.., value_name = "PATH")]
    pub load: Vec<PathBuf>,
}

impl WriteArgs {
    /// Destination and load paths are resolved against the working directory.
    pub fn changes(&self) -> ConfigChanges {
        let add = self.add.as_deref().and_then(|pair| match pair {
            [extension, destination] => Some((extension.clone(), absolute(Path::new(destination)))),
            _ => None,
        });
        ConfigChanges {
            add,
            delete: self.delete.clone(),
            load: self.load.iter().map(|p| absolute(p)).collect(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ReadArgs {
    /// Extensions to show (default: all configs)
    #[arg(value_name = "EXTENSIONS")]
    pub extensions: Vec<String>,
}

/// Resolves `path` against the working directory without touching the filesystem.
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
