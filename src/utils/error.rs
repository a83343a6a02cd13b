use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SorterError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Watcher error: {0}")]
    WatcherError(#[from] notify::Error),

    #[error("Configuration unavailable at '{}': {reason}", path.display())]
    ConfigUnavailable { path: PathBuf, reason: String },

    #[error("Cannot track '{}': {reason}", path.display())]
    InvalidTrackedDirectory { path: PathBuf, reason: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Settings error: {message}")]
    SettingsError { message: String },

    #[error("Watch session is no longer running")]
    SessionClosed,

    #[error("Every tracked directory has failed")]
    AllWatchersFailed,
}

/// 錯誤嚴重程度，決定 CLI 的退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl SorterError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SorterError::SessionClosed => ErrorSeverity::Low,
            SorterError::WatcherError(_) | SorterError::IoError(_) | SorterError::AllWatchersFailed => {
                ErrorSeverity::Medium
            }
            SorterError::InvalidTrackedDirectory { .. }
            | SorterError::InvalidConfigValueError { .. }
            | SorterError::SettingsError { .. } => ErrorSeverity::High,
            SorterError::ConfigUnavailable { .. } | SorterError::SerializationError(_) => {
                ErrorSeverity::Critical
            }
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SorterError::IoError(_) => "Check that the paths exist and that you have permission to access them",
            SorterError::SerializationError(_) | SorterError::ConfigUnavailable { .. } => {
                "Fix the configs file (it must be a JSON object of \".ext\": \"/absolute/dir\" pairs) and try again"
            }
            SorterError::WatcherError(_) | SorterError::AllWatchersFailed => {
                "Make sure the tracked directories are local and still accessible"
            }
            SorterError::InvalidTrackedDirectory { .. } => "Pass existing directories to the track subcommand",
            SorterError::InvalidConfigValueError { .. } | SorterError::SettingsError { .. } => {
                "Correct the reported value and run the command again"
            }
            SorterError::SessionClosed => "Start a new tracking session",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            SorterError::ConfigUnavailable { path, .. } => {
                format!("Could not use the configs at '{}': {}", path.display(), self)
            }
            SorterError::InvalidTrackedDirectory { path, reason } => {
                format!("'{}' cannot be tracked ({})", path.display(), reason)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SorterError>;
