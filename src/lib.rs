pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::audit::{MemoryAuditSink, TracingAuditSink};
pub use config::store::JsonConfigStore;
pub use core::session::{
    start_tracking, DirectoryState, SessionHandle, SessionOptions, SessionState, WatchSession,
};
pub use domain::model::{AuditRecord, ExtensionMap, Outcome};
pub use domain::ports::{AuditSink, AutostartRegistrar, ConfigStore};
pub use utils::error::{Result, SorterError};
