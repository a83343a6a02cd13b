pub mod collision;
pub mod debouncer;
pub mod in_flight;
pub mod mover;
pub mod resolver;
pub mod session;
pub mod sorter;
pub mod watcher;

pub use crate::domain::model::{AuditRecord, ExtensionMap, Outcome, SortDecision};
pub use crate::domain::ports::{AuditSink, ConfigStore};
pub use crate::utils::error::Result;
