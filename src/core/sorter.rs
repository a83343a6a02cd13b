use crate::core::collision::{self, DEFAULT_MAX_CANDIDATES};
use crate::core::mover::{MoveFailure, Mover};
use crate::core::resolver;
use crate::domain::model::{AuditRecord, ExtensionMap, Outcome};
use std::path::Path;
use std::sync::atomic::AtomicBool;

/// Resolve + collision + move for one ready file. Never fails: every
/// outcome, good or bad, comes back as an [`AuditRecord`].
#[derive(Debug, Clone, Copy)]
pub struct Sorter {
    mover: Mover,
    max_candidates: u32,
}

impl Default for Sorter {
    fn default() -> Self {
        Self::new(Mover::default(), DEFAULT_MAX_CANDIDATES)
    }
}

impl Sorter {
    pub fn new(mover: Mover, max_candidates: u32) -> Self {
        Self { mover, max_candidates }
    }

    pub fn sort(&self, source: &Path, map: &ExtensionMap) -> AuditRecord {
        self.sort_until(source, map, &AtomicBool::new(false))
    }

    /// Sorts `source`, abandoning the move once `cancel` is set. An abandoned
    /// move is recorded as [`Outcome::ShutdownTimeout`] with the source in place.
    pub fn sort_until(&self, source: &Path, map: &ExtensionMap, cancel: &AtomicBool) -> AuditRecord {
        let meta = match std::fs::symlink_metadata(source) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return AuditRecord::skipped(source, Outcome::VanishedBeforeSort, "source no longer exists");
            }
            Err(e) => return failure_record(source, None, e.into()),
        };
        if meta.is_dir() {
            return AuditRecord::skipped(source, Outcome::NotConfigured, "directories are not sorted");
        }

        let decision = match resolver::resolve(source, map) {
            Ok(decision) => decision,
            Err(e) => {
                return AuditRecord::skipped(source, Outcome::NotConfigured, e.to_string());
            }
        };

        if source.parent() == Some(decision.destination_dir.as_path()) {
            return AuditRecord::skipped(
                source,
                Outcome::NotConfigured,
                format!(
                    "already in the destination directory configured for '{}', nothing to move",
                    decision.extension
                ),
            );
        }

        let Some(base_name) = source.file_name() else {
            return AuditRecord::skipped(source, Outcome::NotConfigured, "path has no file name");
        };

        // a concurrent sort may claim the chosen name first; pick another
        let mut attempts = 0;
        loop {
            let destination = match collision::resolve_name(
                &decision.destination_dir,
                Path::new(base_name),
                self.max_candidates,
            ) {
                Ok(destination) => destination,
                Err(e) => {
                    return AuditRecord::new(source, None, Outcome::CollisionExhausted, Some(e.to_string()));
                }
            };

            match self.mover.move_file_until(source, &destination, cancel) {
                Ok(method) => {
                    tracing::debug!("{:?} {} -> {}", method, source.display(), destination.display());
                    return AuditRecord::moved(source, destination);
                }
                Err(MoveFailure::DestinationTaken(taken)) if attempts < self.max_candidates => {
                    attempts += 1;
                    tracing::debug!("{} was claimed concurrently, probing again", taken.display());
                }
                Err(failure) => return failure_record(source, Some(destination), failure),
            }
        }
    }
}

fn failure_record(
    source: &Path,
    destination: Option<std::path::PathBuf>,
    failure: MoveFailure,
) -> AuditRecord {
    let outcome = match &failure {
        MoveFailure::SourceVanished => Outcome::VanishedBeforeSort,
        MoveFailure::DestinationTaken(_) => Outcome::CollisionExhausted,
        MoveFailure::PartialMoveRolledBack(_) => Outcome::PartialMoveRolledBack,
        MoveFailure::PermissionDenied(_) => Outcome::PermissionDenied,
        MoveFailure::Io(_) => Outcome::IoError,
        MoveFailure::Cancelled => Outcome::ShutdownTimeout,
    };
    // destination is the attempted one; nothing is left behind there on failure
    AuditRecord::new(source, destination, outcome, Some(failure.to_string()))
}
