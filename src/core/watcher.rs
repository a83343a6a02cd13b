//! One native watch handle per tracked directory, plus the task that pumps
//! its notifications into the debouncer.

use crate::core::session::SessionStatus;
use crate::domain::model::{AuditRecord, Outcome, PendingEvent, PendingEventKind};
use crate::domain::ports::AuditSink;
use crate::utils::error::Result;
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Turns one notify event into pending events for direct children of `dir`.
pub fn classify_event(dir: &Path, event: &Event) -> Vec<PendingEvent> {
    let (kind, paths): (PendingEventKind, &[PathBuf]) = match &event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any) => (PendingEventKind::Created, event.paths.as_slice()),
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            (PendingEventKind::Modified, event.paths.as_slice())
        }
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => (PendingEventKind::Modified, event.paths.as_slice()),
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
            (PendingEventKind::RenamedInto, event.paths.as_slice())
        }
        // [from, to]: only the new name matters
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.split_last() {
            Some((to, _)) => (PendingEventKind::RenamedInto, std::slice::from_ref(to)),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    let ambiguous_rename = matches!(
        event.kind,
        EventKind::Modify(ModifyKind::Name(RenameMode::Any))
    );

    paths
        .iter()
        .filter(|path| path.parent() == Some(dir))
        .filter(|path| !path.is_dir())
        // some backends report both halves of a rename as `Any`; the old name is gone
        .filter(|path| !ambiguous_rename || path.exists())
        .map(|path| PendingEvent::new(path.clone(), kind))
        .collect()
}

fn removes_root(dir: &Path, event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Remove(RemoveKind::Folder | RemoveKind::Any)
            | EventKind::Modify(ModifyKind::Name(RenameMode::From))
    ) && event.paths.iter().any(|path| path == dir)
}

pub(crate) struct DirectoryWatcher {
    dir: PathBuf,
    raw_rx: mpsc::Receiver<notify::Result<Event>>,
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    pub(crate) fn open(dir: &Path, capacity: usize) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::channel(capacity);

        // notify calls back on its own thread, outside the runtime
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.blocking_send(res);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            raw_rx,
            _watcher: watcher,
        })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) async fn pump<A: AuditSink>(
        mut self,
        events: mpsc::Sender<PendingEvent>,
        audit: Arc<A>,
        status: Arc<SessionStatus>,
        mut shutdown: watch::Receiver<Option<Duration>>,
        health_interval: Duration,
    ) {
        let mut health = tokio::time::interval(health_interval);
        health.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                raw = self.raw_rx.recv() => match raw {
                    Some(Ok(event)) => {
                        if removes_root(&self.dir, &event) {
                            status.mark_failed(&self.dir, "tracked directory was removed or renamed");
                            return;
                        }
                        for pending in classify_event(&self.dir, &event) {
                            if events.send(pending).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        if !self.dir.is_dir() {
                            status.mark_failed(&self.dir, &format!("watcher error: {}", e));
                            return;
                        }
                        tracing::warn!("⚠️ Watcher error on {}: {}", self.dir.display(), e);
                    }
                    None => {
                        status.mark_failed(&self.dir, "native watcher stopped delivering events");
                        return;
                    }
                },
                _ = health.tick() => {
                    if !self.dir.is_dir() {
                        status.mark_failed(&self.dir, "tracked directory is no longer accessible");
                        return;
                    }
                }
            }
        }

        while let Ok(raw) = self.raw_rx.try_recv() {
            let Ok(event) = raw else { continue };
            for pending in classify_event(&self.dir, &event) {
                audit.record(&AuditRecord::skipped(
                    pending.path,
                    Outcome::SkippedAtShutdown,
                    "event arrived while the session was stopping",
                ));
            }
        }
        status.mark_stopped(&self.dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::DataChange;
    use tempfile::TempDir;

    fn make_event(kind: EventKind, paths: Vec<PathBuf>) -> Event {
        let mut event = Event::new(kind);
        event.paths = paths;
        event
    }

    #[test]
    fn test_created_file_in_tracked_dir() {
        let dir = TempDir::new().unwrap();
        let event = make_event(
            EventKind::Create(CreateKind::File),
            vec![dir.path().join("a.txt")],
        );

        let pending = classify_event(dir.path(), &event);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, PendingEventKind::Created);
    }

    #[test]
    fn test_nested_paths_are_ignored() {
        let dir = TempDir::new().unwrap();
        let event = make_event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            vec![dir.path().join("sub/a.txt")],
        );
        assert!(classify_event(dir.path(), &event).is_empty());
    }

    #[test]
    fn test_rename_both_keeps_new_name() {
        let dir = TempDir::new().unwrap();
        let event = make_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec![dir.path().join("a.part"), dir.path().join("a.iso")],
        );

        let pending = classify_event(dir.path(), &event);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path, dir.path().join("a.iso"));
        assert_eq!(pending[0].kind, PendingEventKind::RenamedInto);
    }

    #[test]
    fn test_removals_and_renames_out_are_ignored() {
        let dir = TempDir::new().unwrap();
        for kind in [
            EventKind::Remove(RemoveKind::File),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            EventKind::Modify(ModifyKind::Metadata(notify::event::MetadataKind::Any)),
        ] {
            let event = make_event(kind, vec![dir.path().join("a.txt")]);
            assert!(classify_event(dir.path(), &event).is_empty());
        }
    }

    #[test]
    fn test_directories_are_not_pending() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("photos")).unwrap();
        let event = make_event(
            EventKind::Create(CreateKind::Any),
            vec![dir.path().join("photos")],
        );
        assert!(classify_event(dir.path(), &event).is_empty());
    }

    #[test]
    fn test_root_removal_is_detected() {
        let dir = TempDir::new().unwrap();
        let event = make_event(
            EventKind::Remove(RemoveKind::Folder),
            vec![dir.path().to_path_buf()],
        );
        assert!(removes_root(dir.path(), &event));

        let child = make_event(
            EventKind::Remove(RemoveKind::File),
            vec![dir.path().join("a.txt")],
        );
        assert!(!removes_root(dir.path(), &child));
    }
}
