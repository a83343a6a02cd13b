//! Per-path quiet-period debouncing of raw filesystem notifications.
//!
//! A file copied slowly into a tracked directory produces a burst of
//! create/modify events. Every event resets the path's timer; the path is
//! released exactly once, after `quiet_period` passes with no new event.

use crate::domain::model::{AuditRecord, Outcome, PendingEvent, PendingEventKind};
use crate::domain::ports::AuditSink;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct Slot {
    first_kind: PendingEventKind,
    last_seen: Instant,
    events: u32,
}

/// A path whose quiet period elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyFile {
    pub path: PathBuf,
    pub kind: PendingEventKind,
    pub coalesced: u32,
}

#[derive(Debug)]
pub struct Debouncer {
    quiet_period: Duration,
    pending: HashMap<PathBuf, Slot>,
}

impl Debouncer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            pending: HashMap::new(),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// 記錄事件並重設該路徑的計時器
    pub fn record(&mut self, event: PendingEvent) {
        self.pending
            .entry(event.path)
            .and_modify(|slot| {
                slot.last_seen = slot.last_seen.max(event.detected_at);
                slot.events += 1;
            })
            .or_insert(Slot {
                first_kind: event.kind,
                last_seen: event.detected_at,
                events: 1,
            });
    }

    /// Earliest instant at which some pending path becomes ready.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|slot| slot.last_seen + self.quiet_period)
            .min()
    }

    pub fn take_ready(&mut self, now: Instant) -> Vec<ReadyFile> {
        let quiet_period = self.quiet_period;
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, slot)| now.saturating_duration_since(slot.last_seen) >= quiet_period)
            .map(|(path, _)| path.clone())
            .collect();

        ready
            .into_iter()
            .filter_map(|path| {
                self.pending.remove(&path).map(|slot| ReadyFile {
                    path,
                    kind: slot.first_kind,
                    coalesced: slot.events,
                })
            })
            .collect()
    }

    /// Removes every pending path regardless of its timer.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        self.pending.drain().map(|(path, _)| path).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Debouncer task: raw events in, ready paths out. Vanished paths are
/// recorded here; on shutdown every pending or late event is recorded as skipped.
pub(crate) async fn run_debouncer<A: AuditSink>(
    mut debouncer: Debouncer,
    mut events: mpsc::Receiver<PendingEvent>,
    ready: mpsc::Sender<PathBuf>,
    audit: Arc<A>,
    mut shutdown: watch::Receiver<Option<Duration>>,
) {
    let mut intake_open = true;

    loop {
        let deadline = debouncer.next_deadline();
        let wake_at = deadline
            .map(tokio::time::Instant::from_std)
            .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            event = events.recv(), if intake_open => match event {
                Some(event) => {
                    tracing::trace!("{} {}", event.kind, event.path.display());
                    debouncer.record(event);
                }
                None => {
                    tracing::debug!("All directory watchers closed, no further events");
                    intake_open = false;
                }
            },
            _ = tokio::time::sleep_until(wake_at), if deadline.is_some() => {
                for file in debouncer.take_ready(Instant::now()) {
                    if !file.path.exists() {
                        tracing::info!("👻 {} vanished before it could be sorted", file.path.display());
                        audit.record(&AuditRecord::skipped(
                            &file.path,
                            Outcome::VanishedBeforeSort,
                            format!("disappeared during the {:?} quiet period", debouncer.quiet_period()),
                        ));
                        continue;
                    }

                    tracing::debug!(
                        "{} ready after {} event(s), first seen as {}",
                        file.path.display(),
                        file.coalesced,
                        file.kind
                    );
                    if ready.send(file.path).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    for path in debouncer.drain() {
        audit.record(&AuditRecord::skipped(
            path,
            Outcome::SkippedAtShutdown,
            "session stopping before the quiet period elapsed",
        ));
    }
    while let Ok(event) = events.try_recv() {
        audit.record(&AuditRecord::skipped(
            event.path,
            Outcome::SkippedAtShutdown,
            "event arrived while the session was stopping",
        ));
    }
}
