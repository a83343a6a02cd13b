//! Watch Session: owns the tracked directories, the extension map snapshot
//! and the bounded pipeline
//!
//! ```text
//! notify ─▶ pump (per dir) ─▶ debouncer ─▶ dispatcher ─▶ worker pool (spawn_blocking)
//!                                                         └─▶ AuditSink
//! ```
//!
//! States: `Starting → Watching ⇄ ReloadingConfig → Stopping → Stopped`,
//! `Watching → Failed` once every tracked directory has failed.

use crate::core::collision::DEFAULT_MAX_CANDIDATES;
use crate::core::debouncer::{run_debouncer, Debouncer, DEFAULT_QUIET_PERIOD};
use crate::core::in_flight::InFlightSet;
use crate::core::mover::{MoveStrategy, Mover};
use crate::core::sorter::Sorter;
use crate::core::watcher::DirectoryWatcher;
use crate::domain::model::{AuditRecord, ExtensionMap, Outcome};
use crate::domain::ports::{AuditSink, ConfigStore};
use crate::utils::error::{Result, SorterError};
use crate::utils::logger::CONFIG_TARGET;
use crate::utils::validation::{validate_positive_number, validate_range, Validate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Watching,
    ReloadingConfig,
    Stopping,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryState {
    Watching,
    Failed(String),
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub debounce: Duration,
    pub max_candidates: u32,
    pub workers: usize,
    pub grace_period: Duration,
    pub channel_capacity: usize,
    pub health_interval: Duration,
    pub move_strategy: MoveStrategy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_QUIET_PERIOD,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            grace_period: DEFAULT_GRACE_PERIOD,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            health_interval: DEFAULT_HEALTH_INTERVAL,
            move_strategy: MoveStrategy::default(),
        }
    }
}

impl Validate for SessionOptions {
    fn validate(&self) -> Result<()> {
        validate_range("debounce_ms", self.debounce.as_millis() as u64, 10, 60_000)?;
        validate_positive_number("max_candidates", self.max_candidates as usize, 1)?;
        validate_positive_number("workers", self.workers, 1)?;
        validate_positive_number("channel_capacity", self.channel_capacity, 1)?;
        Ok(())
    }
}

/// Session and per-directory state shared with the pump tasks.
#[derive(Debug)]
pub(crate) struct SessionStatus {
    state: watch::Sender<SessionState>,
    directories: Mutex<HashMap<PathBuf, DirectoryState>>,
}

impl SessionStatus {
    fn new() -> Self {
        Self {
            state: watch::Sender::new(SessionState::Starting),
            directories: Mutex::new(HashMap::new()),
        }
    }

    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    fn set_directory(&self, dir: &Path, state: DirectoryState) {
        self.directories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dir.to_path_buf(), state);
    }

    fn directories(&self) -> Vec<(PathBuf, DirectoryState)> {
        let mut dirs: Vec<_> = self
            .directories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(dir, state)| (dir.clone(), state.clone()))
            .collect();
        dirs.sort_by(|a, b| a.0.cmp(&b.0));
        dirs
    }

    /// WatcherFailed: only this directory stops; the session fails once none is left.
    pub(crate) fn mark_failed(&self, dir: &Path, reason: &str) {
        tracing::error!("❌ Watcher for {} failed: {}", dir.display(), reason);
        let all_failed = {
            let mut dirs = self.directories.lock().unwrap_or_else(PoisonError::into_inner);
            dirs.insert(dir.to_path_buf(), DirectoryState::Failed(reason.to_string()));
            dirs.values().all(|state| matches!(state, DirectoryState::Failed(_)))
        };

        if all_failed {
            self.state.send_if_modified(|state| {
                if matches!(state, SessionState::Watching | SessionState::ReloadingConfig) {
                    tracing::error!("❌ Every tracked directory has failed, session is now failed");
                    *state = SessionState::Failed;
                    true
                } else {
                    false
                }
            });
        }
    }

    pub(crate) fn mark_stopped(&self, dir: &Path) {
        let mut dirs = self.directories.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = dirs.get_mut(dir) {
            if *state == DirectoryState::Watching {
                *state = DirectoryState::Stopped;
            }
        }
    }
}

pub struct WatchSession;

impl WatchSession {
    /// 啟動追蹤：驗證資料夾、載入初始對應表、為每個資料夾開啟監看
    pub async fn start<S: ConfigStore, A: AuditSink>(
        directories: Vec<PathBuf>,
        options: SessionOptions,
        store: Arc<S>,
        audit: Arc<A>,
    ) -> Result<SessionHandle<S>> {
        options.validate()?;
        let status = Arc::new(SessionStatus::new());

        let directories = canonical_directories(&directories)?;

        let initial = store.load().await.map_err(|e| {
            tracing::error!("❌ Cannot start tracking without a configuration: {}", e);
            e
        })?;
        tracing::info!("📋 Loaded {} extension mapping(s)", initial.len());

        let mut watchers = Vec::with_capacity(directories.len());
        for dir in &directories {
            watchers.push(DirectoryWatcher::open(dir, options.channel_capacity)?);
        }

        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(initial));
        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::channel(options.channel_capacity);
        let (ready_tx, ready_rx) = mpsc::channel(options.channel_capacity);

        let mut tasks = Vec::with_capacity(watchers.len() + 1);
        for watcher in watchers {
            status.set_directory(watcher.dir(), DirectoryState::Watching);
            tasks.push(tokio::spawn(watcher.pump(
                events_tx.clone(),
                Arc::clone(&audit),
                Arc::clone(&status),
                shutdown_rx.clone(),
                options.health_interval,
            )));
        }
        drop(events_tx);

        tasks.push(tokio::spawn(run_debouncer(
            Debouncer::new(options.debounce),
            events_rx,
            ready_tx,
            Arc::clone(&audit),
            shutdown_rx.clone(),
        )));

        let dispatcher = Dispatcher::new(
            Sorter::new(Mover::new(options.move_strategy), options.max_candidates),
            snapshot_rx,
            audit,
            Arc::new(Semaphore::new(options.workers)),
            shutdown_rx,
            options.grace_period,
        );
        let dispatcher = tokio::spawn(dispatcher.run(ready_rx));

        status.set_state(SessionState::Watching);
        tracing::info!(
            "👀 Tracking {} director{} with {} worker(s), {:?} quiet period",
            directories.len(),
            if directories.len() == 1 { "y" } else { "ies" },
            options.workers,
            options.debounce
        );

        Ok(SessionHandle {
            store,
            status,
            snapshot: snapshot_tx,
            shutdown: shutdown_tx,
            tasks,
            dispatcher: Some(dispatcher),
            directories,
        })
    }
}

/// Shorthand for [`WatchSession::start`].
pub async fn start_tracking<S: ConfigStore, A: AuditSink>(
    directories: Vec<PathBuf>,
    options: SessionOptions,
    store: Arc<S>,
    audit: Arc<A>,
) -> Result<SessionHandle<S>> {
    WatchSession::start(directories, options, store, audit).await
}

fn canonical_directories(directories: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if directories.is_empty() {
        return Err(SorterError::InvalidTrackedDirectory {
            path: PathBuf::new(),
            reason: "no directory given".to_string(),
        });
    }

    let mut canonical: Vec<PathBuf> = Vec::with_capacity(directories.len());
    for dir in directories {
        let resolved = dir
            .canonicalize()
            .map_err(|e| SorterError::InvalidTrackedDirectory {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
        if !resolved.is_dir() {
            return Err(SorterError::InvalidTrackedDirectory {
                path: dir.clone(),
                reason: "not a directory".to_string(),
            });
        }
        if !canonical.contains(&resolved) {
            canonical.push(resolved);
        }
    }
    Ok(canonical)
}

pub struct SessionHandle<S: ConfigStore> {
    store: Arc<S>,
    status: Arc<SessionStatus>,
    snapshot: watch::Sender<Arc<ExtensionMap>>,
    shutdown: watch::Sender<Option<Duration>>,
    tasks: Vec<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
    directories: Vec<PathBuf>,
}

impl<S: ConfigStore> SessionHandle<S> {
    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn directory_states(&self) -> Vec<(PathBuf, DirectoryState)> {
        self.status.directories()
    }

    /// Current extension map snapshot.
    pub fn snapshot(&self) -> Arc<ExtensionMap> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// 重新載入設定並原子地替換快照；失敗時保留上一份可用的快照
    pub async fn reload_config(&self) -> Result<()> {
        let previous = self.state();
        if matches!(previous, SessionState::Stopping | SessionState::Stopped) {
            return Err(SorterError::SessionClosed);
        }

        self.status.set_state(SessionState::ReloadingConfig);
        let loaded = self.store.load().await;
        self.status.state.send_if_modified(|state| {
            if *state == SessionState::ReloadingConfig {
                *state = previous;
                true
            } else {
                false
            }
        });

        match loaded {
            Ok(map) => {
                tracing::info!(
                    target: CONFIG_TARGET,
                    severity = "CONFIG",
                    "🔄 Reloaded {} extension mapping(s)",
                    map.len()
                );
                self.snapshot.send_replace(Arc::new(map));
                Ok(())
            }
            Err(e) => {
                tracing::error!("❌ Reload failed, keeping the last good configuration: {}", e);
                Err(e)
            }
        }
    }

    /// Resolves once the session has entered `Failed`.
    pub async fn wait_failed(&self) {
        let mut state = self.status.state.subscribe();
        loop {
            let failed = *state.borrow_and_update() == SessionState::Failed;
            if failed || state.changed().await.is_err() {
                return;
            }
        }
    }

    /// Stops intake, lets running sorts finish within `grace`, then releases the watchers.
    pub async fn stop(mut self, grace: Duration) {
        self.status.set_state(SessionState::Stopping);
        tracing::info!("🛑 Stopping session (grace period {:?})", grace);
        self.shutdown.send_replace(Some(grace));

        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(e) = dispatcher.await {
                tracing::error!("Dispatcher task ended abnormally: {}", e);
            }
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!("Session task ended abnormally: {}", e);
            }
        }

        self.status.set_state(SessionState::Stopped);
        tracing::info!("✅ Session stopped");
    }
}

struct Dispatcher<A: AuditSink> {
    sorter: Sorter,
    snapshot: watch::Receiver<Arc<ExtensionMap>>,
    audit: Arc<A>,
    in_flight: Arc<InFlightSet>,
    pool: Arc<Semaphore>,
    shutdown: watch::Receiver<Option<Duration>>,
    // set once the grace period is over; running copies give up at the next chunk
    cancel: Arc<AtomicBool>,
    jobs: JoinSet<(PathBuf, bool)>,
    default_grace: Duration,
}

impl<A: AuditSink> Dispatcher<A> {
    fn new(
        sorter: Sorter,
        snapshot: watch::Receiver<Arc<ExtensionMap>>,
        audit: Arc<A>,
        pool: Arc<Semaphore>,
        shutdown: watch::Receiver<Option<Duration>>,
        default_grace: Duration,
    ) -> Self {
        Self {
            sorter,
            snapshot,
            audit,
            in_flight: InFlightSet::new(),
            pool,
            shutdown,
            cancel: Arc::new(AtomicBool::new(false)),
            jobs: JoinSet::new(),
            default_grace,
        }
    }

    async fn run(mut self, mut ready: mpsc::Receiver<PathBuf>) {
        let mut ready_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                Some(joined) = self.jobs.join_next(), if !self.jobs.is_empty() => self.on_finished(joined),
                path = ready.recv() => match path {
                    Some(path) => self.dispatch(path, false),
                    None => {
                        ready_open = false;
                        break;
                    }
                },
            }
        }

        let grace = (*self.shutdown.borrow()).unwrap_or(self.default_grace);
        let deadline = tokio::time::Instant::now() + grace;
        let mut cancelled = false;

        loop {
            tokio::select! {
                path = ready.recv(), if ready_open => match path {
                    Some(path) => self.audit.record(&AuditRecord::skipped(
                        path,
                        Outcome::SkippedAtShutdown,
                        "ready while the session was stopping",
                    )),
                    None => ready_open = false,
                },
                Some(joined) = self.jobs.join_next(), if !self.jobs.is_empty() => {
                    if let Ok((path, true)) = joined {
                        tracing::debug!("Dropping re-evaluation of {} during shutdown", path.display());
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !cancelled && !self.jobs.is_empty() => {
                    tracing::warn!(
                        "⏱️ Grace period of {:?} elapsed, abandoning {} running sort(s)",
                        grace,
                        self.in_flight.len()
                    );
                    // each job still records what actually happened to its file
                    self.cancel.store(true, Ordering::Release);
                    cancelled = true;
                }
                else => break,
            }
        }
    }

    fn on_finished(&mut self, joined: std::result::Result<(PathBuf, bool), tokio::task::JoinError>) {
        match joined {
            Ok((path, true)) => self.dispatch(path, true),
            Ok(_) => {}
            Err(e) => tracing::error!("Sort task ended abnormally: {}", e),
        }
    }

    fn dispatch(&mut self, path: PathBuf, requeued: bool) {
        let Some(guard) = self.in_flight.try_acquire(&path) else {
            tracing::debug!("{} already being sorted, re-evaluating afterwards", path.display());
            return;
        };

        let sorter = self.sorter;
        let snapshot = self.snapshot.clone();
        let audit = Arc::clone(&self.audit);
        let pool = Arc::clone(&self.pool);
        let cancel = Arc::clone(&self.cancel);
        let mut stopping = self.shutdown.clone();

        self.jobs.spawn(async move {
            if requeued && !path.exists() {
                tracing::debug!("{} already handled, nothing to re-evaluate", path.display());
                return (path, guard.release());
            }

            let permit = tokio::select! {
                permit = pool.acquire_owned() => permit.ok(),
                _ = wait_for_stop(&mut stopping) => None,
            };
            let still_running = stopping.borrow().is_none();

            let record = match permit {
                Some(_permit) if still_running => {
                    let map = Arc::clone(&snapshot.borrow());
                    let source = path.clone();
                    let sorted =
                        tokio::task::spawn_blocking(move || sorter.sort_until(&source, &map, &cancel)).await;
                    match sorted {
                        Ok(record) => record,
                        Err(e) => AuditRecord::new(
                            &path,
                            None,
                            Outcome::IoError,
                            Some(format!("sort task failed: {}", e)),
                        ),
                    }
                }
                _ => AuditRecord::skipped(
                    &path,
                    Outcome::SkippedAtShutdown,
                    "session stopping before a worker was free",
                ),
            };

            audit.record(&record);
            (path, guard.release())
        });
    }
}

async fn wait_for_stop(shutdown: &mut watch::Receiver<Option<Duration>>) {
    loop {
        let stopping = shutdown.borrow_and_update().is_some();
        if stopping || shutdown.changed().await.is_err() {
            return;
        }
    }
}
