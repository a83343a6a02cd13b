//! `track` subcommand: runs a Watch Session until interrupted.

use crate::core::session::{SessionHandle, SessionOptions, WatchSession};
use crate::domain::ports::{AuditSink, AutostartRegistrar, ConfigStore};
use crate::utils::error::{Result, SorterError};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Settling time before a change to the configs file triggers a reload.
const CONFIG_SETTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct TrackRequest {
    pub directories: Vec<PathBuf>,
    pub options: SessionOptions,
    pub autostart: bool,
    /// Command line handed to the autostart registrar.
    pub command: Vec<String>,
    /// Watched for changes when set.
    pub watch_config: Option<PathBuf>,
}

/// Tracks until Ctrl-C.
pub async fn run_tracking<S, A, R>(request: TrackRequest, store: Arc<S>, audit: Arc<A>, autostart: &R) -> Result<()>
where
    S: ConfigStore,
    A: AuditSink,
    R: AutostartRegistrar,
{
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("❌ Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl-C");
    };
    run_tracking_until(request, store, audit, autostart, ctrl_c).await
}

/// 追蹤直到 `shutdown` 完成或所有資料夾失效；期間處理 SIGHUP 與設定檔變更的重新載入
pub async fn run_tracking_until<S, A, R, F>(
    request: TrackRequest,
    store: Arc<S>,
    audit: Arc<A>,
    autostart: &R,
    shutdown: F,
) -> Result<()>
where
    S: ConfigStore,
    A: AuditSink,
    R: AutostartRegistrar,
    F: Future<Output = ()>,
{
    let grace = request.options.grace_period;
    let handle = WatchSession::start(request.directories, request.options, store, audit).await?;

    if request.autostart {
        if let Err(e) = autostart.register(&request.command) {
            tracing::warn!("⚠️ Could not register autostart: {}", e);
        }
    }

    let mut config_watch = match request.watch_config.as_deref().map(ConfigFileWatcher::open) {
        Some(Ok(watcher)) => {
            tracing::info!("👀 Reloading configs on change: {}", watcher.file.display());
            Some(watcher)
        }
        Some(Err(e)) => {
            tracing::warn!("⚠️ Cannot watch the configs file, reload with SIGHUP instead: {}", e);
            None
        }
        None => None,
    };

    let mut hangup = hangup_signal();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            _ = handle.wait_failed() => break Err(SorterError::AllWatchersFailed),
            _ = next_hangup(&mut hangup) => {
                tracing::info!("Received SIGHUP, reloading configs");
                reload(&handle).await;
            }
            _ = next_config_change(&mut config_watch) => reload(&handle).await,
        }
    };

    handle.stop(grace).await;
    outcome
}

async fn reload<S: ConfigStore>(handle: &SessionHandle<S>) {
    // failures are logged by the session, which keeps the last good map
    let _ = handle.reload_config().await;
}

struct ConfigFileWatcher {
    file: PathBuf,
    changes: mpsc::Receiver<()>,
    _watcher: RecommendedWatcher,
}

impl ConfigFileWatcher {
    /// Watches the parent directory so replace-by-rename saves are seen too.
    fn open(file: &Path) -> Result<Self> {
        let file = file.to_path_buf();
        let parent = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let (tx, changes) = mpsc::channel(1);

        let target = file.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else { return };
            let touches_file = event.paths.iter().any(|p| p.file_name() == target.file_name());
            if touches_file && matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                // a full channel already holds a pending reload
                let _ = tx.try_send(());
            }
        })?;
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;

        Ok(Self {
            file,
            changes,
            _watcher: watcher,
        })
    }
}

async fn next_config_change(watch: &mut Option<ConfigFileWatcher>) {
    let Some(watcher) = watch else {
        return std::future::pending().await;
    };
    if watcher.changes.recv().await.is_none() {
        *watch = None;
        return std::future::pending().await;
    }
    tokio::time::sleep(CONFIG_SETTLE).await;
    while watcher.changes.try_recv().is_ok() {}
    tracing::info!("Configs file changed, reloading");
}

#[cfg(unix)]
type HangupSignal = Option<tokio::signal::unix::Signal>;
#[cfg(not(unix))]
type HangupSignal = ();

#[cfg(unix)]
fn hangup_signal() -> HangupSignal {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::hangup()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!("⚠️ Cannot listen for SIGHUP: {}", e);
            None
        }
    }
}

#[cfg(not(unix))]
fn hangup_signal() -> HangupSignal {}

#[cfg(unix)]
async fn next_hangup(signal: &mut HangupSignal) {
    match signal {
        Some(stream) => {
            if stream.recv().await.is_none() {
                *signal = None;
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn next_hangup(_signal: &mut HangupSignal) {
    std::future::pending().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::audit::MemoryAuditSink;
    use crate::adapters::autostart::NoopAutostart;
    use crate::config::store::JsonConfigStore;
    use crate::domain::model::{ExtensionMap, Outcome};
    use tempfile::TempDir;

    async fn store_with(dir: &TempDir, map: &ExtensionMap) -> Arc<JsonConfigStore> {
        let store = Arc::new(JsonConfigStore::new(dir.path().join("configs.json")));
        store.save(map).await.unwrap();
        store
    }

    fn request(directories: Vec<PathBuf>) -> TrackRequest {
        TrackRequest {
            directories,
            options: SessionOptions {
                debounce: Duration::from_millis(50),
                grace_period: Duration::from_secs(2),
                ..SessionOptions::default()
            },
            autostart: true,
            command: vec!["auto-file-sorter".to_string(), "track".to_string()],
            watch_config: None,
        }
    }

    #[tokio::test]
    async fn test_tracking_ends_when_shutdown_resolves() {
        let root = TempDir::new().unwrap();
        let watched = root.path().join("watched");
        let logs = root.path().join("logs");
        std::fs::create_dir_all(&watched).unwrap();
        std::fs::create_dir_all(&logs).unwrap();
        let map: ExtensionMap = [(".log", logs.clone())].into_iter().collect();
        let store = store_with(&root, &map).await;
        let audit = Arc::new(MemoryAuditSink::new());

        let writer = {
            let watched = watched.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                std::fs::write(watched.join("app.log"), b"hello").unwrap();
                tokio::time::sleep(Duration::from_millis(1500)).await;
            }
        };

        run_tracking_until(request(vec![watched.clone()]), store, Arc::clone(&audit), &NoopAutostart, writer)
            .await
            .unwrap();

        assert!(logs.join("app.log").exists());
        assert_eq!(audit.count(Outcome::Ok), 1);
    }

    #[tokio::test]
    async fn test_missing_directory_fails_before_tracking() {
        let root = TempDir::new().unwrap();
        let store = store_with(&root, &ExtensionMap::new()).await;
        let audit = Arc::new(MemoryAuditSink::new());

        let result = run_tracking_until(
            request(vec![root.path().join("missing")]),
            store,
            audit,
            &NoopAutostart,
            std::future::ready(()),
        )
        .await;

        assert!(matches!(result, Err(SorterError::InvalidTrackedDirectory { .. })));
    }

    #[tokio::test]
    async fn test_config_file_change_triggers_reload() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("configs.json");
        std::fs::write(&file, "{}").unwrap();

        let mut watch = Some(ConfigFileWatcher::open(&file).unwrap());
        let writer = {
            let file = file.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                std::fs::write(&file, "{\".log\": \"/tmp\"}").unwrap();
            })
        };

        tokio::time::timeout(Duration::from_secs(5), next_config_change(&mut watch))
            .await
            .expect("change to the configs file was not observed");
        writer.await.unwrap();
    }
}
