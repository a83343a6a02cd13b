use anyhow::Result;
use auto_file_sorter::core::mover::MoveStrategy;
use auto_file_sorter::{
    ConfigStore, DirectoryState, ExtensionMap, JsonConfigStore, MemoryAuditSink, Outcome,
    SessionHandle, SessionOptions, SessionState, SorterError, WatchSession,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const WAIT_LIMIT: Duration = Duration::from_secs(10);

struct Workspace {
    root: TempDir,
    watched: PathBuf,
    logs: PathBuf,
    store: Arc<JsonConfigStore>,
    audit: Arc<MemoryAuditSink>,
}

impl Workspace {
    async fn new() -> Result<Self> {
        let root = TempDir::new()?;
        let watched = root.path().join("downloads");
        let logs = root.path().join("logs");
        fs::create_dir_all(&watched)?;
        fs::create_dir_all(&logs)?;

        let store = Arc::new(JsonConfigStore::new(root.path().join("configs.json")));
        let map: ExtensionMap = [(".log", logs.clone())].into_iter().collect();
        store.save(&map).await?;

        Ok(Self {
            root,
            watched: watched.canonicalize()?,
            logs,
            store,
            audit: Arc::new(MemoryAuditSink::new()),
        })
    }

    async fn start(&self, options: SessionOptions) -> Result<SessionHandle<JsonConfigStore>> {
        Ok(WatchSession::start(
            vec![self.watched.clone()],
            options,
            Arc::clone(&self.store),
            Arc::clone(&self.audit),
        )
        .await?)
    }
}

fn fast_options() -> SessionOptions {
    SessionOptions {
        debounce: Duration::from_millis(100),
        grace_period: Duration::from_secs(2),
        health_interval: Duration::from_millis(100),
        ..SessionOptions::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

fn dir_state(handle: &SessionHandle<JsonConfigStore>, dir: &Path) -> Option<DirectoryState> {
    handle
        .directory_states()
        .into_iter()
        .find(|(path, _)| path == dir)
        .map(|(_, state)| state)
}

#[tokio::test]
async fn test_created_file_is_moved_to_its_destination() -> Result<()> {
    let ws = Workspace::new().await?;
    let handle = ws.start(fast_options()).await?;
    assert_eq!(handle.state(), SessionState::Watching);

    fs::write(ws.watched.join("app.log"), "started")?;

    assert!(wait_until(|| ws.logs.join("app.log").exists()).await);
    assert!(!ws.watched.join("app.log").exists());
    assert!(wait_until(|| ws.audit.count(Outcome::Ok) == 1).await);

    handle.stop(Duration::from_secs(1)).await;
    Ok(())
}

#[tokio::test]
async fn test_collision_gets_numbered_name() -> Result<()> {
    let ws = Workspace::new().await?;
    fs::write(ws.logs.join("app.log"), "old")?;
    let handle = ws.start(fast_options()).await?;

    fs::write(ws.watched.join("app.log"), "new")?;

    assert!(wait_until(|| ws.logs.join("app (1).log").exists()).await);
    assert_eq!(fs::read_to_string(ws.logs.join("app.log"))?, "old");
    assert_eq!(fs::read_to_string(ws.logs.join("app (1).log"))?, "new");

    handle.stop(Duration::from_secs(1)).await;
    Ok(())
}

#[tokio::test]
async fn test_unconfigured_file_stays_and_is_recorded() -> Result<()> {
    let ws = Workspace::new().await?;
    let handle = ws.start(fast_options()).await?;

    fs::write(ws.watched.join("notes.md"), "# todo")?;

    assert!(wait_until(|| ws.audit.count(Outcome::NotConfigured) >= 1).await);
    assert!(ws.watched.join("notes.md").exists());

    handle.stop(Duration::from_secs(1)).await;
    Ok(())
}

#[tokio::test]
async fn test_chunked_write_produces_single_sort() -> Result<()> {
    let ws = Workspace::new().await?;
    let handle = ws
        .start(SessionOptions {
            debounce: Duration::from_millis(400),
            ..fast_options()
        })
        .await?;

    let path = ws.watched.join("download.log");
    let mut file = fs::File::create(&path)?;
    for chunk in 0..5 {
        writeln!(file, "chunk {}", chunk)?;
        file.flush()?;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    drop(file);

    assert!(wait_until(|| ws.logs.join("download.log").exists()).await);
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(ws.audit.len(), 1);
    assert_eq!(fs::read_to_string(ws.logs.join("download.log"))?.lines().count(), 5);

    handle.stop(Duration::from_secs(1)).await;
    Ok(())
}

#[tokio::test]
async fn test_many_modifications_collapse_into_one_move() -> Result<()> {
    let ws = Workspace::new().await?;
    let handle = ws
        .start(SessionOptions {
            debounce: Duration::from_millis(300),
            ..fast_options()
        })
        .await?;

    let path = ws.watched.join("busy.log");
    for i in 0..100 {
        fs::write(&path, format!("revision {}", i))?;
    }

    assert!(wait_until(|| ws.audit.count(Outcome::Ok) == 1).await);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(ws.audit.count(Outcome::Ok), 1);
    assert_eq!(ws.audit.len(), 1);
    assert_eq!(fs::read_to_string(ws.logs.join("busy.log"))?, "revision 99");

    handle.stop(Duration::from_secs(1)).await;
    Ok(())
}

#[tokio::test]
async fn test_reload_applies_new_mappings() -> Result<()> {
    let ws = Workspace::new().await?;
    let handle = ws.start(fast_options()).await?;
    let texts = ws.root.path().join("texts");

    let mut map = ws.store.load().await?;
    map.insert(".txt", texts.clone());
    ws.store.save(&map).await?;
    tokio_test::assert_ok!(handle.reload_config().await);
    assert!(handle.snapshot().contains(".txt"));
    assert_eq!(handle.state(), SessionState::Watching);

    fs::write(ws.watched.join("readme.txt"), "hello")?;
    assert!(wait_until(|| texts.join("readme.txt").exists()).await);

    handle.stop(Duration::from_secs(1)).await;
    Ok(())
}

#[tokio::test]
async fn test_failed_reload_keeps_last_good_map() -> Result<()> {
    let ws = Workspace::new().await?;
    let handle = ws.start(fast_options()).await?;

    fs::write(ws.store.path(), "{ not json")?;
    let err = tokio_test::assert_err!(handle.reload_config().await);
    assert!(matches!(err, SorterError::ConfigUnavailable { .. }));
    assert_eq!(handle.state(), SessionState::Watching);
    assert!(handle.snapshot().contains(".log"));

    fs::write(ws.watched.join("still.log"), "sorted")?;
    assert!(wait_until(|| ws.logs.join("still.log").exists()).await);

    handle.stop(Duration::from_secs(1)).await;
    Ok(())
}

#[tokio::test]
async fn test_start_without_configs_creates_empty_file() -> Result<()> {
    let ws = Workspace::new().await?;
    let missing = Arc::new(JsonConfigStore::new(ws.root.path().join("fresh/configs.json")));

    let result = WatchSession::start(
        vec![ws.watched.clone()],
        fast_options(),
        Arc::clone(&missing),
        Arc::clone(&ws.audit),
    )
    .await;

    assert!(matches!(result, Err(SorterError::ConfigUnavailable { .. })));
    assert_eq!(fs::read_to_string(missing.path())?.trim(), "{}");
    Ok(())
}

#[tokio::test]
async fn test_start_rejects_invalid_directories() -> Result<()> {
    let ws = Workspace::new().await?;
    let file = ws.root.path().join("plain.txt");
    fs::write(&file, "not a dir")?;

    for dirs in [vec![], vec![file.clone()], vec![ws.root.path().join("nope")]] {
        let result = WatchSession::start(
            dirs,
            fast_options(),
            Arc::clone(&ws.store),
            Arc::clone(&ws.audit),
        )
        .await;
        assert!(matches!(result, Err(SorterError::InvalidTrackedDirectory { .. })));
    }
    Ok(())
}

#[tokio::test]
async fn test_stop_skips_files_still_debouncing() -> Result<()> {
    let ws = Workspace::new().await?;
    let handle = ws
        .start(SessionOptions {
            debounce: Duration::from_secs(30),
            ..fast_options()
        })
        .await?;

    fs::write(ws.watched.join("late.log"), "pending")?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    handle.stop(Duration::from_secs(1)).await;

    assert!(ws.audit.count(Outcome::SkippedAtShutdown) >= 1);
    assert_eq!(ws.audit.count(Outcome::Ok), 0);
    assert!(ws.watched.join("late.log").exists());
    Ok(())
}

#[tokio::test]
async fn test_failed_directory_does_not_stop_the_others() -> Result<()> {
    let ws = Workspace::new().await?;
    let doomed = ws.root.path().join("doomed");
    fs::create_dir_all(&doomed)?;
    let doomed = doomed.canonicalize()?;

    let handle = WatchSession::start(
        vec![ws.watched.clone(), doomed.clone()],
        fast_options(),
        Arc::clone(&ws.store),
        Arc::clone(&ws.audit),
    )
    .await?;

    fs::remove_dir_all(&doomed)?;
    assert!(wait_until(|| matches!(dir_state(&handle, &doomed), Some(DirectoryState::Failed(_)))).await);
    assert_eq!(handle.state(), SessionState::Watching);
    assert_eq!(dir_state(&handle, &ws.watched), Some(DirectoryState::Watching));

    fs::write(ws.watched.join("alive.log"), "ok")?;
    assert!(wait_until(|| ws.logs.join("alive.log").exists()).await);

    fs::remove_dir_all(&ws.watched)?;
    tokio::time::timeout(WAIT_LIMIT, handle.wait_failed()).await?;
    assert_eq!(handle.state(), SessionState::Failed);

    handle.stop(Duration::from_secs(1)).await;
    Ok(())
}

#[tokio::test]
async fn test_stop_during_copy_records_what_happened_to_the_file() -> Result<()> {
    const SIZE: usize = 128 * 1024 * 1024;

    let ws = Workspace::new().await?;
    let handle = ws
        .start(SessionOptions {
            move_strategy: MoveStrategy::CopyOnly,
            ..fast_options()
        })
        .await?;

    let staged = ws.root.path().join("huge.log");
    fs::write(&staged, vec![1u8; SIZE])?;
    let source = ws.watched.join("huge.log");
    fs::rename(&staged, &source)?;

    let destination = ws.logs.join("huge.log");
    assert!(wait_until(|| destination.exists()).await);
    handle.stop(Duration::from_millis(1)).await;

    let records = ws.audit.records();
    assert_eq!(records.len(), 1);
    match records[0].outcome {
        Outcome::Ok => {
            assert!(!source.exists());
            assert_eq!(fs::metadata(&destination)?.len(), SIZE as u64);
        }
        Outcome::ShutdownTimeout => {
            assert_eq!(fs::metadata(&source)?.len(), SIZE as u64);
            assert!(!destination.exists());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    Ok(())
}
