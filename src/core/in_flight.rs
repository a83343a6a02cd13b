use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Source paths currently being sorted. The lock is only held for the
/// check-and-insert / remove, never across a move.
#[derive(Debug, Default)]
pub struct InFlightSet {
    // value: another ready signal arrived while the path was in flight
    paths: Mutex<HashMap<PathBuf, bool>>,
}

impl InFlightSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, bool>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 取得路徑的處理權；若已在處理中則標記為稍後重新評估並回傳 None
    pub fn try_acquire(self: &Arc<Self>, path: &Path) -> Option<InFlightGuard> {
        let mut paths = self.lock();
        if let Some(requeued) = paths.get_mut(path) {
            *requeued = true;
            return None;
        }
        paths.insert(path.to_path_buf(), false);
        Some(InFlightGuard {
            set: Arc::clone(self),
            path: path.to_path_buf(),
            released: false,
        })
    }

    fn release(&self, path: &Path) -> bool {
        self.lock().remove(path).unwrap_or(false)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Holds a path's slot; dropping it (e.g. on task abort) frees the slot.
#[derive(Debug)]
pub struct InFlightGuard {
    set: Arc<InFlightSet>,
    path: PathBuf,
    released: bool,
}

impl InFlightGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frees the slot and reports whether the path must be re-evaluated.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.set.release(&self.path)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.released {
            self.set.release(&self.path);
        }
    }
}
