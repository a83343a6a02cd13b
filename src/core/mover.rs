use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

const COPY_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum MoveFailure {
    #[error("source disappeared before it could be moved")]
    SourceVanished,

    #[error("destination '{}' was created by someone else before the move", .0.display())]
    DestinationTaken(PathBuf),

    #[error("copy could not be verified, destination removed and source kept: {0}")]
    PartialMoveRolledBack(String),

    #[error("permission denied: {0}")]
    PermissionDenied(io::Error),

    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("move abandoned at shutdown, destination removed and source kept")]
    Cancelled,
}

impl From<io::Error> for MoveFailure {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => MoveFailure::SourceVanished,
            io::ErrorKind::PermissionDenied => MoveFailure::PermissionDenied(err),
            _ => MoveFailure::Io(err),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MoveStrategy {
    /// rename(2) first, copy+delete when the rename crosses volumes
    #[default]
    RenameFirst,
    /// Always copy, verify and delete the source
    CopyOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMethod {
    Renamed,
    Copied,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Mover {
    strategy: MoveStrategy,
}

impl Mover {
    pub fn new(strategy: MoveStrategy) -> Self {
        Self { strategy }
    }

    /// 搬移單一檔案。目的地名稱以 create_new 原子地佔用，
    /// 來源檔只會在目的地寫入並驗證後才刪除。
    pub fn move_file(&self, source: &Path, destination: &Path) -> Result<MoveMethod, MoveFailure> {
        self.move_file_until(source, destination, &AtomicBool::new(false))
    }

    /// Same as [`Mover::move_file`], but gives up with [`MoveFailure::Cancelled`]
    /// once `cancel` is set. Checked before the rename and between copied chunks;
    /// a completed rename is never undone.
    pub fn move_file_until(
        &self,
        source: &Path,
        destination: &Path,
        cancel: &AtomicBool,
    ) -> Result<MoveMethod, MoveFailure> {
        let source_meta = fs::metadata(source)?;
        if !source_meta.is_file() {
            return Err(MoveFailure::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is not a regular file", source.display()),
            )));
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| match e.kind() {
                io::ErrorKind::PermissionDenied => MoveFailure::PermissionDenied(e),
                _ => MoveFailure::Io(e),
            })?;
        }

        claim_destination(destination)?;

        if self.strategy == MoveStrategy::RenameFirst {
            if cancel.load(Ordering::Acquire) {
                release_claim(destination);
                return Err(MoveFailure::Cancelled);
            }

            match fs::rename(source, destination) {
                Ok(()) => {
                    tracing::debug!("Renamed {} -> {}", source.display(), destination.display());
                    return Ok(MoveMethod::Renamed);
                }
                Err(e) if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                ) =>
                {
                    release_claim(destination);
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::debug!(
                        "Rename {} -> {} failed ({}), falling back to copy",
                        source.display(),
                        destination.display(),
                        e
                    );
                }
            }
        }

        copy_then_remove(source, destination, &source_meta, cancel)?;
        Ok(MoveMethod::Copied)
    }
}

fn claim_destination(destination: &Path) -> Result<(), MoveFailure> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(MoveFailure::DestinationTaken(destination.to_path_buf()))
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(MoveFailure::PermissionDenied(e)),
        Err(e) => Err(MoveFailure::Io(e)),
    }
}

fn release_claim(destination: &Path) {
    if let Err(e) = fs::remove_file(destination) {
        tracing::warn!("⚠️ Could not remove placeholder {}: {}", destination.display(), e);
    }
}

fn copy_then_remove(
    source: &Path,
    destination: &Path,
    source_meta: &fs::Metadata,
    cancel: &AtomicBool,
) -> Result<(), MoveFailure> {
    if let Err(failure) = copy_chunks(source, destination, source_meta, cancel) {
        release_claim(destination);
        return Err(failure);
    }

    verify_copy(source_meta.len(), destination)?;
    remove_source_after_copy(source, destination)?;

    tracing::debug!("Copied {} -> {}", source.display(), destination.display());
    Ok(())
}

fn copy_chunks(
    source: &Path,
    destination: &Path,
    source_meta: &fs::Metadata,
    cancel: &AtomicBool,
) -> Result<(), MoveFailure> {
    let mut reader = File::open(source)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(destination)
        .map_err(MoveFailure::Io)?;
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];

    loop {
        if cancel.load(Ordering::Acquire) {
            return Err(MoveFailure::Cancelled);
        }
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        writer.write_all(&buffer[..read]).map_err(MoveFailure::Io)?;
    }

    writer.sync_all().map_err(MoveFailure::Io)?;
    fs::set_permissions(destination, source_meta.permissions()).map_err(MoveFailure::Io)?;
    Ok(())
}

/// Deletes the source of a verified copy. If the source is already gone the
/// copy is the only one left, so it stays.
pub(crate) fn remove_source_after_copy(source: &Path, destination: &Path) -> Result<(), MoveFailure> {
    match fs::remove_file(source) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(
                "⚠️ {} disappeared after being copied, keeping {}",
                source.display(),
                destination.display()
            );
            Ok(())
        }
        Err(e) => {
            // source must never disappear without its copy, nor stay with a duplicate
            release_claim(destination);
            Err(e.into())
        }
    }
}

/// Compares the written size with the source size; a mismatch removes the destination.
pub(crate) fn verify_copy(expected_len: u64, destination: &Path) -> Result<(), MoveFailure> {
    let written = match fs::metadata(destination) {
        Ok(meta) => meta.len(),
        Err(e) => {
            release_claim(destination);
            return Err(MoveFailure::PartialMoveRolledBack(format!(
                "destination unreadable after copy: {}",
                e
            )));
        }
    };

    if written != expected_len {
        release_claim(destination);
        return Err(MoveFailure::PartialMoveRolledBack(format!(
            "wrote {} of {} bytes",
            written, expected_len
        )));
    }

    Ok(())
}
