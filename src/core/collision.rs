use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_MAX_CANDIDATES: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no free name for '{}' after {tried} candidates", base.display())]
pub struct CollisionExhausted {
    pub base: PathBuf,
    pub tried: u32,
}

/// `name.ext` → `name (n).ext`; files without extension become `name (n)`
pub fn disambiguated_name(base_name: &Path, n: u32) -> OsString {
    let stem = base_name
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| base_name.as_os_str().to_os_string());

    let mut name = stem;
    name.push(format!(" ({})", n));
    if let Some(ext) = base_name.extension() {
        name.push(".");
        name.push(ext);
    }
    name
}

/// Picks a destination path that does not exist yet. Advisory only: the mover
/// re-checks atomically when it claims the name.
pub fn resolve_name(
    destination_dir: &Path,
    base_name: &Path,
    max_candidates: u32,
) -> Result<PathBuf, CollisionExhausted> {
    let candidate = destination_dir.join(base_name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    for n in 1..=max_candidates {
        let candidate = destination_dir.join(disambiguated_name(base_name, n));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(CollisionExhausted {
        base: destination_dir.join(base_name),
        tried: max_candidates,
    })
}
