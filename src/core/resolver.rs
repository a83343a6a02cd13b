use crate::domain::model::{ExtensionMap, SortDecision};
use crate::utils::validation::is_valid_extension;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("file has no usable extension")]
    MissingExtension,

    #[error("no destination configured for '{0}'")]
    NotConfigured(String),
}

/// 取出檔案的副檔名並正規化為 `.ext` (小寫)；不符合格式者回傳 None
pub fn normalized_extension(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?;
    let dotted = format!(".{}", extension.to_lowercase());
    is_valid_extension(&dotted).then_some(dotted)
}

/// Maps a file to its destination directory using one snapshot of the map.
pub fn resolve(path: &Path, map: &ExtensionMap) -> Result<SortDecision, ResolveError> {
    let extension = normalized_extension(path).ok_or(ResolveError::MissingExtension)?;

    let destination_dir = map
        .get(&extension)
        .ok_or_else(|| ResolveError::NotConfigured(extension.clone()))?;

    Ok(SortDecision {
        source_path: path.to_path_buf(),
        destination_dir: destination_dir.to_path_buf(),
        extension,
    })
}
