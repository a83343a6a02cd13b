//! `write` / `read` subcommands: edit and inspect the extension map.

use crate::config::store::parse_extension_map;
use crate::domain::model::ExtensionMap;
use crate::domain::ports::ConfigStore;
use crate::utils::error::{Result, SorterError};
use crate::utils::logger::CONFIG_TARGET;
use crate::utils::validation::{validate_absolute_path, validate_extension};
use std::path::PathBuf;

/// Changes requested by one `write` invocation, applied in order: load, add, delete.
#[derive(Debug, Clone, Default)]
pub struct ConfigChanges {
    pub add: Option<(String, PathBuf)>,
    pub delete: Vec<String>,
    pub load: Vec<PathBuf>,
}

impl ConfigChanges {
    pub fn is_empty(&self) -> bool {
        self.add.is_none() && self.delete.is_empty() && self.load.is_empty()
    }
}

/// 套用變更並只儲存一次；任何一筆無效時整體不寫入
pub async fn handle_write<S: ConfigStore>(store: &S, changes: &ConfigChanges) -> Result<ExtensionMap> {
    if changes.is_empty() {
        return Err(SorterError::InvalidConfigValueError {
            field: "write".to_string(),
            value: String::new(),
            reason: "nothing to do, pass --add, --delete or --load".to_string(),
        });
    }

    let mut map = store.load().await?;

    for source in &changes.load {
        let content = tokio::fs::read_to_string(source)
            .await
            .map_err(|e| SorterError::ConfigUnavailable {
                path: source.clone(),
                reason: e.to_string(),
            })?;
        let loaded = parse_extension_map(source, &content)?;
        tracing::info!(
            target: CONFIG_TARGET,
            severity = "CONFIG",
            "📥 Merging {} mapping(s) from {}",
            loaded.len(),
            source.display()
        );
        map.merge(loaded);
    }

    if let Some((extension, destination)) = &changes.add {
        let extension = validate_extension("extension", extension)?;
        validate_absolute_path(&extension, destination)?;
        match map.insert(&extension, destination.clone()) {
            Some(previous) => tracing::info!(
                target: CONFIG_TARGET,
                severity = "CONFIG",
                "✏️ {} now sorts into {} (was {})",
                extension,
                destination.display(),
                previous.display()
            ),
            None => tracing::info!(
                target: CONFIG_TARGET,
                severity = "CONFIG",
                "➕ Added {} -> {}",
                extension,
                destination.display()
            ),
        }
    }

    for extension in &changes.delete {
        match map.remove(extension) {
            Some(destination) => tracing::info!(
                target: CONFIG_TARGET,
                severity = "CONFIG",
                "➖ Deleted {} (was {})",
                extension.to_lowercase(),
                destination.display()
            ),
            None => tracing::warn!("⚠️ '{}' is not in the configs, nothing to delete", extension),
        }
    }

    store.save(&map).await?;
    Ok(map)
}

/// Returns the requested mappings (all of them when `extensions` is empty).
pub async fn handle_read<S: ConfigStore>(store: &S, extensions: &[String]) -> Result<Vec<(String, PathBuf)>> {
    let map = store.load().await?;

    if extensions.is_empty() {
        return Ok(map
            .iter()
            .map(|(ext, dir)| (ext.to_string(), dir.to_path_buf()))
            .collect());
    }

    let mut found = Vec::with_capacity(extensions.len());
    for extension in extensions {
        match map.get(extension) {
            Some(dir) => found.push((extension.to_lowercase(), dir.to_path_buf())),
            None => tracing::warn!("⚠️ No destination configured for '{}'", extension),
        }
    }
    Ok(found)
}
