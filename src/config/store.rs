use crate::domain::model::ExtensionMap;
use crate::domain::ports::ConfigStore;
use crate::utils::error::{Result, SorterError};
use crate::utils::logger::CONFIG_TARGET;
use crate::utils::validation::{validate_absolute_path, validate_extension};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIGS_LOCATION: &str = "configs.json";

/// 以 JSON 檔案保存副檔名對應表
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, reason: impl Into<String>) -> SorterError {
        SorterError::ConfigUnavailable {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

/// Parses a flat `{".ext": "/abs/dir"}` object, normalizing and validating every entry.
pub fn parse_extension_map(source: &Path, content: &str) -> Result<ExtensionMap> {
    let unavailable = |reason: String| SorterError::ConfigUnavailable {
        path: source.to_path_buf(),
        reason,
    };

    let raw: BTreeMap<String, PathBuf> = serde_json::from_str(content)
        .map_err(|e| unavailable(format!("not a JSON object of extension paths: {}", e)))?;

    let mut map = ExtensionMap::new();
    for (extension, destination) in raw {
        let extension = validate_extension("extension", &extension).map_err(|e| unavailable(e.to_string()))?;
        validate_absolute_path(&extension, &destination).map_err(|e| unavailable(e.to_string()))?;
        map.insert(&extension, destination);
    }
    Ok(map)
}

fn to_pretty_json(map: &ExtensionMap) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    map.serialize(&mut serializer)?;
    buffer.push(b'\n');
    Ok(buffer)
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn load(&self) -> Result<ExtensionMap> {
        tracing::debug!("Opening {}", self.path.display());
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::error!(
                    "❌ Unable to find '{}', falling back to an empty configuration",
                    self.path.display()
                );
                self.save(&ExtensionMap::new()).await?;
                return Err(self.unavailable("file not found; an empty configuration was created"));
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(self.unavailable("permission denied"));
            }
            Err(e) => return Err(self.unavailable(format!("I/O error: {}", e))),
        };

        let map = parse_extension_map(&self.path, &content)?;
        tracing::info!(
            target: CONFIG_TARGET,
            severity = "CONFIG",
            "Read {} mapping(s) from {}",
            map.len(),
            self.path.display()
        );
        Ok(map)
    }

    async fn save(&self, map: &ExtensionMap) -> Result<()> {
        let bytes = to_pretty_json(map)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.unavailable(format!("cannot create directory: {}", e)))?;
        }

        // write-then-rename keeps the previous file intact on failure
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.unavailable(format!("cannot write: {}", e)));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.unavailable(format!("cannot replace: {}", e)));
        }

        tracing::info!(
            target: CONFIG_TARGET,
            severity = "CONFIG",
            "Saved {} mapping(s) to {}",
            map.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_keys() {
        let dir = std::env::temp_dir();
        let content = serde_json::json!({ ".LOG": dir }).to_string();

        let map = parse_extension_map(Path::new("configs.json"), &content).unwrap();
        assert_eq!(map.get(".log"), Some(dir.as_path()));
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        let dir = std::env::temp_dir();
        let bad_key = serde_json::json!({ "log": dir }).to_string();
        let relative = r#"{".log": "relative/logs"}"#;
        let not_object = r#"[".log"]"#;

        for content in [bad_key.as_str(), relative, not_object] {
            let err = parse_extension_map(Path::new("configs.json"), content).unwrap_err();
            assert!(matches!(err, SorterError::ConfigUnavailable { .. }), "{content}");
        }
    }

    #[test]
    fn test_pretty_json_uses_four_spaces() {
        let map: ExtensionMap = [(".log", "/archive/logs")].into_iter().collect();
        let text = String::from_utf8(to_pretty_json(&map).unwrap()).unwrap();
        assert_eq!(text, "{\n    \".log\": \"/archive/logs\"\n}\n");
    }
}
