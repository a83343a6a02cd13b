use crate::core::session::SessionOptions;
use crate::utils::error::{Result, SorterError};
use crate::utils::validation::{validate_positive_number, validate_range, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 追蹤工作階段的 TOML 設定檔
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub tracking: TrackingSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingSettings {
    pub debounce_ms: Option<u64>,
    pub max_candidates: Option<u32>,
    pub workers: Option<usize>,
    pub grace_seconds: Option<u64>,
    pub channel_capacity: Option<usize>,
    pub watch_config: Option<bool>,
}

impl SettingsFile {
    /// 從 TOML 檔案載入設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析設定
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| SorterError::SettingsError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${SORTER_WORKERS})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SorterError::SettingsError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Overlays the file's values on `options`.
    pub fn apply(&self, options: &mut SessionOptions) {
        let tracking = &self.tracking;
        if let Some(ms) = tracking.debounce_ms {
            options.debounce = Duration::from_millis(ms);
        }
        if let Some(candidates) = tracking.max_candidates {
            options.max_candidates = candidates;
        }
        if let Some(workers) = tracking.workers {
            options.workers = workers;
        }
        if let Some(secs) = tracking.grace_seconds {
            options.grace_period = Duration::from_secs(secs);
        }
        if let Some(capacity) = tracking.channel_capacity {
            options.channel_capacity = capacity;
        }
    }

    pub fn watch_config(&self) -> bool {
        self.tracking.watch_config.unwrap_or(false)
    }
}

impl Validate for SettingsFile {
    fn validate(&self) -> Result<()> {
        let tracking = &self.tracking;
        if let Some(ms) = tracking.debounce_ms {
            validate_range("tracking.debounce_ms", ms, 10, 60_000)?;
        }
        if let Some(candidates) = tracking.max_candidates {
            validate_positive_number("tracking.max_candidates", candidates as usize, 1)?;
        }
        if let Some(workers) = tracking.workers {
            validate_positive_number("tracking.workers", workers, 1)?;
        }
        if let Some(capacity) = tracking.channel_capacity {
            validate_positive_number("tracking.channel_capacity", capacity, 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_tracking_settings() {
        let settings = SettingsFile::from_toml_str(
            r#"
[tracking]
debounce_ms = 750
max_candidates = 20
workers = 2
grace_seconds = 3
watch_config = true
"#,
        )
        .unwrap();

        let mut options = SessionOptions::default();
        settings.apply(&mut options);

        assert_eq!(options.debounce, Duration::from_millis(750));
        assert_eq!(options.max_candidates, 20);
        assert_eq!(options.workers, 2);
        assert_eq!(options.grace_period, Duration::from_secs(3));
        assert!(settings.watch_config());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_file_keeps_defaults() {
        let settings = SettingsFile::from_toml_str("").unwrap();
        let mut options = SessionOptions::default();
        settings.apply(&mut options);
        assert_eq!(options.debounce, SessionOptions::default().debounce);
        assert!(!settings.watch_config());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("AFS_TEST_WORKERS", "6");

        let settings = SettingsFile::from_toml_str("[tracking]\nworkers = ${AFS_TEST_WORKERS}\n").unwrap();
        assert_eq!(settings.tracking.workers, Some(6));

        std::env::remove_var("AFS_TEST_WORKERS");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let settings = SettingsFile::from_toml_str("[tracking]\nworkers = 0\n").unwrap();
        assert!(settings.validate().is_err());

        let settings = SettingsFile::from_toml_str("[tracking]\ndebounce_ms = 1\n").unwrap();
        assert!(settings.validate().is_err());

        assert!(SettingsFile::from_toml_str("[tracking]\nworkers = \"many\"\n").is_err());
    }

    #[test]
    fn test_settings_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[tracking]\nmax_candidates = 5\n").unwrap();

        let settings = SettingsFile::from_file(temp_file.path()).unwrap();
        assert_eq!(settings.tracking.max_candidates, Some(5));
    }
}
