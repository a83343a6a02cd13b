use crate::utils::error::{Result, SorterError};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// 副檔名格式：一個點後接一個以上的英數字
pub static FILE_EXTENSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.[A-Za-z0-9]+$").expect("extension pattern is valid"));

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn is_valid_extension(extension: &str) -> bool {
    FILE_EXTENSION_PATTERN.is_match(extension)
}

/// 驗證並正規化副檔名 (轉小寫)
pub fn validate_extension(field_name: &str, extension: &str) -> Result<String> {
    if !is_valid_extension(extension) {
        return Err(SorterError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: extension.to_string(),
            reason: "Extension must be a dot followed by letters or digits, e.g. '.txt'".to_string(),
        });
    }
    Ok(extension.to_lowercase())
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(SorterError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(SorterError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_absolute_path(field_name: &str, path: &Path) -> Result<()> {
    validate_path(field_name, &path.to_string_lossy())?;
    if !path.is_absolute() {
        return Err(SorterError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.display().to_string(),
            reason: "Path must be absolute".to_string(),
        });
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(SorterError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(SorterError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_extensions() {
        for ext in [".TXT", ".zip", ".7z", ".123", ".PnG", ".Jp2"] {
            assert!(is_valid_extension(ext), "{ext} should be accepted");
        }
    }

    #[test]
    fn test_invalid_extensions() {
        for ext in ["TXT", "zip", "_7z_", "-123", ".PnG!", ".Jp2@", "/doc", "", "."] {
            assert!(!is_valid_extension(ext), "{ext:?} should be rejected");
        }
    }

    #[test]
    fn test_validate_extension_lowercases() {
        assert_eq!(validate_extension("extension", ".PnG").unwrap(), ".png");
        assert!(validate_extension("extension", "png").is_err());
    }

    #[test]
    fn test_validate_absolute_path() {
        let absolute = std::env::temp_dir();
        assert!(validate_absolute_path("destination", &absolute).is_ok());
        assert!(validate_absolute_path("destination", Path::new("relative/dir")).is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("workers", 4, 1).is_ok());
        assert!(validate_positive_number("workers", 0, 1).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("debounce_ms", 500u64, 50, 60_000).is_ok());
        assert!(validate_range("debounce_ms", 10u64, 50, 60_000).is_err());
    }
}
