use std::path::Path;

use crate::config::schema::Config;
use crate::dupes::NameClass;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.image_extensions.is_empty() {
        return Err(ConfigError::Validation {
            message: "image_extensions must not be empty".to_string(),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be greater than zero".to_string(),
        });
    }

    if config.discovery_batch_size == 0 || config.hash_batch_size == 0 {
        return Err(ConfigError::Validation {
            message: "batch sizes must be greater than zero".to_string(),
        });
    }

    if config.monitor_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "monitor_interval_ms must be greater than zero".to_string(),
        });
    }

    for pattern in &config.exclude_patterns {
        if let Err(e) = glob::Pattern::new(pattern) {
            return Err(ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            });
        }
    }

    // The originality ranking must mention each name class exactly once,
    // otherwise duplicate ordering would be ambiguous.
    let prefer = &config.duplicates.prefer;
    for class in [NameClass::Clean, NameClass::NumberedCopy, NameClass::CopyNamed] {
        if prefer.iter().filter(|c| **c == class).count() != 1 {
            return Err(ConfigError::Validation {
                message: format!(
                    "duplicates.prefer must list each name class exactly once (missing or repeated: {:?})",
                    class
                ),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> String {
        r#"{ "version": "1.0", "scan_roots": ["/pics"] }"#.to_string()
    }

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_from_str(&minimal_config()).unwrap();
        assert_eq!(config.scan_roots, vec!["/pics".to_string()]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, minimal_config()).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.version, "1.0");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_config("/nonexistent/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let err =
            load_config_from_str(r#"{ "version": "2.0", "scan_roots": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = load_config_from_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }

    #[test]
    fn test_bad_exclude_pattern_rejected() {
        let json = r#"{ "version": "1.0", "scan_roots": [], "exclude_patterns": ["[oops"] }"#;
        let err = load_config_from_str(json).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_zero_worker_count_rejected() {
        let json = r#"{ "version": "1.0", "scan_roots": [], "worker_count": 0 }"#;
        let err = load_config_from_str(json).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_incomplete_duplicate_policy_rejected() {
        let json = r#"{
            "version": "1.0",
            "scan_roots": [],
            "duplicates": { "prefer": ["clean", "clean", "copy_named"] }
        }"#;
        let err = load_config_from_str(json).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_custom_duplicate_policy_accepted() {
        let json = r#"{
            "version": "1.0",
            "scan_roots": [],
            "duplicates": { "prefer": ["copy_named", "numbered_copy", "clean"] }
        }"#;
        let config = load_config_from_str(json).unwrap();
        assert_eq!(config.duplicates.prefer[0], NameClass::CopyNamed);
    }
}
