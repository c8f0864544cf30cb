// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::VigilConfig;

/// Longest busy timeout accepted, in milliseconds.
pub const MAX_BUSY_TIMEOUT_MS: u64 = 600_000;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &VigilConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let path = config.storage.database_path.trim();
    if path.is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    } else if path == ":memory:" || path.starts_with("file::memory:") {
        // No file means no header counter and nothing for the kernel to watch.
        errors.push(ConfigError::Validation {
            message: format!("storage.database_path `{path}` must name a file on disk"),
        });
    }

    if config.storage.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
        errors.push(ConfigError::Validation {
            message: format!(
                "storage.busy_timeout_ms must be at most {MAX_BUSY_TIMEOUT_MS}, got {}",
                config.storage.busy_timeout_ms
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = VigilConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = VigilConfig::default();
        config.storage.database_path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
    }

    #[test]
    fn in_memory_database_fails_validation() {
        let mut config = VigilConfig::default();
        config.storage.database_path = ":memory:".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("on disk"))));
    }

    #[test]
    fn errors_are_collected_not_fail_fast() {
        let mut config = VigilConfig::default();
        config.storage.database_path = String::new();
        config.storage.busy_timeout_ms = MAX_BUSY_TIMEOUT_MS + 1;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn zero_busy_timeout_is_allowed() {
        let mut config = VigilConfig::default();
        config.storage.busy_timeout_ms = 0;
        assert!(validate_config(&config).is_ok());
    }
}
