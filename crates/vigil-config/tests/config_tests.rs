// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Vigil configuration system.

use vigil_config::diagnostic::ConfigError;
use vigil_config::model::VigilConfig;
use vigil_config::{load_and_validate_str, load_config_from_path, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_vigil_config() {
    let toml = r#"
[storage]
database_path = "/tmp/notes.db"
busy_timeout_ms = 250
monitor_external_changes = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.storage.database_path, "/tmp/notes.db");
    assert_eq!(config.storage.busy_timeout_ms, 250);
    assert_eq!(
        config.storage.busy_timeout(),
        std::time::Duration::from_millis(250)
    );
    assert!(!config.storage.monitor_external_changes);
}

/// Empty input yields the compiled defaults.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty config should parse");
    assert!(config.storage.database_path.ends_with("vigil.db"));
    assert_eq!(config.storage.busy_timeout_ms, 5_000);
    assert!(config.storage.monitor_external_changes);
}

/// Dot-notation overrides, which the `VIGIL_STORAGE_*` env mapping produces,
/// land on the right field.
#[test]
fn dotted_override_sets_storage_field() {
    use figment::{providers::Serialized, Figment};

    let config: VigilConfig = Figment::new()
        .merge(Serialized::defaults(VigilConfig::default()))
        .merge(("storage.database_path", "/var/lib/vigil/app.db"))
        .merge(("storage.monitor_external_changes", false))
        .extract()
        .expect("should accept dotted overrides");

    assert_eq!(config.storage.database_path, "/var/lib/vigil/app.db");
    assert!(!config.storage.monitor_external_changes);
}

/// A config file that does not exist is skipped rather than rejected.
#[test]
fn missing_config_file_silently_skipped() {
    let config = load_config_from_path(std::path::Path::new("/nonexistent/vigil.toml"))
        .expect("missing file should be silently skipped");
    assert_eq!(config.storage.busy_timeout_ms, 5_000);
}

/// Unknown section is rejected by deny_unknown_fields.
#[test]
fn unknown_top_level_section_rejected() {
    let toml = r#"
[logging]
level = "debug"
"#;

    let err = load_config_from_str(toml).expect_err("unknown section should be rejected");
    let err_str = err.to_string();
    assert!(
        err_str.contains("unknown field") || err_str.contains("logging"),
        "error should mention unknown field, got: {err_str}"
    );
}

/// A typo in [storage] produces an UnknownKey diagnostic with a suggestion.
#[test]
fn typo_in_storage_suggests_correct_key() {
    let toml = r#"
[storage]
databse_path = "/tmp/x.db"
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "databse_path"
                && suggestion.as_deref() == Some("database_path")
                && valid_keys.contains("busy_timeout_ms")
        })
    });
    assert!(found, "expected UnknownKey for databse_path, got: {errors:?}");
}

/// Wrong value type is reported as InvalidType.
#[test]
fn wrong_type_reports_invalid_type() {
    let toml = r#"
[storage]
busy_timeout_ms = "soon"
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { detail, .. } if detail.contains("found"))),
        "got: {errors:?}"
    );
}

/// Semantic validation runs after a successful parse.
#[test]
fn validation_rejects_in_memory_path() {
    let toml = r#"
[storage]
database_path = ":memory:"
"#;

    let errors = load_and_validate_str(toml).expect_err("in-memory path must be rejected");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("database_path"))));
}

/// Diagnostics render through miette without panicking.
#[test]
fn config_error_renders_with_miette() {
    let toml = r#"
[storage]
monitor_external_change = true
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let handler = miette::GraphicalReportHandler::new();
    for error in &errors {
        let mut buf = String::new();
        handler
            .render_report(&mut buf, error as &dyn miette::Diagnostic)
            .expect("render should succeed");
        assert!(buf.contains("monitor_external_change"), "rendered: {buf}");
    }
}
