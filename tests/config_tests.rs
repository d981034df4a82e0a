//! Configuration loading tests

use queryguard::Config;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn partial_file_is_filled_with_defaults() {
    let file = write_config(
        r#"
        [security]
        mode = "read_write"

        [cache]
        enabled = false
        "#,
    );

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.security.mode, "read_write");
    assert!(!config.cache.enabled);
    // Everything unspecified falls back to defaults
    assert_eq!(config.app.name, "queryguard");
    assert_eq!(config.execution.isolation_level, "basic");
    assert_eq!(config.evolution.max_patterns, 5000);
}

#[test]
fn nested_sections_are_parsed() {
    let file = write_config(
        r#"
        [security.input_validation]
        min_entropy = 1.0
        max_entropy = 4.5

        [security.resource_limits]
        max_rows = 50

        [execution.timeout]
        total = "2s"

        [audit.storage]
        type = "file"
        path = "/tmp/queryguard-audit"
        "#,
    );

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.security.input_validation.min_entropy, 1.0);
    assert_eq!(config.security.input_validation.max_entropy, 4.5);
    assert_eq!(config.security.resource_limits.max_rows, 50);
    assert_eq!(config.execution.timeout.total, "2s");
    assert_eq!(config.audit.storage.path, "/tmp/queryguard-audit");
}

#[test]
fn invalid_values_fail_validation_on_load() {
    let file = write_config(
        r#"
        [security]
        mode = "god_mode"
        "#,
    );

    let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("security.mode"));
}

#[test]
fn serialized_config_round_trips_through_a_file() {
    let mut config = Config::default();
    config.security.mode = "restricted".to_string();
    config.cache.size = 42;

    let rendered = toml::to_string(&config).unwrap();
    let file = write_config(&rendered);

    let reloaded = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(reloaded.security.mode, "restricted");
    assert_eq!(reloaded.cache.size, 42);
    assert_eq!(reloaded.security.forbidden_keywords, config.security.forbidden_keywords);
}

#[test]
fn forbidden_keywords_override_replaces_defaults() {
    let file = write_config(
        r#"
        [security]
        forbidden_keywords = ["MERGE", "CALL"]
        "#,
    );

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.security.forbidden_keywords, vec!["MERGE", "CALL"]);
}
