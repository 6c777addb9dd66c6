//! Integration tests for config loading from the fixture file.
//!
//! These tests verify that the sample config file matches what the review binary expects.

use std::fs;
use std::path::Path;

use hydrus_review::duplicates::{BufferOptions, SearchFilter};

/// Read the sample config file content.
fn read_sample_config() -> String {
    let config_path = Path::new("tests/fixtures/sample_config.toml");
    fs::read_to_string(config_path).expect("Failed to read sample config file")
}

fn review_section() -> toml::Value {
    let value: toml::Value = toml::from_str(&read_sample_config()).expect("should parse");
    value.get("review").cloned().expect("should have review section")
}

#[test]
fn sample_config_file_exists() {
    let config_path = Path::new("tests/fixtures/sample_config.toml");
    assert!(config_path.exists(), "Sample config file should exist");
}

#[test]
fn sample_config_is_valid_toml() {
    let config_content = read_sample_config();
    let result: Result<toml::Value, _> = toml::from_str(&config_content);
    assert!(result.is_ok(), "Sample config should be valid TOML: {:?}", result.err());
}

#[test]
fn review_section_has_expected_structure() {
    let review = review_section();

    for key in [
        "url",
        "key",
        "tags",
        "buffer_size",
        "max_failures",
        "backoff_ms",
        "max_backoff_ms",
        "diff_dir",
        "dryrun",
        "verbose",
    ] {
        assert!(review.get(key).is_some(), "[review] should have {key}");
    }
}

#[test]
fn config_values_have_correct_types() {
    let review = review_section();

    assert!(review.get("url").and_then(toml::Value::as_str).is_some());
    assert!(review.get("key").and_then(toml::Value::as_str).is_some());
    assert!(review.get("diff_dir").and_then(toml::Value::as_str).is_some());
    assert!(review.get("tags").and_then(toml::Value::as_array).is_some());
    assert!(review.get("buffer_size").and_then(toml::Value::as_integer).is_some());
    assert!(review.get("max_failures").and_then(toml::Value::as_integer).is_some());
    assert!(review.get("dryrun").and_then(toml::Value::as_bool).is_some());
    assert!(review.get("verbose").and_then(toml::Value::as_bool).is_some());
}

#[test]
fn sample_values_match_library_defaults() {
    let review = review_section();
    let defaults = BufferOptions::default();

    let integer = |key: &str| review.get(key).and_then(toml::Value::as_integer).expect("integer value");
    assert_eq!(integer("buffer_size"), defaults.capacity.get() as i64);
    assert_eq!(integer("max_failures"), i64::from(defaults.max_failures.get()));
    assert_eq!(integer("backoff_ms"), defaults.backoff.as_millis() as i64);
    assert_eq!(integer("max_backoff_ms"), defaults.max_backoff.as_millis() as i64);
}

#[test]
fn sample_tags_include_default_search() {
    let review = review_section();
    let tags: Vec<&str> = review
        .get("tags")
        .and_then(toml::Value::as_array)
        .expect("tags array")
        .iter()
        .filter_map(toml::Value::as_str)
        .collect();

    for tag in SearchFilter::default().tags {
        assert!(tags.contains(&tag.as_str()), "sample tags should include {tag}");
    }
}

#[test]
fn sample_url_uses_default_port() {
    let review = review_section();
    let url = review.get("url").and_then(toml::Value::as_str).expect("url");
    assert!(url.starts_with("http://"));
    assert!(url.ends_with(":45869"));
}
