//! Edge Case Testing
//!
//! This module tests edge cases and boundary conditions to ensure Sqlbridge
//! handles unusual inputs gracefully. Tests include:
//! - Unicode logical names and captured parameters
//! - Deeply nested template structures
//! - Placeholder tokens in unusual positions
//! - Patterns with many, optional, or no capture groups
//! - Configuration documents with minimal or unusual shapes

#![cfg(feature = "mysql")]

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use sqlbridge::{BridgeError, ConfigRegistry, TemplateValue};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn write_config(root: &Path, rel_path: &str, contents: &str) {
    let path = root.join(rel_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create config subdirectory");
    }
    fs::write(path, contents).expect("Failed to write config file");
}

fn load_single(contents: &str) -> ConfigRegistry {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "config.yml", contents);
    ConfigRegistry::load_default(dir.path()).expect("Load should succeed")
}

const CONNECTION: &str = "connection: {host: h, user: u, password: p, port: 3306, db: d}";

// ============================================================================
// Unicode
// ============================================================================

#[test]
fn test_unicode_captures_substitute_correctly() {
    let registry = load_single(&format!(
        "identifier: '^kunden_(\\w+)$'\ndriver: mysql\n{CONNECTION}\ngreeting: 'Grüße aus {{{{0}}}}'\n"
    ));

    let db = registry.resolve("kunden_münchen").unwrap();
    let greeting = db.field("greeting").unwrap();
    assert_eq!(greeting.as_str(), Some("Grüße aus münchen"));
}

// ============================================================================
// Capture Group Shapes
// ============================================================================

#[test]
fn test_pattern_with_no_capture_groups() {
    let registry = load_single(&format!(
        "identifier: '^static$'\ndriver: mysql\n{CONNECTION}\nlabel: 'no params here'\n"
    ));

    let db = registry.resolve("static").unwrap();
    assert!(db.capture_args().is_empty());
    assert_eq!(db.field("label").unwrap().as_str(), Some("no params here"));
}

#[test]
fn test_pattern_with_many_capture_groups() {
    let registry = load_single(&format!(
        "identifier: '^shard_(\\d+)_(\\d+)_(\\w+)$'\ndriver: mysql\n{CONNECTION}\ntarget: '{{{{2}}}}-{{{{0}}}}-{{{{1}}}}'\n"
    ));

    let db = registry.resolve("shard_3_14_eu").unwrap();
    assert_eq!(db.capture_args(), &["3".to_string(), "14".to_string(), "eu".to_string()]);
    assert_eq!(db.field("target").unwrap().as_str(), Some("eu-3-14"));
}

#[test]
fn test_optional_group_substitutes_empty() {
    let registry = load_single(&format!(
        "identifier: '^db(_replica)?$'\ndriver: mysql\n{CONNECTION}\nsuffix: 'role{{{{0}}}}'\n"
    ));

    let primary = registry.resolve("db").unwrap();
    assert_eq!(primary.field("suffix").unwrap().as_str(), Some("role"));

    let replica = registry.resolve("db_replica").unwrap();
    assert_eq!(replica.field("suffix").unwrap().as_str(), Some("role_replica"));
}

// ============================================================================
// Template Structures
// ============================================================================

#[test]
fn test_deeply_nested_template_resolution() {
    let registry = load_single(&format!(
        r"
identifier: '^tenant_(\w+)$'
driver: mysql
{CONNECTION}
reports:
  daily:
    source: 'events_{{{{0}}}}'
    options:
      schema: 'tenant_{{{{0}}}}_schema'
  static_limit: 500
",
    ));

    let db = registry.resolve("tenant_acme").unwrap();
    let reports = db.field("reports").unwrap();
    let reports = reports.as_mapping().unwrap();

    let daily = reports["daily"].as_mapping().unwrap();
    assert_eq!(daily["source"].as_str(), Some("events_acme"));

    let options = daily["options"].as_mapping().unwrap();
    assert_eq!(options["schema"].as_str(), Some("tenant_acme_schema"));

    // Non-string leaves pass through untouched
    assert_eq!(reports["static_limit"], TemplateValue::Integer(500));
}

#[test]
fn test_token_at_string_boundaries() {
    let registry = load_single(&format!(
        "identifier: '^b_(\\w+)$'\ndriver: mysql\n{CONNECTION}\nedges: '{{{{0}}}}-middle-{{{{0}}}}'\n"
    ));

    let db = registry.resolve("b_x").unwrap();
    assert_eq!(db.field("edges").unwrap().as_str(), Some("x-middle-x"));
}

#[test]
fn test_substitution_error_in_nested_leaf_fails_whole_field() {
    let registry = load_single(&format!(
        r"
identifier: '^n_(\w+)$'
driver: mysql
{CONNECTION}
nested:
  fine: '{{{{0}}}}'
  broken: '{{{{3}}}}'
",
    ));

    let db = registry.resolve("n_ok").unwrap();
    let err = db.field("nested").unwrap_err();
    assert!(matches!(err, BridgeError::Substitution { index: 3, available: 1 }));
}

// ============================================================================
// Document Shapes
// ============================================================================

#[test]
fn test_minimal_document_without_extra_fields() {
    let registry = load_single(&format!("identifier: '^bare$'\ndriver: mysql\n{CONNECTION}\n"));

    let db = registry.resolve("bare").unwrap();
    let err = db.field("missing").unwrap_err();
    assert!(matches!(err, BridgeError::InvalidInput(_)));
}

#[test]
fn test_identifier_matching_is_case_sensitive() {
    let registry = load_single(&format!("identifier: '^Prod$'\ndriver: mysql\n{CONNECTION}\n"));

    assert!(registry.resolve("Prod").is_ok());
    assert!(matches!(registry.resolve("prod").unwrap_err(), BridgeError::NoMatch(_)));
}

#[test]
fn test_long_logical_name_resolves() {
    let registry = load_single(&format!(
        "identifier: '^big_(\\w+)$'\ndriver: mysql\n{CONNECTION}\necho: '{{{{0}}}}'\n"
    ));

    let long_region = "r".repeat(4096);
    let db = registry.resolve(&format!("big_{long_region}")).unwrap();
    assert_eq!(db.field("echo").unwrap().as_str(), Some(long_region.as_str()));
}
