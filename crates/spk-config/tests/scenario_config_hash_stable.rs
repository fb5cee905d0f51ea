//! Config hash stability.
//!
//! GREEN when:
//! - Same inputs produce the same hash.
//! - Reordering keys within YAML does not change the hash.
//! - An overlay layer overrides values and changes the hash.

use spk_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
reservation:
  duration_secs: 30
sessions:
  policy: "all_occupancy"
database:
  url_env: "SPK_DATABASE_URL"
"#;

const BASE_YAML_REORDERED: &str = r#"
database:
  url_env: "SPK_DATABASE_URL"
sessions:
  policy: "all_occupancy"
reservation:
  duration_secs: 30
"#;

const OVERLAY_YAML: &str = r#"
reservation:
  duration_secs: 900
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_overrides_and_changes_hash() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();

    assert_ne!(base.config_hash, layered.config_hash);
    assert_eq!(layered.config_json["reservation"]["duration_secs"], 900);
    // Untouched siblings survive the merge.
    assert_eq!(layered.config_json["sessions"]["policy"], "all_occupancy");
}

#[test]
fn empty_layer_is_ignored() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, ""]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}
