//! Config hash stability
//!
//! GREEN when:
//! - the same layered input always hashes identically;
//! - key order inside a YAML document does not change the hash;
//! - an overlay that changes a value changes the hash.

use reckon_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
account:
  account_key: "MAIN"
  default_margin_mode: "cross"
sync:
  page_size: 20
  page_delay_ms: 1500
broker:
  keys_env:
    api_key: "BLOFIN_API_KEY_MAIN"
    api_secret: "BLOFIN_API_SECRET_MAIN"
    passphrase: "BLOFIN_PASSPHRASE_MAIN"
"#;

const BASE_YAML_REORDERED: &str = r#"
broker:
  keys_env:
    passphrase: "BLOFIN_PASSPHRASE_MAIN"
    api_secret: "BLOFIN_API_SECRET_MAIN"
    api_key: "BLOFIN_API_KEY_MAIN"
sync:
  page_delay_ms: 1500
  page_size: 20
account:
  default_margin_mode: "cross"
  account_key: "MAIN"
"#;

const OVERLAY_YAML: &str = r#"
sync:
  page_size: 50
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash, "hash must be deterministic");
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        a.config_hash, b.config_hash,
        "reordered keys must canonicalize to the same hash"
    );
}

#[test]
fn overlay_changes_hash_and_value() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, layered.config_hash);
    assert_eq!(layered.config_json["sync"]["page_size"], 50);
    assert_eq!(
        layered.config_json["sync"]["page_delay_ms"], 1500,
        "overlay must not drop sibling keys"
    );
}
