//! Typed engine config
//!
//! GREEN when:
//! - a config with only `account.account_key` yields the documented defaults
//!   (page size 20, page delay 1.5 s, 8 h expiry, normal/not_canceled fallbacks);
//! - the derived `SyncContext` carries the configured values;
//! - invalid values (empty account, unknown margin mode, page size 0) fail;
//! - a literal secret anywhere in the tree fails with CONFIG_SECRET_DETECTED.

use std::time::Duration;

use reckon_config::load_layered_yaml_from_strings;
use reckon_model::MarginMode;

#[test]
fn minimal_config_uses_defaults() {
    let loaded = load_layered_yaml_from_strings(&["account:\n  account_key: \"MAIN\"\n"]).unwrap();
    let cfg = loaded.engine().unwrap();
    let ctx = cfg.sync_context();

    assert_eq!(ctx.account, "MAIN");
    assert_eq!(ctx.default_margin_mode, MarginMode::Cross);
    assert_eq!(ctx.page_size, 20);
    assert_eq!(ctx.page_delay, Duration::from_millis(1500));
    assert_eq!(ctx.default_expiry, Duration::from_secs(8 * 3600));
    assert_eq!(ctx.fallback_cancel_source, "not_canceled");
    assert_eq!(ctx.fallback_order_category, "normal");
    assert_eq!(cfg.broker_timeout(), Duration::from_secs(30));
}

#[test]
fn overrides_flow_into_sync_context() {
    let base = "account:\n  account_key: \"MAIN\"\n";
    let overlay = r#"
account:
  default_margin_mode: "isolated"
sync:
  page_size: 50
  page_delay_ms: 250
requests:
  default_expiry_secs: 60
"#;
    let cfg = load_layered_yaml_from_strings(&[base, overlay])
        .unwrap()
        .engine()
        .unwrap();
    let ctx = cfg.sync_context();
    assert_eq!(ctx.default_margin_mode, MarginMode::Isolated);
    assert_eq!(ctx.page_size, 50);
    assert_eq!(ctx.page_delay, Duration::from_millis(250));
    assert_eq!(ctx.default_expiry, Duration::from_secs(60));
}

#[test]
fn invalid_values_are_rejected() {
    for yaml in [
        "account:\n  account_key: \"\"\n",
        "account:\n  account_key: \"MAIN\"\n  default_margin_mode: \"hedge\"\n",
        "account:\n  account_key: \"MAIN\"\nsync:\n  page_size: 0\n",
    ] {
        let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
        let err = loaded.engine().unwrap_err().to_string();
        assert!(err.contains("CONFIG_INVALID"), "unexpected error: {err}");
    }
}

#[test]
fn literal_secret_is_rejected() {
    let yaml = r#"
account:
  account_key: "MAIN"
broker:
  keys_env:
    api_key: "sk-live-abc123secretvalue"
"#;
    let err = load_layered_yaml_from_strings(&[yaml]).unwrap_err().to_string();
    assert!(err.contains("CONFIG_SECRET_DETECTED"), "got: {err}");
    assert!(!err.contains("abc123"), "secret value must not leak: {err}");
}
