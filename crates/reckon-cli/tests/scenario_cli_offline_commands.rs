//! CLI commands that need no database or exchange
//!
//! # Behavior under test
//! - `config hash` prints a stable hash and the canonical JSON of the merged
//!   layers; a later layer changes the hash;
//! - a literal secret in config aborts with CONFIG_SECRET_DETECTED;
//! - `submit` validates its flags before any IO;
//! - `cancel` needs a selector;
//! - `db status` without RECKON_DATABASE_URL names the missing variable.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
}

fn config(name: &str) -> String {
    config_dir().join(name).to_string_lossy().to_string()
}

/// Scratch directory with no `.env.local`.
fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("reckon-cli-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn reckon(cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("reckon").unwrap();
    cmd.current_dir(cwd).env_remove("RECKON_DATABASE_URL");
    cmd
}

fn hash_line(stdout: &[u8]) -> String {
    String::from_utf8_lossy(stdout)
        .lines()
        .find(|l| l.starts_with("config_hash="))
        .unwrap_or_default()
        .to_string()
}

#[test]
fn config_hash_is_stable_and_layer_sensitive() {
    let cwd = scratch("hash");

    let base = reckon(&cwd)
        .args(["config", "hash", &config("base.yaml")])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"account_key\":\"paper\""))
        .get_output()
        .stdout
        .clone();

    let again = reckon(&cwd)
        .args(["config", "hash", &config("base.yaml")])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(hash_line(&base), hash_line(&again));
    assert_eq!(hash_line(&base).len(), "config_hash=".len() + 64);

    let layered = reckon(&cwd)
        .args([
            "config",
            "hash",
            &config("base.yaml"),
            &config("live.yaml"),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"account_key\":\"main\""))
        .get_output()
        .stdout
        .clone();
    assert_ne!(hash_line(&base), hash_line(&layered));
}

#[test]
fn literal_secret_in_config_is_refused() {
    let cwd = scratch("secret");
    let leaked = cwd.join("leaked.yaml");
    std::fs::write(
        &leaked,
        "account:\n  account_key: main\nbroker:\n  keys_env:\n    api_key: \"sk-live-0123456789\"\n",
    )
    .unwrap();

    reckon(&cwd)
        .args(["config", "hash", &leaked.to_string_lossy()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("sk-live").not());
}

#[test]
fn submit_rejects_bad_flags_before_touching_the_database() {
    let cwd = scratch("submit");

    reckon(&cwd)
        .args([
            "submit",
            "--config",
            &config("base.yaml"),
            "--symbol",
            "BTC-USDT",
            "--action",
            "hold",
            "--size",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --action 'hold'"));

    reckon(&cwd)
        .args([
            "submit",
            "--config",
            &config("base.yaml"),
            "--symbol",
            "BTC-USDT",
            "--action",
            "buy",
            "--size",
            "0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be positive"));
}

#[test]
fn cancel_without_a_selector_is_refused() {
    let cwd = scratch("cancel");

    reckon(&cwd)
        .args(["cancel", "--config", &config("base.yaml")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cancel needs --request or --symbol"));
}

#[test]
fn db_status_names_the_missing_database_url() {
    let cwd = scratch("db");

    reckon(&cwd)
        .args(["db", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RECKON_DATABASE_URL"));
}
