//! Runtime secret resolution.
//!
//! Config stores only env var NAMES; this module reads the values once at
//! startup. Errors name the variable, never the value, and `Debug` redacts.

use anyhow::{bail, Result};

use crate::settings::KeysEnv;

#[derive(Clone)]
pub struct ResolvedSecrets {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("api_key", &"<REDACTED>")
            .field("api_secret", &"<REDACTED>")
            .field("passphrase", &"<REDACTED>")
            .finish()
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn require(var_name: &str, what: &str) -> Result<String> {
    match resolve_env(var_name) {
        Some(v) => Ok(v),
        None => bail!(
            "SECRETS_MISSING: required env var '{}' ({}) is not set or empty",
            var_name,
            what
        ),
    }
}

/// Resolve all three exchange credentials; fails on the first missing one.
pub fn resolve_broker_secrets(keys: &KeysEnv) -> Result<ResolvedSecrets> {
    Ok(ResolvedSecrets {
        api_key: require(&keys.api_key, "broker api_key")?,
        api_secret: require(&keys.api_secret, "broker api_secret")?,
        passphrase: require(&keys.passphrase, "broker passphrase")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let s = ResolvedSecrets {
            api_key: "key-value".into(),
            api_secret: "secret-value".into(),
            passphrase: "pass-value".into(),
        };
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("secret-value"));
        assert!(dbg.contains("<REDACTED>"));
    }

    #[test]
    fn missing_secret_error_names_the_variable() {
        let keys = KeysEnv {
            api_key: "RECKON_TEST_UNSET_KEY_5f1c".into(),
            api_secret: "RECKON_TEST_UNSET_SECRET_5f1c".into(),
            passphrase: "RECKON_TEST_UNSET_PASS_5f1c".into(),
        };
        let err = resolve_broker_secrets(&keys).unwrap_err().to_string();
        assert!(err.contains("SECRETS_MISSING"));
        assert!(err.contains("RECKON_TEST_UNSET_KEY_5f1c"));
    }
}
