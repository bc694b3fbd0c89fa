use std::time::Duration;

use anyhow::{bail, Context, Result};
use reckon_model::{MarginMode, SyncContext, DEFAULT_EXPIRY_SECS, DEFAULT_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed view of the merged configuration. Every section has defaults so a
/// minimal config only needs `account.account_key`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub account: AccountSection,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub requests: RequestsSection,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountSection {
    pub account_key: String,
    #[serde(default = "default_margin_mode")]
    pub default_margin_mode: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrokerSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub keys_env: KeysEnv,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            keys_env: KeysEnv::default(),
        }
    }
}

/// Env var NAMES holding the exchange credentials.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeysEnv {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl Default for KeysEnv {
    fn default() -> Self {
        Self {
            api_key: "RECKON_BROKER_API_KEY".to_string(),
            api_secret: "RECKON_BROKER_API_SECRET".to_string(),
            passphrase: "RECKON_BROKER_PASSPHRASE".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_delay_ms: default_page_delay_ms(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestsSection {
    #[serde(default = "default_expiry_secs")]
    pub default_expiry_secs: u64,
    #[serde(default = "default_cancel_source")]
    pub fallback_cancel_source: String,
    #[serde(default = "default_order_category")]
    pub fallback_order_category: String,
    #[serde(default = "default_request_type")]
    pub fallback_request_type: String,
}

impl Default for RequestsSection {
    fn default() -> Self {
        Self {
            default_expiry_secs: default_expiry_secs(),
            fallback_cancel_source: default_cancel_source(),
            fallback_order_category: default_order_category(),
            fallback_request_type: default_request_type(),
        }
    }
}

fn default_margin_mode() -> String {
    "cross".to_string()
}
fn default_base_url() -> String {
    "https://openapi.blofin.com".to_string()
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}
fn default_page_delay_ms() -> u64 {
    1_500
}
fn default_deadline_secs() -> u64 {
    120
}
fn default_expiry_secs() -> u64 {
    DEFAULT_EXPIRY_SECS as u64
}
fn default_cancel_source() -> String {
    "not_canceled".to_string()
}
fn default_order_category() -> String {
    "normal".to_string()
}
fn default_request_type() -> String {
    "limit".to_string()
}

impl EngineConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: EngineConfig =
            serde_json::from_value(config_json.clone()).context("engine config decode failed")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.account.account_key.trim().is_empty() {
            bail!("CONFIG_INVALID account.account_key is empty");
        }
        if MarginMode::parse(&self.account.default_margin_mode).is_none() {
            bail!(
                "CONFIG_INVALID account.default_margin_mode='{}' (expected cross|isolated)",
                self.account.default_margin_mode
            );
        }
        if self.sync.page_size == 0 || self.sync.page_size > 100 {
            bail!(
                "CONFIG_INVALID sync.page_size={} (expected 1..=100)",
                self.sync.page_size
            );
        }
        Ok(())
    }

    pub fn sync_context(&self) -> SyncContext {
        let mut ctx = SyncContext::new(self.account.account_key.clone())
            .with_page_size(self.sync.page_size)
            .with_page_delay(Duration::from_millis(self.sync.page_delay_ms));
        ctx.default_margin_mode =
            MarginMode::parse(&self.account.default_margin_mode).unwrap_or(MarginMode::Cross);
        ctx.default_expiry = Duration::from_secs(self.requests.default_expiry_secs);
        ctx.fallback_cancel_source = self.requests.fallback_cancel_source.clone();
        ctx.fallback_order_category = self.requests.fallback_order_category.clone();
        ctx.fallback_request_type = self.requests.fallback_request_type.clone();
        ctx
    }

    pub fn fetch_deadline(&self) -> Duration {
        Duration::from_secs(self.sync.deadline_secs)
    }

    pub fn broker_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.timeout_ms)
    }
}
