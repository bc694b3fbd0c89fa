use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::status::MarginMode;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_EXPIRY_SECS: i64 = 8 * 60 * 60;

/// Explicit per-account context threaded through fetch, submit and cancel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncContext {
    pub account: String,
    pub default_margin_mode: MarginMode,
    pub page_size: u32,
    pub page_delay: Duration,
    pub default_expiry: Duration,
    pub fallback_cancel_source: String,
    pub fallback_order_category: String,
    pub fallback_request_type: String,
}

impl SyncContext {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            default_margin_mode: MarginMode::Cross,
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: DEFAULT_PAGE_DELAY,
            default_expiry: Duration::from_secs(DEFAULT_EXPIRY_SECS as u64),
            fallback_cancel_source: "not_canceled".to_string(),
            fallback_order_category: "normal".to_string(),
            fallback_request_type: "limit".to_string(),
        }
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    pub fn default_expiry_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.default_expiry)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_EXPIRY_SECS))
    }
}
