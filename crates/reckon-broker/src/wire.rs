//! Exchange wire records.
//!
//! Only the fields the engine reads are modeled. The exchange sends every
//! scalar as a string (often empty instead of absent), so all fields are
//! optional strings and the typed accessors do the parsing.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::BrokerError;

pub mod paths {
    pub const ORDERS_HISTORY: &str = "/api/v1/trade/orders-history";
    pub const ORDERS_PENDING: &str = "/api/v1/trade/orders-pending";
    pub const STOPS_HISTORY: &str = "/api/v1/trade/orders-tpsl-history";
    pub const STOPS_PENDING: &str = "/api/v1/trade/orders-tpsl-pending";
}

/// Records that carry a monotonically increasing exchange id, used as the
/// pagination cursor.
pub trait PagedRecord {
    fn page_id(&self) -> Option<u64>;
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

pub fn non_empty(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub fn parse_decimal(raw: &Option<String>) -> Option<Decimal> {
    non_empty(raw).and_then(|s| Decimal::from_str(s).ok())
}

pub fn parse_millis(raw: &Option<String>) -> Option<DateTime<Utc>> {
    non_empty(raw)
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

pub fn parse_u64(raw: &Option<String>) -> Option<u64> {
    non_empty(raw).and_then(|s| s.parse::<u64>().ok())
}

pub fn parse_flag(raw: &Option<String>) -> bool {
    non_empty(raw).is_some_and(|s| s.eq_ignore_ascii_case("true"))
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawOrder {
    pub inst_id: Option<String>,
    pub order_id: Option<String>,
    pub client_order_id: Option<String>,
    pub price: Option<String>,
    pub size: Option<String>,
    pub order_type: Option<String>,
    pub side: Option<String>,
    pub position_side: Option<String>,
    pub margin_mode: Option<String>,
    pub filled_size: Option<String>,
    pub filled_amount: Option<String>,
    pub average_price: Option<String>,
    pub state: Option<String>,
    pub leverage: Option<String>,
    pub fee: Option<String>,
    pub pnl: Option<String>,
    pub cancel_source: Option<String>,
    pub order_category: Option<String>,
    pub reduce_only: Option<String>,
    pub broker_id: Option<String>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

impl RawOrder {
    pub fn client_id(&self) -> Option<&str> {
        non_empty(&self.client_order_id)
    }

    pub fn numeric_id(&self) -> Option<u64> {
        parse_u64(&self.order_id)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        parse_millis(&self.update_time).or_else(|| parse_millis(&self.create_time))
    }
}

impl PagedRecord for RawOrder {
    fn page_id(&self) -> Option<u64> {
        self.numeric_id()
    }
}

// ---------------------------------------------------------------------------
// Stop (TP/SL) orders
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawStopOrder {
    pub tpsl_id: Option<String>,
    pub client_order_id: Option<String>,
    pub inst_id: Option<String>,
    pub margin_mode: Option<String>,
    pub position_side: Option<String>,
    pub side: Option<String>,
    pub size: Option<String>,
    pub state: Option<String>,
    pub tp_trigger_price: Option<String>,
    pub tp_order_price: Option<String>,
    pub sl_trigger_price: Option<String>,
    pub sl_order_price: Option<String>,
    pub order_category: Option<String>,
    pub leverage: Option<String>,
    pub actual_size: Option<String>,
    pub reduce_only: Option<String>,
    pub broker_id: Option<String>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

impl RawStopOrder {
    pub fn client_id(&self) -> Option<&str> {
        non_empty(&self.client_order_id)
    }

    pub fn numeric_id(&self) -> Option<u64> {
        parse_u64(&self.tpsl_id)
    }

    /// Stop feeds often omit the update time; the create time stands in.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        parse_millis(&self.update_time).or_else(|| parse_millis(&self.create_time))
    }
}

impl PagedRecord for RawStopOrder {
    fn page_id(&self) -> Option<u64> {
        self.numeric_id()
    }
}

// ---------------------------------------------------------------------------
// Submission acknowledgement
// ---------------------------------------------------------------------------

/// Per-order reply to a batch submission.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitAck {
    pub order_id: Option<String>,
    pub client_order_id: Option<String>,
    pub code: Option<String>,
    pub msg: Option<String>,
}

impl SubmitAck {
    pub fn accepted(&self) -> bool {
        non_empty(&self.code) == Some("0")
    }

    pub fn client_id(&self) -> Option<&str> {
        non_empty(&self.client_order_id)
    }

    pub fn numeric_id(&self) -> Option<u64> {
        parse_u64(&self.order_id)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// `{code, msg, data}` wrapper around every REST response. `code` arrives as
/// a string or a number depending on the endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn code_str(&self) -> String {
        match &self.code {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }

    /// Unwrap the record array, or the exchange error.
    pub fn into_records(self) -> Result<Vec<Value>, BrokerError> {
        let code = self.code_str();
        if code != "0" {
            return Err(BrokerError::Api {
                code,
                msg: self.msg.unwrap_or_default(),
            });
        }
        match self.data {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Ok(vec![other]),
        }
    }
}

/// Decode a page record by record. Records that do not decode are returned
/// separately so one bad row cannot sink the page.
pub fn decode_records<T: DeserializeOwned>(values: Vec<Value>) -> (Vec<T>, Vec<String>) {
    let mut ok = Vec::with_capacity(values.len());
    let mut bad = Vec::new();
    for v in values {
        match serde_json::from_value::<T>(v) {
            Ok(rec) => ok.push(rec),
            Err(e) => bad.push(e.to_string()),
        }
    }
    (ok, bad)
}
