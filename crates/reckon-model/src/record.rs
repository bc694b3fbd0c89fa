use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::key::RecordKey;
use crate::status::{
    Action, AutoStatus, MarginMode, PositionSide, PositionStatus, RequestStatus, StopType,
};

// ---------------------------------------------------------------------------
// Resolved keys
// ---------------------------------------------------------------------------

/// Stable local key of a reference-table row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefKey(pub i64);

/// Stable local key of an instrument position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey(pub i64);

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "position#{}", self.0)
    }
}

/// Lookup tables resolved by source code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTable {
    CancelSource,
    OrderCategory,
    RequestType,
}

impl ReferenceTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceTable::CancelSource => "cancel_source",
            ReferenceTable::OrderCategory => "order_category",
            ReferenceTable::RequestType => "request_type",
        }
    }
}

impl fmt::Display for ReferenceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exchange order state resolved to its local state key and the request
/// status it implies (`live` → Pending, `filled` → Fulfilled, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedState {
    pub state: RefKey,
    pub status: RequestStatus,
}

// ---------------------------------------------------------------------------
// Instrument position
// ---------------------------------------------------------------------------

/// Read-only view of an instrument position and its trading flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub key: PositionKey,
    pub account: String,
    pub symbol: String,
    pub side: PositionSide,
    pub auto_status: AutoStatus,
    pub status: PositionStatus,
    pub leverage: u32,
    pub margin_mode: MarginMode,
}

impl Position {
    pub fn auto_enabled(&self) -> bool {
        self.auto_status == AutoStatus::Enabled
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Stop legs may only be submitted against an open, auto-managed position.
    pub fn accepts_stops(&self) -> bool {
        self.is_open() && self.auto_enabled()
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A trade intent, local or broker-confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub request: RecordKey,
    pub position: PositionKey,
    pub action: Action,
    pub margin_mode: MarginMode,
    /// `None` for market requests.
    pub price: Option<Decimal>,
    pub size: Decimal,
    pub leverage: u32,
    pub request_type: RefKey,
    pub reduce_only: bool,
    pub order_id: Option<u64>,
    pub state: Option<RefKey>,
    pub status: RequestStatus,
    pub memo: Option<String>,
    pub broker_id: Option<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
}

/// One leg (`tp` or `sl`) of a stop request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRequestRecord {
    pub stop_request: RecordKey,
    pub stop_type: StopType,
    pub position: PositionKey,
    pub action: Action,
    pub margin_mode: MarginMode,
    pub size: Decimal,
    pub trigger_price: Decimal,
    /// `None` executes at market once triggered.
    pub order_price: Option<Decimal>,
    pub reduce_only: bool,
    pub tpsl_id: Option<u64>,
    pub state: Option<RefKey>,
    pub status: RequestStatus,
    pub memo: Option<String>,
    pub broker_id: Option<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
}

impl StopRequestRecord {
    pub fn leg(&self) -> (RecordKey, StopType) {
        (self.stop_request, self.stop_type)
    }
}

// ---------------------------------------------------------------------------
// Broker mirrors
// ---------------------------------------------------------------------------

/// Execution record mirrored 1:1 from the exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: u64,
    pub request: RecordKey,
    pub position: PositionKey,
    pub order_state: RefKey,
    pub order_category: RefKey,
    pub cancel_source: RefKey,
    pub filled_size: Decimal,
    pub filled_amount: Decimal,
    pub average_price: Decimal,
    pub fee: Decimal,
    pub pnl: Decimal,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopOrderRecord {
    pub tpsl_id: u64,
    pub stop_request: RecordKey,
    pub position: PositionKey,
    pub order_state: RefKey,
    pub order_category: RefKey,
    pub actual_size: Decimal,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}
