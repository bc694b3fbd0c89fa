//! Typed patches and pure diffs.
//!
//! Each patch field is `Some(new_value)` when the incoming record differs from
//! the stored one and `None` when it is absent or unchanged. Optional record
//! fields (price, broker id, ...) only produce a change when the incoming
//! record actually carries a value; an incoming `None` never clears stored data.
//!
//! Fields are split into *core* (trade parameters and fill telemetry, always
//! written when they differ) and *lifecycle* (state/status/expiry, decided by
//! the merge rules before the diff is taken). `memo` rides along with a write
//! but never causes one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::record::{
    OrderRecord, RefKey, RequestRecord, StopOrderRecord, StopRequestRecord,
};
use crate::status::{Action, MarginMode, RequestStatus};

fn changed<T: PartialEq + Clone>(current: &T, incoming: &T) -> Option<T> {
    (current != incoming).then(|| incoming.clone())
}

fn changed_opt<T: PartialEq + Clone>(current: &Option<T>, incoming: &Option<T>) -> Option<T> {
    match incoming {
        Some(v) if current.as_ref() != Some(v) => Some(v.clone()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestPatch {
    // core
    pub action: Option<Action>,
    pub margin_mode: Option<MarginMode>,
    pub price: Option<Decimal>,
    pub size: Option<Decimal>,
    pub leverage: Option<u32>,
    pub request_type: Option<RefKey>,
    pub reduce_only: Option<bool>,
    pub order_id: Option<u64>,
    pub broker_id: Option<String>,
    // lifecycle
    pub state: Option<RefKey>,
    pub status: Option<RequestStatus>,
    pub expiry_time: Option<DateTime<Utc>>,
    pub memo: Option<String>,

    pub update_time: Option<DateTime<Utc>>,
}

impl RequestPatch {
    pub fn diff(current: &RequestRecord, incoming: &RequestRecord) -> Self {
        Self {
            action: changed(&current.action, &incoming.action),
            margin_mode: changed(&current.margin_mode, &incoming.margin_mode),
            price: changed_opt(&current.price, &incoming.price),
            size: changed(&current.size, &incoming.size),
            leverage: changed(&current.leverage, &incoming.leverage),
            request_type: changed(&current.request_type, &incoming.request_type),
            reduce_only: changed(&current.reduce_only, &incoming.reduce_only),
            order_id: changed_opt(&current.order_id, &incoming.order_id),
            broker_id: changed_opt(&current.broker_id, &incoming.broker_id),
            state: changed_opt(&current.state, &incoming.state),
            status: changed(&current.status, &incoming.status),
            expiry_time: changed(&current.expiry_time, &incoming.expiry_time),
            memo: changed_opt(&current.memo, &incoming.memo),
            update_time: None,
        }
    }

    pub fn has_core_changes(&self) -> bool {
        self.action.is_some()
            || self.margin_mode.is_some()
            || self.price.is_some()
            || self.size.is_some()
            || self.leverage.is_some()
            || self.request_type.is_some()
            || self.reduce_only.is_some()
            || self.order_id.is_some()
            || self.broker_id.is_some()
    }

    pub fn has_lifecycle_changes(&self) -> bool {
        self.state.is_some() || self.status.is_some() || self.expiry_time.is_some()
    }

    /// True when the patch would change nothing a reader cares about.
    pub fn is_noop(&self) -> bool {
        !self.has_core_changes() && !self.has_lifecycle_changes()
    }

    pub fn apply(&self, rec: &mut RequestRecord) {
        if let Some(v) = self.action {
            rec.action = v;
        }
        if let Some(v) = self.margin_mode {
            rec.margin_mode = v;
        }
        if let Some(v) = self.price {
            rec.price = Some(v);
        }
        if let Some(v) = self.size {
            rec.size = v;
        }
        if let Some(v) = self.leverage {
            rec.leverage = v;
        }
        if let Some(v) = self.request_type {
            rec.request_type = v;
        }
        if let Some(v) = self.reduce_only {
            rec.reduce_only = v;
        }
        if let Some(v) = self.order_id {
            rec.order_id = Some(v);
        }
        if let Some(v) = &self.broker_id {
            rec.broker_id = Some(v.clone());
        }
        if let Some(v) = self.state {
            rec.state = Some(v);
        }
        if let Some(v) = self.status {
            rec.status = v;
        }
        if let Some(v) = self.expiry_time {
            rec.expiry_time = v;
        }
        if let Some(v) = &self.memo {
            rec.memo = Some(v.clone());
        }
        if let Some(v) = self.update_time {
            rec.update_time = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Stop request leg
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StopRequestPatch {
    // core
    pub action: Option<Action>,
    pub margin_mode: Option<MarginMode>,
    pub size: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    pub order_price: Option<Decimal>,
    pub reduce_only: Option<bool>,
    pub tpsl_id: Option<u64>,
    pub broker_id: Option<String>,
    // lifecycle
    pub state: Option<RefKey>,
    pub status: Option<RequestStatus>,
    pub expiry_time: Option<DateTime<Utc>>,
    pub memo: Option<String>,

    pub update_time: Option<DateTime<Utc>>,
}

impl StopRequestPatch {
    pub fn diff(current: &StopRequestRecord, incoming: &StopRequestRecord) -> Self {
        Self {
            action: changed(&current.action, &incoming.action),
            margin_mode: changed(&current.margin_mode, &incoming.margin_mode),
            size: changed(&current.size, &incoming.size),
            trigger_price: changed(&current.trigger_price, &incoming.trigger_price),
            order_price: changed_opt(&current.order_price, &incoming.order_price),
            reduce_only: changed(&current.reduce_only, &incoming.reduce_only),
            tpsl_id: changed_opt(&current.tpsl_id, &incoming.tpsl_id),
            broker_id: changed_opt(&current.broker_id, &incoming.broker_id),
            state: changed_opt(&current.state, &incoming.state),
            status: changed(&current.status, &incoming.status),
            expiry_time: changed(&current.expiry_time, &incoming.expiry_time),
            memo: changed_opt(&current.memo, &incoming.memo),
            update_time: None,
        }
    }

    pub fn has_core_changes(&self) -> bool {
        self.action.is_some()
            || self.margin_mode.is_some()
            || self.size.is_some()
            || self.trigger_price.is_some()
            || self.order_price.is_some()
            || self.reduce_only.is_some()
            || self.tpsl_id.is_some()
            || self.broker_id.is_some()
    }

    pub fn has_lifecycle_changes(&self) -> bool {
        self.state.is_some() || self.status.is_some() || self.expiry_time.is_some()
    }

    pub fn is_noop(&self) -> bool {
        !self.has_core_changes() && !self.has_lifecycle_changes()
    }

    pub fn apply(&self, rec: &mut StopRequestRecord) {
        if let Some(v) = self.action {
            rec.action = v;
        }
        if let Some(v) = self.margin_mode {
            rec.margin_mode = v;
        }
        if let Some(v) = self.size {
            rec.size = v;
        }
        if let Some(v) = self.trigger_price {
            rec.trigger_price = v;
        }
        if let Some(v) = self.order_price {
            rec.order_price = Some(v);
        }
        if let Some(v) = self.reduce_only {
            rec.reduce_only = v;
        }
        if let Some(v) = self.tpsl_id {
            rec.tpsl_id = Some(v);
        }
        if let Some(v) = &self.broker_id {
            rec.broker_id = Some(v.clone());
        }
        if let Some(v) = self.state {
            rec.state = Some(v);
        }
        if let Some(v) = self.status {
            rec.status = v;
        }
        if let Some(v) = self.expiry_time {
            rec.expiry_time = v;
        }
        if let Some(v) = &self.memo {
            rec.memo = Some(v.clone());
        }
        if let Some(v) = self.update_time {
            rec.update_time = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Order mirror
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub order_state: Option<RefKey>,
    pub order_category: Option<RefKey>,
    pub cancel_source: Option<RefKey>,
    pub filled_size: Option<Decimal>,
    pub filled_amount: Option<Decimal>,
    pub average_price: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub update_time: Option<DateTime<Utc>>,
}

impl OrderPatch {
    pub fn diff(current: &OrderRecord, incoming: &OrderRecord) -> Self {
        Self {
            order_state: changed(&current.order_state, &incoming.order_state),
            order_category: changed(&current.order_category, &incoming.order_category),
            cancel_source: changed(&current.cancel_source, &incoming.cancel_source),
            filled_size: changed(&current.filled_size, &incoming.filled_size),
            filled_amount: changed(&current.filled_amount, &incoming.filled_amount),
            average_price: changed(&current.average_price, &incoming.average_price),
            fee: changed(&current.fee, &incoming.fee),
            pnl: changed(&current.pnl, &incoming.pnl),
            update_time: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.order_state.is_none()
            && self.order_category.is_none()
            && self.cancel_source.is_none()
            && self.filled_size.is_none()
            && self.filled_amount.is_none()
            && self.average_price.is_none()
            && self.fee.is_none()
            && self.pnl.is_none()
    }

    pub fn apply(&self, rec: &mut OrderRecord) {
        if let Some(v) = self.order_state {
            rec.order_state = v;
        }
        if let Some(v) = self.order_category {
            rec.order_category = v;
        }
        if let Some(v) = self.cancel_source {
            rec.cancel_source = v;
        }
        if let Some(v) = self.filled_size {
            rec.filled_size = v;
        }
        if let Some(v) = self.filled_amount {
            rec.filled_amount = v;
        }
        if let Some(v) = self.average_price {
            rec.average_price = v;
        }
        if let Some(v) = self.fee {
            rec.fee = v;
        }
        if let Some(v) = self.pnl {
            rec.pnl = v;
        }
        if let Some(v) = self.update_time {
            rec.update_time = v;
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StopOrderPatch {
    pub order_state: Option<RefKey>,
    pub order_category: Option<RefKey>,
    pub actual_size: Option<Decimal>,
    pub update_time: Option<DateTime<Utc>>,
}

impl StopOrderPatch {
    pub fn diff(current: &StopOrderRecord, incoming: &StopOrderRecord) -> Self {
        Self {
            order_state: changed(&current.order_state, &incoming.order_state),
            order_category: changed(&current.order_category, &incoming.order_category),
            actual_size: changed(&current.actual_size, &incoming.actual_size),
            update_time: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.order_state.is_none() && self.order_category.is_none() && self.actual_size.is_none()
    }

    pub fn apply(&self, rec: &mut StopOrderRecord) {
        if let Some(v) = self.order_state {
            rec.order_state = v;
        }
        if let Some(v) = self.order_category {
            rec.order_category = v;
        }
        if let Some(v) = self.actual_size {
            rec.actual_size = v;
        }
        if let Some(v) = self.update_time {
            rec.update_time = v;
        }
    }
}
