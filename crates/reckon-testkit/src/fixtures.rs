use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

use reckon_broker::{RawOrder, RawStopOrder, SubmitAck};
use reckon_db::MemoryResolver;
use reckon_model::{
    AutoStatus, MarginMode, Position, PositionKey, PositionSide, PositionStatus, ReferenceTable,
    RequestStatus, SyncContext,
};

pub const ACCOUNT: &str = "acct-test";
pub const SYMBOL: &str = "BTC-USDT";

/// Millisecond timestamp as a UTC instant.
pub fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}

/// Context with no page delay, so fetch tests run without sleeping.
pub fn context() -> SyncContext {
    SyncContext::new(ACCOUNT).with_page_delay(Duration::ZERO)
}

pub fn position(key: i64, symbol: &str, side: PositionSide) -> Position {
    Position {
        key: PositionKey(key),
        account: ACCOUNT.to_string(),
        symbol: symbol.to_string(),
        side,
        auto_status: AutoStatus::Disabled,
        status: PositionStatus::Open,
        leverage: 3,
        margin_mode: MarginMode::Cross,
    }
}

/// Open position with automation on.
pub fn auto_position(key: i64, symbol: &str, side: PositionSide) -> Position {
    Position {
        auto_status: AutoStatus::Enabled,
        ..position(key, symbol, side)
    }
}

/// Reference codes and order states as seeded by the initial migration.
pub fn seeded_resolver() -> MemoryResolver {
    let mut r = MemoryResolver::new();
    for code in ["not_canceled", "user_canceled", "system_canceled"] {
        r = r.with_reference(ReferenceTable::CancelSource, code);
    }
    for code in [
        "normal",
        "full_liquidation",
        "partial_liquidation",
        "adl",
        "tp",
        "sl",
    ] {
        r = r.with_reference(ReferenceTable::OrderCategory, code);
    }
    for code in ["market", "limit", "post_only", "fok", "ioc", "trigger"] {
        r = r.with_reference(ReferenceTable::RequestType, code);
    }
    r.with_order_state("live", RequestStatus::Pending)
        .with_order_state("effective", RequestStatus::Pending)
        .with_order_state("partially_filled", RequestStatus::Pending)
        .with_order_state("filled", RequestStatus::Fulfilled)
        .with_order_state("canceled", RequestStatus::Canceled)
        .with_order_state("partially_canceled", RequestStatus::Canceled)
        .with_order_state("order_failed", RequestStatus::Rejected)
        .with_order_state("failed", RequestStatus::Rejected)
        .with_position(position(1, SYMBOL, PositionSide::Net))
}

/// Limit buy of 5 at 10 on [`SYMBOL`], net side, leverage 3.
pub fn raw_order(client_id: &str, order_id: u64, state: &str, update_ms: i64) -> RawOrder {
    RawOrder {
        inst_id: Some(SYMBOL.to_string()),
        order_id: Some(order_id.to_string()),
        client_order_id: Some(client_id.to_string()),
        price: Some("10".to_string()),
        size: Some("5".to_string()),
        order_type: Some("limit".to_string()),
        side: Some("buy".to_string()),
        position_side: Some("net".to_string()),
        margin_mode: Some("cross".to_string()),
        filled_size: Some("0".to_string()),
        filled_amount: Some("0".to_string()),
        average_price: Some("0".to_string()),
        state: Some(state.to_string()),
        leverage: Some("3".to_string()),
        fee: Some("0".to_string()),
        pnl: Some("0".to_string()),
        cancel_source: None,
        order_category: Some("normal".to_string()),
        reduce_only: Some("false".to_string()),
        broker_id: None,
        create_time: Some(update_ms.to_string()),
        update_time: Some(update_ms.to_string()),
    }
}

/// Sell-side stop with both legs: take-profit at 70000, stop-loss at 60000,
/// both executing at market.
pub fn raw_stop(client_id: &str, tpsl_id: u64, state: &str, create_ms: i64) -> RawStopOrder {
    RawStopOrder {
        tpsl_id: Some(tpsl_id.to_string()),
        client_order_id: Some(client_id.to_string()),
        inst_id: Some(SYMBOL.to_string()),
        margin_mode: Some("cross".to_string()),
        position_side: Some("net".to_string()),
        side: Some("sell".to_string()),
        size: Some("5".to_string()),
        state: Some(state.to_string()),
        tp_trigger_price: Some("70000".to_string()),
        tp_order_price: Some("-1".to_string()),
        sl_trigger_price: Some("60000".to_string()),
        sl_order_price: Some("-1".to_string()),
        order_category: Some("normal".to_string()),
        leverage: Some("3".to_string()),
        actual_size: Some("0".to_string()),
        reduce_only: Some("true".to_string()),
        broker_id: None,
        create_time: Some(create_ms.to_string()),
        update_time: None,
    }
}

pub fn ack(client_id: &str, order_id: &str, code: &str, msg: &str) -> SubmitAck {
    SubmitAck {
        order_id: Some(order_id.to_string()),
        client_order_id: Some(client_id.to_string()),
        code: Some(code.to_string()),
        msg: Some(msg.to_string()),
    }
}
