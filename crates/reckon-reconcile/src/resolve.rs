//! Raw exchange record -> typed records.
//!
//! Resolution failures carry the stable codes: an instrument/side the account
//! does not own is 452, an order state or request type the lookup tables do
//! not know is 453, a record missing a required field is 455.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

use reckon_broker::wire::{non_empty, parse_decimal, parse_flag, parse_millis};
use reckon_broker::{RawOrder, RawStopOrder};
use reckon_model::{
    Action, MappedState, MarginMode, OrderRecord, Position, PositionSide, RecordKey, RefKey,
    ReconcileError, ReferenceTable, Source, StopOrderRecord, StopRequestRecord, StopType,
    RequestRecord,
};

use crate::Engine;

pub(crate) struct ResolvedOrder {
    pub request: RequestRecord,
    pub position: Position,
    pub mirror: Option<OrderRecord>,
}

pub(crate) struct ResolvedStop {
    pub legs: Vec<StopRequestRecord>,
    pub position: Position,
    pub mirror: Option<StopOrderRecord>,
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

fn malformed(field: &str, raw: &Option<String>) -> ReconcileError {
    ReconcileError::MalformedRequest(format!(
        "{field} '{}' missing or invalid",
        raw.as_deref().unwrap_or("")
    ))
}

fn required_decimal(field: &str, raw: &Option<String>) -> Result<Decimal, ReconcileError> {
    parse_decimal(raw).ok_or_else(|| malformed(field, raw))
}

fn decimal_or_zero(raw: &Option<String>) -> Decimal {
    parse_decimal(raw).unwrap_or(Decimal::ZERO)
}

/// The exchange reports market execution as `-1` or `0`.
fn limit_price(raw: &Option<String>) -> Option<Decimal> {
    parse_decimal(raw).filter(|p| *p > Decimal::ZERO)
}

fn action(raw: &Option<String>) -> Result<Action, ReconcileError> {
    non_empty(raw)
        .and_then(Action::parse)
        .ok_or_else(|| malformed("side", raw))
}

fn position_side(raw: &Option<String>) -> Result<PositionSide, ReconcileError> {
    match non_empty(raw) {
        None => Ok(PositionSide::Net),
        Some(s) => PositionSide::parse(s).ok_or_else(|| malformed("positionSide", raw)),
    }
}

fn margin_mode(raw: &Option<String>, default: MarginMode) -> Result<MarginMode, ReconcileError> {
    match non_empty(raw) {
        None => Ok(default),
        Some(s) => MarginMode::parse(s).ok_or_else(|| malformed("marginMode", raw)),
    }
}

fn leverage(raw: &Option<String>, default: u32) -> Result<u32, ReconcileError> {
    match non_empty(raw) {
        None => Ok(default),
        Some(_) => parse_decimal(raw)
            .and_then(|d| d.trunc().to_u32())
            .filter(|l| *l > 0)
            .ok_or_else(|| malformed("leverage", raw)),
    }
}

fn times(
    create: &Option<String>,
    updated: Option<DateTime<Utc>>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ReconcileError> {
    let update_time = updated.ok_or_else(|| malformed("updateTime", &None))?;
    let create_time = parse_millis(create).unwrap_or(update_time);
    Ok((create_time, update_time))
}

fn owned(raw: &Option<String>) -> Option<String> {
    non_empty(raw).map(str::to_string)
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

impl Engine {
    pub(crate) async fn position_for(
        &self,
        symbol: &Option<String>,
        side: &Option<String>,
    ) -> Result<Position, ReconcileError> {
        let symbol_str = non_empty(symbol).ok_or_else(|| malformed("instId", symbol))?;
        let side = position_side(side)?;
        self.resolver
            .position(&self.ctx.account, symbol_str, side)
            .await
            .map_err(ReconcileError::store)?
            .ok_or_else(|| {
                ReconcileError::UnauthorizedPosition(format!(
                    "{symbol_str}:{} is not an instrument position of account {}",
                    side.as_str(),
                    self.ctx.account
                ))
            })
    }

    pub(crate) async fn mapped_state(
        &self,
        code: &Option<String>,
    ) -> Result<MappedState, ReconcileError> {
        let code = non_empty(code).ok_or_else(|| malformed("state", code))?;
        self.resolver
            .order_state(code)
            .await
            .map_err(ReconcileError::store)?
            .ok_or_else(|| ReconcileError::UnresolvedState(format!("order state '{code}'")))
    }

    /// Resolve `code` in `table`, with no fallback.
    pub(crate) async fn reference(
        &self,
        table: ReferenceTable,
        code: &str,
    ) -> Result<RefKey, ReconcileError> {
        self.resolver
            .reference(table, code)
            .await
            .map_err(ReconcileError::store)?
            .ok_or_else(|| ReconcileError::UnresolvedState(format!("{table} '{code}'")))
    }

    /// Resolve `code`, falling back to the configured code when it is absent
    /// or unknown.
    pub(crate) async fn reference_or_fallback(
        &self,
        table: ReferenceTable,
        code: &Option<String>,
        fallback: &str,
    ) -> Result<RefKey, ReconcileError> {
        if let Some(code) = non_empty(code) {
            if let Some(key) = self
                .resolver
                .reference(table, code)
                .await
                .map_err(ReconcileError::store)?
            {
                return Ok(key);
            }
            tracing::debug!(%table, code, fallback, "unknown reference code; using fallback");
        }
        self.reference(table, fallback).await
    }

    /// Every configured fallback code must resolve. Run once at startup; a
    /// table missing one would otherwise fail each record that needs it.
    pub async fn check_reference_tables(&self) -> Result<(), ReconcileError> {
        let fallbacks = [
            (ReferenceTable::CancelSource, &self.ctx.fallback_cancel_source),
            (ReferenceTable::OrderCategory, &self.ctx.fallback_order_category),
            (ReferenceTable::RequestType, &self.ctx.fallback_request_type),
        ];
        for (table, code) in fallbacks {
            self.reference(table, code).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    pub(crate) async fn resolve_order(
        &self,
        source: Source,
        key: RecordKey,
        raw: &RawOrder,
    ) -> Result<ResolvedOrder, ReconcileError> {
        let request_type_code = non_empty(&raw.order_type)
            .unwrap_or(&self.ctx.fallback_request_type)
            .to_string();

        let (position, mapped, request_type, cancel_source, order_category) = tokio::join!(
            self.position_for(&raw.inst_id, &raw.position_side),
            self.mapped_state(&raw.state),
            self.reference(ReferenceTable::RequestType, &request_type_code),
            self.reference_or_fallback(
                ReferenceTable::CancelSource,
                &raw.cancel_source,
                &self.ctx.fallback_cancel_source,
            ),
            self.reference_or_fallback(
                ReferenceTable::OrderCategory,
                &raw.order_category,
                &self.ctx.fallback_order_category,
            ),
        );
        let position = position?;
        let mapped = mapped?;
        let request_type = request_type?;

        let (create_time, update_time) = times(&raw.create_time, raw.updated_at())?;

        let request = RequestRecord {
            request: key,
            position: position.key,
            action: action(&raw.side)?,
            margin_mode: margin_mode(&raw.margin_mode, self.ctx.default_margin_mode)?,
            price: limit_price(&raw.price),
            size: required_decimal("size", &raw.size)?,
            leverage: leverage(&raw.leverage, position.leverage)?,
            request_type,
            reduce_only: parse_flag(&raw.reduce_only),
            order_id: raw.numeric_id(),
            state: Some(mapped.state),
            status: mapped.status,
            memo: source.feed_memo().map(str::to_string),
            broker_id: owned(&raw.broker_id),
            create_time,
            update_time,
            expiry_time: create_time + self.ctx.default_expiry_chrono(),
        };

        let mirror = match raw.numeric_id() {
            Some(order_id) => Some(OrderRecord {
                order_id,
                request: key,
                position: position.key,
                order_state: mapped.state,
                order_category: order_category?,
                cancel_source: cancel_source?,
                filled_size: decimal_or_zero(&raw.filled_size),
                filled_amount: decimal_or_zero(&raw.filled_amount),
                average_price: decimal_or_zero(&raw.average_price),
                fee: decimal_or_zero(&raw.fee),
                pnl: decimal_or_zero(&raw.pnl),
                create_time,
                update_time,
            }),
            None => {
                for dropped in [cancel_source.err(), order_category.err()]
                    .into_iter()
                    .flatten()
                {
                    warn!(
                        %key,
                        code = dropped.code(),
                        error = %dropped,
                        "mirror reference unresolved; order carries no broker id"
                    );
                }
                None
            }
        };

        Ok(ResolvedOrder {
            request,
            position,
            mirror,
        })
    }

    // -----------------------------------------------------------------------
    // Stop orders
    // -----------------------------------------------------------------------

    pub(crate) async fn resolve_stop(
        &self,
        source: Source,
        key: RecordKey,
        raw: &RawStopOrder,
    ) -> Result<ResolvedStop, ReconcileError> {
        let tpsl_id = raw
            .numeric_id()
            .ok_or_else(|| malformed("tpslId", &raw.tpsl_id))?;

        let (position, mapped, order_category) = tokio::join!(
            self.position_for(&raw.inst_id, &raw.position_side),
            self.mapped_state(&raw.state),
            self.reference_or_fallback(
                ReferenceTable::OrderCategory,
                &raw.order_category,
                &self.ctx.fallback_order_category,
            ),
        );
        let position = position?;
        let mapped = mapped?;
        let order_category = order_category?;

        let (create_time, update_time) = times(&raw.create_time, raw.updated_at())?;
        let action = action(&raw.side)?;
        let margin_mode = margin_mode(&raw.margin_mode, self.ctx.default_margin_mode)?;
        let size = required_decimal("size", &raw.size)?;
        let expiry_time = create_time + self.ctx.default_expiry_chrono();

        let leg_inputs = [
            (StopType::TakeProfit, &raw.tp_trigger_price, &raw.tp_order_price),
            (StopType::StopLoss, &raw.sl_trigger_price, &raw.sl_order_price),
        ];
        let legs: Vec<StopRequestRecord> = leg_inputs
            .into_iter()
            .filter_map(|(stop_type, trigger, order)| {
                limit_price(trigger).map(|trigger_price| StopRequestRecord {
                    stop_request: key,
                    stop_type,
                    position: position.key,
                    action,
                    margin_mode,
                    size,
                    trigger_price,
                    order_price: limit_price(order),
                    reduce_only: parse_flag(&raw.reduce_only),
                    tpsl_id: Some(tpsl_id),
                    state: Some(mapped.state),
                    status: mapped.status,
                    memo: source.feed_memo().map(str::to_string),
                    broker_id: owned(&raw.broker_id),
                    create_time,
                    update_time,
                    expiry_time,
                })
            })
            .collect();

        if legs.is_empty() {
            return Err(ReconcileError::MalformedRequest(format!(
                "stop order {tpsl_id} carries neither a take-profit nor a stop-loss trigger"
            )));
        }

        let mirror = StopOrderRecord {
            tpsl_id,
            stop_request: key,
            position: position.key,
            order_state: mapped.state,
            order_category,
            actual_size: decimal_or_zero(&raw.actual_size),
            create_time,
            update_time,
        };

        Ok(ResolvedStop {
            legs,
            position,
            mirror: Some(mirror),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn market_prices_read_as_absent() {
        assert_eq!(limit_price(&s("-1")), None);
        assert_eq!(limit_price(&s("0")), None);
        assert_eq!(limit_price(&s("65000.5")), Some(Decimal::new(650005, 1)));
    }

    #[test]
    fn leverage_defaults_when_absent_and_rejects_garbage() {
        assert_eq!(leverage(&None, 4).unwrap(), 4);
        assert_eq!(leverage(&s("10"), 4).unwrap(), 10);
        assert_eq!(leverage(&s("x"), 4).unwrap_err().code(), 455);
    }

    #[test]
    fn absent_position_side_is_net() {
        assert_eq!(position_side(&None).unwrap(), PositionSide::Net);
        assert_eq!(position_side(&s("long")).unwrap(), PositionSide::Long);
        assert!(position_side(&s("sideways")).is_err());
    }
}
