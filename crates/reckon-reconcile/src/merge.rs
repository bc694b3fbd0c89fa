//! Merge planning.
//!
//! Pure decisions only: given where a revision came from, the stored record
//! (if any) and the incoming one, decide whether to insert, skip, touch or
//! write a patch. The engine executes the plan against the store.
//!
//! A first sighting is inserted with the status it arrived with. Rules for
//! newer broker-fed revisions of a stored record (push, history sync, pending
//! sync):
//!
//! - a history revision still reported live is one the exchange has already
//!   dropped from its working book: it becomes `Expired`;
//! - on an auto-managed position the stored trade parameters win (the auto
//!   engine owns them) and a live order is parked in `Hold`;
//! - otherwise the mapped exchange status is adopted verbatim.
//!
//! Broker feeds never move `expiry_time`. Every other source supplies its
//! target status directly.

use chrono::{DateTime, Utc};

use reckon_model::{
    Freshness, OrderPatch, OrderRecord, RequestPatch, RequestRecord, RequestStatus, ResultState,
    ReconcileResult, Source, StopOrderPatch, StopOrderRecord, StopRequestPatch, StopRequestRecord,
};

/// What to do with one incoming revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Plan<R, P> {
    Insert(R),
    /// Incoming revision is not newer than the stored one.
    Stale {
        stored: DateTime<Utc>,
        got: DateTime<Utc>,
    },
    /// Newer but identical: only `update_time` advances.
    Touch(DateTime<Utc>),
    Update {
        patch: P,
        status: RequestStatus,
    },
}

pub type RequestPlan = Plan<RequestRecord, RequestPatch>;
pub type StopPlan = Plan<StopRequestRecord, StopRequestPatch>;

/// Status a broker-fed revision lands in.
pub fn feed_status(source: Source, mapped: RequestStatus, auto_enabled: bool) -> RequestStatus {
    match (source, mapped) {
        (Source::History, RequestStatus::Pending) => RequestStatus::Expired,
        (Source::History, other) => other,
        (_, RequestStatus::Pending) if auto_enabled => RequestStatus::Hold,
        (_, other) => other,
    }
}

pub fn plan_request(
    source: Source,
    current: Option<&RequestRecord>,
    mut incoming: RequestRecord,
    auto_enabled: bool,
) -> RequestPlan {
    let Some(current) = current else {
        return Plan::Insert(incoming);
    };

    if let Freshness::Stale { stored, got } =
        Freshness::check(current.update_time, incoming.update_time)
    {
        return Plan::Stale { stored, got };
    }

    if source.is_broker_feed() {
        incoming.status = feed_status(source, incoming.status, auto_enabled);
        incoming.expiry_time = current.expiry_time;
        if auto_enabled && source != Source::History {
            incoming.price = current.price;
            incoming.size = current.size;
            incoming.leverage = current.leverage;
        }
    }

    let mut patch = RequestPatch::diff(current, &incoming);
    if patch.is_noop() {
        return Plan::Touch(incoming.update_time);
    }
    patch.update_time = Some(incoming.update_time);
    Plan::Update {
        patch,
        status: incoming.status,
    }
}

pub fn plan_stop(
    source: Source,
    current: Option<&StopRequestRecord>,
    mut incoming: StopRequestRecord,
    auto_enabled: bool,
) -> StopPlan {
    let Some(current) = current else {
        return Plan::Insert(incoming);
    };

    if let Freshness::Stale { stored, got } =
        Freshness::check(current.update_time, incoming.update_time)
    {
        return Plan::Stale { stored, got };
    }

    if source.is_broker_feed() {
        incoming.status = feed_status(source, incoming.status, auto_enabled);
        incoming.expiry_time = current.expiry_time;
        if auto_enabled && source != Source::History {
            incoming.size = current.size;
            incoming.trigger_price = current.trigger_price;
            incoming.order_price = current.order_price;
        }
    }

    let mut patch = StopRequestPatch::diff(current, &incoming);
    if patch.is_noop() {
        return Plan::Touch(incoming.update_time);
    }
    patch.update_time = Some(incoming.update_time);
    Plan::Update {
        patch,
        status: incoming.status,
    }
}

// ---------------------------------------------------------------------------
// Broker mirrors
// ---------------------------------------------------------------------------

/// Mirror rows follow the same chronology guard but carry no lifecycle rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MirrorPlan<R, P> {
    Insert(R),
    Skip,
    Update(P),
}

pub fn plan_order(
    current: Option<&OrderRecord>,
    incoming: OrderRecord,
) -> MirrorPlan<OrderRecord, OrderPatch> {
    let Some(current) = current else {
        return MirrorPlan::Insert(incoming);
    };
    if !Freshness::check(current.update_time, incoming.update_time).is_newer() {
        return MirrorPlan::Skip;
    }
    let mut patch = OrderPatch::diff(current, &incoming);
    if patch.is_noop() {
        return MirrorPlan::Skip;
    }
    patch.update_time = Some(incoming.update_time);
    MirrorPlan::Update(patch)
}

pub fn plan_stop_order(
    current: Option<&StopOrderRecord>,
    incoming: StopOrderRecord,
) -> MirrorPlan<StopOrderRecord, StopOrderPatch> {
    let Some(current) = current else {
        return MirrorPlan::Insert(incoming);
    };
    if !Freshness::check(current.update_time, incoming.update_time).is_newer() {
        return MirrorPlan::Skip;
    }
    let mut patch = StopOrderPatch::diff(current, &incoming);
    if patch.is_noop() {
        return MirrorPlan::Skip;
    }
    patch.update_time = Some(incoming.update_time);
    MirrorPlan::Update(patch)
}

// ---------------------------------------------------------------------------
// Result folding
// ---------------------------------------------------------------------------

/// Fold the per-leg results of one stop order into the single result reported
/// for that record. The first failure wins; otherwise the strongest outcome
/// (inserted, then updated, then exists) with rows summed.
pub fn combine_leg_results(context: &str, key: &str, legs: Vec<ReconcileResult>) -> ReconcileResult {
    if let Some(failed) = legs.iter().find(|r| !r.success) {
        return failed.clone();
    }
    let rows: u64 = legs.iter().map(|r| r.rows).sum();
    let has = |state: ResultState| legs.iter().any(|r| r.state == state);

    if has(ResultState::Inserted) {
        ReconcileResult::inserted(context, key, rows)
    } else if has(ResultState::Updated) {
        ReconcileResult::updated(context, key, rows)
    } else {
        match legs.into_iter().next() {
            Some(first) => first,
            None => ReconcileResult::exists(
                context,
                key,
                reckon_model::codes::EXISTS,
                "no stop legs to merge",
            ),
        }
    }
}
