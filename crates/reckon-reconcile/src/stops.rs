//! Stop-leg submission.
//!
//! Before a leg is written the backlog for its (position, stop type) is
//! purged so at most one live leg per type survives: `Pending` legs are
//! canceled, `Queued` legs closed, `Rejected` legs expired. Legs are only
//! accepted against an open, auto-managed position.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use tracing::{info, warn};

use reckon_db::StopFilter;
use reckon_model::{
    codes, Action, Freshness, MarginMode, Position, RecordKey, ReconcileError, ReconcileResult,
    RequestStatus, Source, StopRequestRecord, StopType,
};

use crate::merge::plan_stop;
use crate::submit::{PositionRef, SUPERSEDED_MEMO};
use crate::Engine;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitStopRequest {
    pub stop_request: Option<RecordKey>,
    pub stop_type: StopType,
    pub position: Option<PositionRef>,
    pub action: Action,
    pub margin_mode: Option<MarginMode>,
    pub size: Decimal,
    pub trigger_price: Decimal,
    pub order_price: Option<Decimal>,
    pub reduce_only: bool,
    pub status: Option<RequestStatus>,
    pub memo: Option<String>,
    pub broker_id: Option<String>,
    pub update_time: DateTime<Utc>,
    pub expiry_time: Option<DateTime<Utc>>,
}

impl SubmitStopRequest {
    pub fn new(
        position: PositionRef,
        stop_type: StopType,
        action: Action,
        size: Decimal,
        trigger_price: Decimal,
        update_time: DateTime<Utc>,
    ) -> Self {
        Self {
            stop_request: None,
            stop_type,
            position: Some(position),
            action,
            margin_mode: None,
            size,
            trigger_price,
            order_price: None,
            reduce_only: true,
            status: None,
            memo: None,
            broker_id: None,
            update_time,
            expiry_time: None,
        }
    }
}

/// Terminal status a backlog leg is purged to.
fn purge_target(status: RequestStatus) -> RequestStatus {
    match status {
        RequestStatus::Pending => RequestStatus::Canceled,
        RequestStatus::Rejected => RequestStatus::Expired,
        _ => RequestStatus::Closed,
    }
}

const BACKLOG: [RequestStatus; 3] = [
    RequestStatus::Pending,
    RequestStatus::Queued,
    RequestStatus::Rejected,
];

impl Engine {
    /// Gate a local stop leg into the store.
    ///
    /// `Err` only when the leg cannot be tied to a position. A position that
    /// is closed or not auto-managed yields a 456 result after the backlog
    /// purge.
    pub async fn submit_stop(
        &self,
        req: SubmitStopRequest,
    ) -> Result<ReconcileResult, ReconcileError> {
        const CONTEXT: &str = "stop.submit";

        let position = self.locate(&req.position).await?;
        let key_hint = req.stop_request.map(|k| format!("{k}/{}", req.stop_type));
        Ok(match self.submit_stop_located(CONTEXT, &position, req).await {
            Ok(result) => result,
            Err(err) => {
                warn!(position = %position.key, code = err.code(), error = %err, "stop submit failed");
                ReconcileResult::failure(CONTEXT, key_hint, &err)
            }
        })
    }

    async fn submit_stop_located(
        &self,
        context: &str,
        position: &Position,
        req: SubmitStopRequest,
    ) -> Result<ReconcileResult, ReconcileError> {
        let stop_type = req.stop_type;
        let backlog = self
            .store
            .find_stop_requests(&StopFilter {
                stop_type: Some(stop_type),
                position: Some(position.key),
                statuses: BACKLOG.to_vec(),
                ..StopFilter::default()
            })
            .await
            .map_err(ReconcileError::store)?;

        let existing = match req.stop_request {
            Some(key) => self
                .store
                .stop_request(key, stop_type)
                .await
                .map_err(ReconcileError::store)?,
            None => None,
        };
        let keep = existing.as_ref().map(|l| l.stop_request);

        let purged = self
            .purge_backlog(
                backlog
                    .into_iter()
                    .filter(|l| Some(l.stop_request) != keep)
                    .collect(),
                req.update_time,
            )
            .await;
        if !purged.is_empty() {
            info!(position = %position.key, %stop_type, purged = purged.len(), "stop backlog purged");
        }

        if !position.accepts_stops() {
            let err = ReconcileError::SubmissionDenied(format!(
                "position {} is {} with auto trading {}",
                position.key,
                position.status.as_str(),
                position.auto_status.as_str()
            ));
            return Ok(ReconcileResult::failure(
                context,
                req.stop_request.map(|k| format!("{k}/{stop_type}")),
                &err,
            ));
        }

        let key = keep
            .or(req.stop_request)
            .unwrap_or_else(RecordKey::generate);
        let label = format!("{key}/{stop_type}");

        let incoming = StopRequestRecord {
            stop_request: key,
            stop_type,
            position: position.key,
            action: req.action,
            margin_mode: req.margin_mode.unwrap_or(position.margin_mode),
            size: req.size,
            trigger_price: req.trigger_price,
            order_price: req.order_price,
            reduce_only: req.reduce_only,
            tpsl_id: None,
            state: None,
            status: req
                .status
                .or(existing.as_ref().map(|l| l.status))
                .unwrap_or(RequestStatus::Queued),
            memo: req.memo,
            broker_id: req.broker_id,
            create_time: existing.as_ref().map_or(req.update_time, |l| l.create_time),
            update_time: req.update_time,
            expiry_time: req
                .expiry_time
                .or(existing.as_ref().map(|l| l.expiry_time))
                .unwrap_or(req.update_time + self.ctx.default_expiry_chrono()),
        };

        if let Some(current) = &existing {
            if !Freshness::check(current.update_time, incoming.update_time).is_newer() {
                return Ok(ReconcileResult::exists(
                    context,
                    label,
                    codes::SUBMIT_EXISTS,
                    "stop leg not newer than the stored revision",
                ));
            }
        }

        let plan = plan_stop(Source::Submit, existing.as_ref(), incoming, true);
        Ok(self
            .apply_stop_plan(context, key, stop_type, plan)
            .await?
            .result)
    }

    async fn purge_backlog(
        &self,
        legs: Vec<StopRequestRecord>,
        now: DateTime<Utc>,
    ) -> Vec<ReconcileResult> {
        join_all(legs.into_iter().map(|leg| {
            let target = purge_target(leg.status);
            self.transition_stop_logged("stop.purge", leg, target, SUPERSEDED_MEMO, now)
        }))
        .await
    }
}
