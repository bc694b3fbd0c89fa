//! Submission gate for locally originated requests.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use tracing::{info, warn};

use reckon_db::RequestFilter;
use reckon_model::{
    codes, Action, Freshness, MarginMode, Position, PositionKey, PositionSide, RecordKey,
    ReconcileError, ReconcileResult, ReferenceTable, RequestRecord, RequestStatus, Source,
};

use crate::merge::plan_request;
use crate::Engine;

pub const SUPERSEDED_MEMO: &str = "superseded by new request";

/// How a submission names its instrument position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PositionRef {
    Key(PositionKey),
    Instrument { symbol: String, side: PositionSide },
}

impl std::fmt::Display for PositionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionRef::Key(k) => write!(f, "position {k}"),
            PositionRef::Instrument { symbol, side } => write!(f, "{symbol}:{}", side.as_str()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Updates this request when set; otherwise the newest open request on
    /// the position is the candidate.
    pub request: Option<RecordKey>,
    pub position: Option<PositionRef>,
    pub action: Action,
    pub margin_mode: Option<MarginMode>,
    pub price: Option<Decimal>,
    pub size: Decimal,
    pub leverage: Option<u32>,
    pub request_type: String,
    pub reduce_only: bool,
    /// `None` keeps the stored status (or `Queued` for a new request).
    pub status: Option<RequestStatus>,
    pub memo: Option<String>,
    pub broker_id: Option<String>,
    pub update_time: DateTime<Utc>,
    pub expiry_time: Option<DateTime<Utc>>,
}

impl SubmitRequest {
    pub fn new(
        position: PositionRef,
        action: Action,
        size: Decimal,
        request_type: &str,
        update_time: DateTime<Utc>,
    ) -> Self {
        Self {
            request: None,
            position: Some(position),
            action,
            margin_mode: None,
            price: None,
            size,
            leverage: None,
            request_type: request_type.to_string(),
            reduce_only: false,
            status: None,
            memo: None,
            broker_id: None,
            update_time,
            expiry_time: None,
        }
    }
}

impl Engine {
    /// Locate the position a local submission targets. Missing or unknown
    /// identification is a malformed request; a position owned by another
    /// account is unauthorized.
    pub(crate) async fn locate(
        &self,
        position: &Option<PositionRef>,
    ) -> Result<Position, ReconcileError> {
        let Some(pref) = position else {
            return Err(ReconcileError::MalformedRequest(
                "request names no instrument position".to_string(),
            ));
        };
        let found = match pref {
            PositionRef::Key(k) => self.resolver.position_by_key(*k).await,
            PositionRef::Instrument { symbol, side } => {
                self.resolver.position(&self.ctx.account, symbol, *side).await
            }
        }
        .map_err(ReconcileError::store)?;

        let position = found.ok_or_else(|| {
            ReconcileError::MalformedRequest(format!("{pref} does not resolve to a position"))
        })?;
        if position.account != self.ctx.account {
            return Err(ReconcileError::UnauthorizedPosition(format!(
                "{pref} belongs to account {}",
                position.account
            )));
        }
        Ok(position)
    }

    /// Gate a local request into the store.
    ///
    /// `Err` only when the request cannot be tied to a position; every later
    /// failure is reported in the returned result.
    pub async fn submit(&self, req: SubmitRequest) -> Result<ReconcileResult, ReconcileError> {
        const CONTEXT: &str = "request.submit";

        let position = self.locate(&req.position).await?;
        let key_hint = req.request.map(|k| k.to_string());
        Ok(match self.submit_located(CONTEXT, &position, req).await {
            Ok(result) => result,
            Err(err) => {
                warn!(position = %position.key, code = err.code(), error = %err, "submit failed");
                ReconcileResult::failure(CONTEXT, key_hint, &err)
            }
        })
    }

    async fn submit_located(
        &self,
        context: &str,
        position: &Position,
        req: SubmitRequest,
    ) -> Result<ReconcileResult, ReconcileError> {
        let existing = match req.request {
            Some(key) => self
                .store
                .request(key)
                .await
                .map_err(ReconcileError::store)?,
            None => {
                let status = if position.is_open() {
                    RequestStatus::Pending
                } else {
                    RequestStatus::Queued
                };
                let filter = RequestFilter {
                    limit: Some(1),
                    ..RequestFilter::by_position(position.key, &[status])
                };
                self.store
                    .find_requests(&filter)
                    .await
                    .map_err(ReconcileError::store)?
                    .into_iter()
                    .next()
            }
        };

        let key = existing
            .as_ref()
            .map(|r| r.request)
            .or(req.request)
            .unwrap_or_else(RecordKey::generate);
        let request_type = self
            .reference(ReferenceTable::RequestType, &req.request_type)
            .await?;
        let auto = position.auto_enabled();

        let mut incoming = RequestRecord {
            request: key,
            position: position.key,
            action: req.action,
            margin_mode: req.margin_mode.unwrap_or(position.margin_mode),
            price: req.price,
            size: req.size,
            leverage: req.leverage.unwrap_or(position.leverage),
            request_type,
            reduce_only: req.reduce_only,
            order_id: None,
            state: None,
            status: req
                .status
                .or(existing.as_ref().map(|r| r.status))
                .unwrap_or(RequestStatus::Queued),
            memo: req.memo,
            broker_id: req.broker_id,
            create_time: existing.as_ref().map_or(req.update_time, |r| r.create_time),
            update_time: req.update_time,
            expiry_time: req
                .expiry_time
                .or(existing.as_ref().map(|r| r.expiry_time))
                .unwrap_or(req.update_time + self.ctx.default_expiry_chrono()),
        };

        let Some(current) = existing else {
            if auto {
                self.supersede_active(position.key, key, req.update_time)
                    .await;
            }
            incoming.memo.get_or_insert_with(|| "added locally".to_string());
            let plan = plan_request(Source::Submit, None, incoming, auto);
            return Ok(self.apply_request_plan(context, key, plan).await?.result);
        };

        if let Freshness::Stale { .. } = Freshness::check(current.update_time, incoming.update_time)
        {
            return Ok(ReconcileResult::exists(
                context,
                key,
                codes::SUBMIT_EXISTS,
                "request not newer than the stored revision",
            ));
        }

        if auto {
            self.supersede_active(position.key, key, req.update_time)
                .await;
            if current.status == RequestStatus::Pending {
                incoming.status = RequestStatus::Hold;
                incoming
                    .memo
                    .get_or_insert_with(|| "put on hold; awaiting cancel for resubmit".to_string());
            }
        }
        incoming.memo.get_or_insert_with(|| "updated locally".to_string());

        let plan = plan_request(Source::Submit, Some(&current), incoming, auto);
        Ok(self.apply_request_plan(context, key, plan).await?.result)
    }

    /// Cancel every other active request on `position`.
    pub(crate) async fn supersede_active(
        &self,
        position: PositionKey,
        keep: RecordKey,
        now: DateTime<Utc>,
    ) -> Vec<ReconcileResult> {
        let filter = RequestFilter::by_position(position, &RequestStatus::ACTIVE);
        let active = match self.store.find_requests(&filter).await {
            Ok(rows) => rows,
            Err(e) => {
                let err = ReconcileError::store(e);
                warn!(%position, error = %err, "active request lookup failed");
                return vec![ReconcileResult::failure("request.supersede", None, &err)];
            }
        };

        let results = join_all(
            active
                .into_iter()
                .filter(|r| r.request != keep)
                .map(|r| self.cancel_one("request.supersede", r, SUPERSEDED_MEMO, now)),
        )
        .await;

        for r in &results {
            info!(%position, result = %r, "active request superseded");
        }
        results
    }
}
