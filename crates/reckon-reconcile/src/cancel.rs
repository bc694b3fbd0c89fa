//! Cancellation coordinator.
//!
//! Every match goes through the merge path with its cancel target: a live
//! (`Pending`) record becomes `Canceled`, anything else `Closed`. The stamp is
//! the first instant after the stored update time, so a cancel always passes
//! the chronology guard even against an exchange clock running ahead.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{info, warn};

use reckon_db::{RequestFilter, StopFilter};
use reckon_model::{
    next_after, ReconcileError, ReconcileResult, RequestRecord, RequestStatus, Source,
    StopRequestRecord,
};

use crate::merge::{plan_request, plan_stop};
use crate::Engine;

pub const CANCELED_MEMO: &str = "canceled by request";

impl Engine {
    /// Cancel every request matching `filter`. A filter without statuses
    /// selects the active ones.
    pub async fn cancel(&self, filter: &RequestFilter, memo: Option<&str>) -> Vec<ReconcileResult> {
        const CONTEXT: &str = "request.cancel";

        let mut filter = filter.clone();
        if filter.statuses.is_empty() {
            filter.statuses = RequestStatus::ACTIVE.to_vec();
        }

        let matched = match self.store.find_requests(&filter).await {
            Ok(rows) => rows,
            Err(e) => {
                let err = ReconcileError::store(e);
                warn!(error = %err, "cancel lookup failed");
                return vec![ReconcileResult::failure(CONTEXT, None, &err)];
            }
        };
        if matched.is_empty() {
            return vec![ReconcileResult::null_query(
                CONTEXT,
                "no request matched the cancel filter",
            )];
        }

        let now = Utc::now();
        let memo = memo.unwrap_or(CANCELED_MEMO);
        let results = join_all(
            matched
                .into_iter()
                .map(|rec| self.cancel_one(CONTEXT, rec, memo, now)),
        )
        .await;
        info!(count = results.len(), "requests canceled");
        results
    }

    pub(crate) async fn cancel_one(
        &self,
        context: &str,
        current: RequestRecord,
        memo: &str,
        now: DateTime<Utc>,
    ) -> ReconcileResult {
        let key = current.request;
        let target = current.status.cancel_target();
        self.transition_request(context, current, target, memo, now)
            .await
            .unwrap_or_else(|err| {
                warn!(%key, code = err.code(), error = %err, "request transition failed");
                ReconcileResult::failure(context, Some(key.to_string()), &err)
            })
    }

    /// Move a stored request to `target` through the merge path.
    pub(crate) async fn transition_request(
        &self,
        context: &str,
        current: RequestRecord,
        target: RequestStatus,
        memo: &str,
        now: DateTime<Utc>,
    ) -> Result<ReconcileResult, ReconcileError> {
        let key = current.request;
        let mut incoming = current.clone();
        incoming.status = target;
        incoming.memo = Some(memo.to_string());
        incoming.update_time = next_after(current.update_time, now);

        let plan = plan_request(Source::Cancel, Some(&current), incoming, false);
        Ok(self.apply_request_plan(context, key, plan).await?.result)
    }

    /// Stop-leg counterpart of [`Engine::cancel`].
    pub async fn cancel_stops(&self, filter: &StopFilter, memo: Option<&str>) -> Vec<ReconcileResult> {
        const CONTEXT: &str = "stop.cancel";

        let mut filter = filter.clone();
        if filter.statuses.is_empty() {
            filter.statuses = RequestStatus::ACTIVE.to_vec();
        }

        let matched = match self.store.find_stop_requests(&filter).await {
            Ok(rows) => rows,
            Err(e) => {
                let err = ReconcileError::store(e);
                warn!(error = %err, "stop cancel lookup failed");
                return vec![ReconcileResult::failure(CONTEXT, None, &err)];
            }
        };
        if matched.is_empty() {
            return vec![ReconcileResult::null_query(
                CONTEXT,
                "no stop leg matched the cancel filter",
            )];
        }

        let now = Utc::now();
        let memo = memo.unwrap_or(CANCELED_MEMO);
        join_all(matched.into_iter().map(|leg| {
            let target = leg.status.cancel_target();
            self.transition_stop_logged(CONTEXT, leg, target, memo, now)
        }))
        .await
    }

    pub(crate) async fn transition_stop_logged(
        &self,
        context: &str,
        current: StopRequestRecord,
        target: RequestStatus,
        memo: &str,
        now: DateTime<Utc>,
    ) -> ReconcileResult {
        let label = format!("{}/{}", current.stop_request, current.stop_type);
        self.transition_stop(context, current, target, memo, now)
            .await
            .unwrap_or_else(|err| {
                warn!(leg = %label, code = err.code(), error = %err, "stop transition failed");
                ReconcileResult::failure(context, Some(label), &err)
            })
    }

    async fn transition_stop(
        &self,
        context: &str,
        current: StopRequestRecord,
        target: RequestStatus,
        memo: &str,
        now: DateTime<Utc>,
    ) -> Result<ReconcileResult, ReconcileError> {
        let (key, stop_type) = current.leg();
        let mut incoming = current.clone();
        incoming.status = target;
        incoming.memo = Some(memo.to_string());
        incoming.update_time = next_after(current.update_time, now);

        let plan = plan_stop(Source::Cancel, Some(&current), incoming, false);
        Ok(self
            .apply_stop_plan(context, key, stop_type, plan)
            .await?
            .result)
    }
}
