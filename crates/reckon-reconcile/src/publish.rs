use std::collections::BTreeMap;

use futures_util::future::join_all;
use tracing::{debug, warn};

use reckon_broker::{RawOrder, RawStopOrder};
use reckon_model::{
    codes, OrderRecord, RecordKey, ReconcileError, ReconcileResult, RequestPatch, RequestStatus,
    Source, StopOrderRecord, StopRequestPatch, StopType,
};

use crate::merge::{
    combine_leg_results, plan_order, plan_request, plan_stop, plan_stop_order, MirrorPlan, Plan,
    RequestPlan, StopPlan,
};
use crate::normalizer::{normalize, BatchRecord};
use crate::Engine;

/// One merge result plus the status the record landed in, when it was
/// written. Import uses the status for its tallies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub result: ReconcileResult,
    pub status: Option<RequestStatus>,
}

impl Outcome {
    fn written(result: ReconcileResult, status: RequestStatus) -> Self {
        Self {
            result,
            status: Some(status),
        }
    }

    fn unchanged(result: ReconcileResult) -> Self {
        Self {
            result,
            status: None,
        }
    }

    pub(crate) fn failed(context: &str, key: Option<String>, err: &ReconcileError) -> Self {
        Self::unchanged(ReconcileResult::failure(context, key, err))
    }
}

fn stale_message(stored: chrono::DateTime<chrono::Utc>, got: chrono::DateTime<chrono::Utc>) -> String {
    format!(
        "revision at {} is not newer than stored {}",
        got.timestamp_millis(),
        stored.timestamp_millis()
    )
}

// ---------------------------------------------------------------------------
// Plan execution
// ---------------------------------------------------------------------------

impl Engine {
    pub(crate) async fn apply_request_plan(
        &self,
        context: &str,
        key: RecordKey,
        plan: RequestPlan,
    ) -> Result<Outcome, ReconcileError> {
        match plan {
            Plan::Insert(rec) => {
                let status = rec.status;
                let rows = self
                    .store
                    .insert_request(&rec)
                    .await
                    .map_err(ReconcileError::store)?;
                let result = ReconcileResult::inserted(context, key, rows)
                    .with_message(format!("request inserted; status {status}"));
                Ok(Outcome::written(result, status))
            }
            Plan::Stale { stored, got } => Ok(Outcome::unchanged(ReconcileResult::exists(
                context,
                key,
                codes::EXISTS,
                stale_message(stored, got),
            ))),
            Plan::Touch(update_time) => {
                let patch = RequestPatch {
                    update_time: Some(update_time),
                    ..RequestPatch::default()
                };
                self.store
                    .update_request(key, &patch)
                    .await
                    .map_err(ReconcileError::store)?;
                Ok(Outcome::unchanged(ReconcileResult::exists(
                    context,
                    key,
                    codes::EXISTS,
                    "no changes; update time advanced",
                )))
            }
            Plan::Update { patch, status } => {
                let rows = self
                    .store
                    .update_request(key, &patch)
                    .await
                    .map_err(ReconcileError::store)?;
                if rows == 0 {
                    return Err(ReconcileError::RequestNotFound(key.to_string()));
                }
                let result = ReconcileResult::updated(context, key, rows)
                    .with_message(format!("request updated; status {status}"));
                Ok(Outcome::written(result, status))
            }
        }
    }

    pub(crate) async fn apply_stop_plan(
        &self,
        context: &str,
        key: RecordKey,
        stop_type: StopType,
        plan: StopPlan,
    ) -> Result<Outcome, ReconcileError> {
        let label = format!("{key}/{stop_type}");
        match plan {
            Plan::Insert(rec) => {
                let status = rec.status;
                let rows = self
                    .store
                    .insert_stop_request(&rec)
                    .await
                    .map_err(ReconcileError::store)?;
                let result = ReconcileResult::inserted(context, &label, rows)
                    .with_message(format!("stop leg inserted; status {status}"));
                Ok(Outcome::written(result, status))
            }
            Plan::Stale { stored, got } => Ok(Outcome::unchanged(ReconcileResult::exists(
                context,
                &label,
                codes::EXISTS,
                stale_message(stored, got),
            ))),
            Plan::Touch(update_time) => {
                let patch = StopRequestPatch {
                    update_time: Some(update_time),
                    ..StopRequestPatch::default()
                };
                self.store
                    .update_stop_request(key, stop_type, &patch)
                    .await
                    .map_err(ReconcileError::store)?;
                Ok(Outcome::unchanged(ReconcileResult::exists(
                    context,
                    &label,
                    codes::EXISTS,
                    "no changes; update time advanced",
                )))
            }
            Plan::Update { patch, status } => {
                let rows = self
                    .store
                    .update_stop_request(key, stop_type, &patch)
                    .await
                    .map_err(ReconcileError::store)?;
                if rows == 0 {
                    return Err(ReconcileError::StopNotFound(label));
                }
                let result = ReconcileResult::updated(context, &label, rows)
                    .with_message(format!("stop leg updated; status {status}"));
                Ok(Outcome::written(result, status))
            }
        }
    }

    async fn merge_order_mirror(&self, rec: OrderRecord) -> Result<u64, ReconcileError> {
        let current = self
            .store
            .order(rec.order_id)
            .await
            .map_err(ReconcileError::store)?;
        let order_id = rec.order_id;
        let rows = match plan_order(current.as_ref(), rec) {
            MirrorPlan::Insert(rec) => self.store.insert_order(&rec).await,
            MirrorPlan::Update(patch) => self.store.update_order(order_id, &patch).await,
            MirrorPlan::Skip => Ok(0),
        }
        .map_err(ReconcileError::store)?;
        Ok(rows)
    }

    async fn merge_stop_order_mirror(&self, rec: StopOrderRecord) -> Result<u64, ReconcileError> {
        let current = self
            .store
            .stop_order(rec.tpsl_id)
            .await
            .map_err(ReconcileError::store)?;
        let tpsl_id = rec.tpsl_id;
        let rows = match plan_stop_order(current.as_ref(), rec) {
            MirrorPlan::Insert(rec) => self.store.insert_stop_order(&rec).await,
            MirrorPlan::Update(patch) => self.store.update_stop_order(tpsl_id, &patch).await,
            MirrorPlan::Skip => Ok(0),
        }
        .map_err(ReconcileError::store)?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Broker batches
// ---------------------------------------------------------------------------

/// Results for the records the normalizer could not key.
fn rejected<R: BatchRecord>(context: &str, invalid: Vec<(R, ReconcileError)>) -> Vec<Outcome> {
    invalid
        .into_iter()
        .map(|(raw, err)| {
            warn!(context, code = err.code(), error = %err, "record rejected before merge");
            Outcome::failed(context, raw.client_id().map(str::to_string), &err)
        })
        .collect()
}

fn superseded_result(context: &str, key: RecordKey, mirrored: bool) -> Outcome {
    let message = if mirrored {
        "superseded by a newer revision in the same batch; mirror merged"
    } else {
        "superseded by a newer revision in the same batch"
    };
    Outcome::unchanged(ReconcileResult::exists(context, key, codes::EXISTS, message))
}

/// Superseded revisions whose broker id differs from the winner's carry a
/// mirror row of their own.
fn needs_own_mirror<R: BatchRecord>(
    winners: &BTreeMap<RecordKey, R>,
    key: &RecordKey,
    raw: &R,
) -> bool {
    match (raw.numeric_id(), winners.get(key).and_then(|w| w.numeric_id())) {
        (Some(id), Some(winner_id)) => id != winner_id,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

impl Engine {
    /// Merge a batch of exchange orders. One result per input record.
    pub async fn publish_orders(&self, source: Source, batch: Vec<RawOrder>) -> Vec<ReconcileResult> {
        self.publish_orders_detailed(source, batch)
            .await
            .into_iter()
            .map(|o| o.result)
            .collect()
    }

    pub(crate) async fn publish_orders_detailed(
        &self,
        source: Source,
        batch: Vec<RawOrder>,
    ) -> Vec<Outcome> {
        let context = format!("order.{source}");
        let normalized = normalize(batch);
        let mut out = rejected(&context, normalized.invalid);

        let superseded: Vec<(RecordKey, RawOrder, bool)> = normalized
            .superseded
            .into_iter()
            .map(|(key, raw)| {
                let own = needs_own_mirror(&normalized.records, &key, &raw);
                (key, raw, own)
            })
            .collect();

        let merged = join_all(
            normalized
                .records
                .into_iter()
                .map(|(key, raw)| self.publish_order(source, &context, key, raw)),
        )
        .await;
        out.extend(merged);

        // Sequential: two superseded revisions may share a broker id.
        for (key, raw, own) in superseded {
            out.push(if own {
                self.mirror_superseded_order(source, &context, key, &raw)
                    .await
            } else {
                superseded_result(&context, key, false)
            });
        }
        out
    }

    async fn mirror_superseded_order(
        &self,
        source: Source,
        context: &str,
        key: RecordKey,
        raw: &RawOrder,
    ) -> Outcome {
        let mirrored = match self.resolve_order(source, key, raw).await {
            Ok(resolved) => match resolved.mirror {
                Some(mirror) => self.merge_order_mirror(mirror).await,
                None => Ok(0),
            },
            Err(err) => Err(err),
        };
        match mirrored {
            Ok(rows) => {
                debug!(%key, rows, "superseded order mirrored");
                superseded_result(context, key, true)
            }
            Err(err) => {
                warn!(%source, %key, code = err.code(), error = %err, "superseded order mirror failed");
                Outcome::failed(context, Some(key.to_string()), &err)
            }
        }
    }

    async fn publish_order(
        &self,
        source: Source,
        context: &str,
        key: RecordKey,
        raw: RawOrder,
    ) -> Outcome {
        match self.merge_order(source, context, key, &raw).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%source, %key, code = err.code(), error = %err, "order merge failed");
                Outcome::failed(context, Some(key.to_string()), &err)
            }
        }
    }

    async fn merge_order(
        &self,
        source: Source,
        context: &str,
        key: RecordKey,
        raw: &RawOrder,
    ) -> Result<Outcome, ReconcileError> {
        let resolved = self.resolve_order(source, key, raw).await?;

        // Mirror first: a failed mirror write must leave the request
        // untouched so a redelivery retries both.
        if let Some(mirror) = resolved.mirror {
            let rows = self.merge_order_mirror(mirror).await?;
            debug!(%key, rows, "order mirror merged");
        }

        let current = self
            .store
            .request(key)
            .await
            .map_err(ReconcileError::store)?;
        let plan = plan_request(
            source,
            current.as_ref(),
            resolved.request,
            resolved.position.auto_enabled(),
        );
        let outcome = self.apply_request_plan(context, key, plan).await?;

        debug!(
            %source,
            %key,
            state = %outcome.result.state,
            rows = outcome.result.rows,
            "order merged"
        );
        Ok(outcome)
    }

    /// Merge a batch of exchange stop (TP/SL) orders. One result per input
    /// record; the legs of one stop order are folded together.
    pub async fn publish_stops(
        &self,
        source: Source,
        batch: Vec<RawStopOrder>,
    ) -> Vec<ReconcileResult> {
        self.publish_stops_detailed(source, batch)
            .await
            .into_iter()
            .map(|o| o.result)
            .collect()
    }

    pub(crate) async fn publish_stops_detailed(
        &self,
        source: Source,
        batch: Vec<RawStopOrder>,
    ) -> Vec<Outcome> {
        let context = format!("stop.{source}");
        let normalized = normalize(batch);
        let mut out = rejected(&context, normalized.invalid);

        let superseded: Vec<(RecordKey, RawStopOrder, bool)> = normalized
            .superseded
            .into_iter()
            .map(|(key, raw)| {
                let own = needs_own_mirror(&normalized.records, &key, &raw);
                (key, raw, own)
            })
            .collect();

        let merged = join_all(
            normalized
                .records
                .into_iter()
                .map(|(key, raw)| self.publish_stop(source, &context, key, raw)),
        )
        .await;
        out.extend(merged);

        for (key, raw, own) in superseded {
            out.push(if own {
                self.mirror_superseded_stop(source, &context, key, &raw)
                    .await
            } else {
                superseded_result(&context, key, false)
            });
        }
        out
    }

    async fn mirror_superseded_stop(
        &self,
        source: Source,
        context: &str,
        key: RecordKey,
        raw: &RawStopOrder,
    ) -> Outcome {
        let mirrored = match self.resolve_stop(source, key, raw).await {
            Ok(resolved) => match resolved.mirror {
                Some(mirror) => self.merge_stop_order_mirror(mirror).await,
                None => Ok(0),
            },
            Err(err) => Err(err),
        };
        match mirrored {
            Ok(rows) => {
                debug!(%key, rows, "superseded stop order mirrored");
                superseded_result(context, key, true)
            }
            Err(err) => {
                warn!(%source, %key, code = err.code(), error = %err, "superseded stop mirror failed");
                Outcome::failed(context, Some(key.to_string()), &err)
            }
        }
    }

    async fn publish_stop(
        &self,
        source: Source,
        context: &str,
        key: RecordKey,
        raw: RawStopOrder,
    ) -> Outcome {
        match self.merge_stop(source, context, key, &raw).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%source, %key, code = err.code(), error = %err, "stop merge failed");
                Outcome::failed(context, Some(key.to_string()), &err)
            }
        }
    }

    async fn merge_stop(
        &self,
        source: Source,
        context: &str,
        key: RecordKey,
        raw: &RawStopOrder,
    ) -> Result<Outcome, ReconcileError> {
        let resolved = self.resolve_stop(source, key, raw).await?;
        let auto = resolved.position.auto_enabled();

        if let Some(mirror) = resolved.mirror {
            let rows = self.merge_stop_order_mirror(mirror).await?;
            debug!(%key, rows, "stop order mirror merged");
        }

        let mut legs = Vec::with_capacity(resolved.legs.len());
        let mut status = None;
        for leg in resolved.legs {
            let stop_type = leg.stop_type;
            let current = self
                .store
                .stop_request(key, stop_type)
                .await
                .map_err(ReconcileError::store)?;
            let plan = plan_stop(source, current.as_ref(), leg, auto);
            let outcome = self.apply_stop_plan(context, key, stop_type, plan).await?;
            status = status.or(outcome.status);
            legs.push(outcome.result);
        }

        let result = combine_leg_results(context, &key.to_string(), legs);
        debug!(%source, %key, state = %result.state, rows = result.rows, "stop merged");
        Ok(Outcome { result, status })
    }
}
