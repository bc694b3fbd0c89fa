//! Submission acknowledgements.
//!
//! The exchange answers a batch submission with one ack per order. An
//! accepted ack moves the request to `Pending` and attaches the broker order
//! id; a refused one moves it to `Rejected` with the exchange message as memo.

use chrono::Utc;
use futures_util::future::join_all;
use tracing::warn;

use reckon_broker::SubmitAck;
use reckon_model::{
    next_after, RecordKey, ReconcileError, ReconcileResult, RequestStatus, Source,
};

use crate::merge::plan_request;
use crate::Engine;

pub const REJECTED_MEMO_PREFIX: &str = "[Rejected]";

impl Engine {
    pub async fn acknowledge(&self, acks: Vec<SubmitAck>) -> Vec<ReconcileResult> {
        const CONTEXT: &str = "request.ack";

        join_all(acks.into_iter().map(|ack| async move {
            let hint = ack.client_id().map(str::to_string);
            match self.apply_ack(CONTEXT, &ack).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(client_order_id = ?hint, code = err.code(), error = %err, "ack failed");
                    ReconcileResult::failure(CONTEXT, hint, &err)
                }
            }
        }))
        .await
    }

    async fn apply_ack(
        &self,
        context: &str,
        ack: &SubmitAck,
    ) -> Result<ReconcileResult, ReconcileError> {
        let raw_id = ack.client_id().ok_or_else(|| {
            ReconcileError::InvalidId("ack carries no client order id".to_string())
        })?;
        let key = RecordKey::from_client_order_id(raw_id)
            .map_err(|e| ReconcileError::InvalidId(format!("client order id: {e}")))?;

        let current = self
            .store
            .request(key)
            .await
            .map_err(ReconcileError::store)?
            .ok_or_else(|| ReconcileError::RequestNotFound(key.to_string()))?;

        let mut incoming = current.clone();
        incoming.update_time = next_after(current.update_time, Utc::now());
        if ack.accepted() {
            incoming.status = RequestStatus::Pending;
            incoming.order_id = ack.numeric_id().or(current.order_id);
        } else {
            incoming.status = RequestStatus::Rejected;
            incoming.memo = Some(format!(
                "{REJECTED_MEMO_PREFIX} {} {}",
                ack.code.as_deref().unwrap_or("-"),
                ack.msg.as_deref().unwrap_or("")
            ));
        }

        let plan = plan_request(Source::Ack, Some(&current), incoming, false);
        Ok(self.apply_request_plan(context, key, plan).await?.result)
    }
}
