//! Expiry sweep: `Queued` past expiry becomes `Expired`, `Pending` past
//! expiry becomes `Canceled`.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{info, warn};

use reckon_db::{RequestFilter, StopFilter};
use reckon_model::{ReconcileError, ReconcileResult, RequestStatus};

use crate::Engine;

pub const EXPIRED_MEMO: &str = "[Expired]";

fn sweep_target(status: RequestStatus) -> RequestStatus {
    match status {
        RequestStatus::Pending => RequestStatus::Canceled,
        _ => RequestStatus::Expired,
    }
}

impl Engine {
    /// Sweep requests and stop legs whose expiry is before `now`. Nothing to
    /// sweep yields no results.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Vec<ReconcileResult> {
        let statuses = vec![RequestStatus::Queued, RequestStatus::Pending];
        let mut results = Vec::new();

        match self
            .store
            .find_requests(&RequestFilter {
                statuses: statuses.clone(),
                expired_before: Some(now),
                ..RequestFilter::default()
            })
            .await
        {
            Ok(rows) => {
                let swept = join_all(rows.into_iter().map(|rec| async move {
                    let key = rec.request;
                    let target = sweep_target(rec.status);
                    self.transition_request("request.sweep", rec, target, EXPIRED_MEMO, now)
                        .await
                        .unwrap_or_else(|err| {
                            warn!(%key, code = err.code(), error = %err, "sweep failed");
                            ReconcileResult::failure("request.sweep", Some(key.to_string()), &err)
                        })
                }))
                .await;
                results.extend(swept);
            }
            Err(e) => {
                let err = ReconcileError::store(e);
                warn!(error = %err, "sweep lookup failed");
                results.push(ReconcileResult::failure("request.sweep", None, &err));
            }
        }

        match self
            .store
            .find_stop_requests(&StopFilter {
                statuses,
                expired_before: Some(now),
                ..StopFilter::default()
            })
            .await
        {
            Ok(legs) => {
                let swept = join_all(legs.into_iter().map(|leg| {
                    let target = sweep_target(leg.status);
                    self.transition_stop_logged("stop.sweep", leg, target, EXPIRED_MEMO, now)
                }))
                .await;
                results.extend(swept);
            }
            Err(e) => {
                let err = ReconcileError::store(e);
                warn!(error = %err, "stop sweep lookup failed");
                results.push(ReconcileResult::failure("stop.sweep", None, &err));
            }
        }

        if !results.is_empty() {
            info!(count = results.len(), "expired records swept");
        }
        results
    }
}
