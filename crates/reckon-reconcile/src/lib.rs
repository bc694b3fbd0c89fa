//! reckon-reconcile
//!
//! Broker-state reconciliation engine.
//!
//! Incoming exchange records (paged history/pending syncs and pushed updates),
//! local submissions, cancellations, submission acks and the expiry sweep all
//! converge on one merge path:
//!
//! - [`normalize`] collapses a batch to one revision per logical key;
//! - resolution turns raw exchange fields into typed records via the
//!   [`Resolver`](reckon_db::Resolver);
//! - [`merge`] plans insert / skip / touch / patch under the chronology guard
//!   and the lifecycle rules;
//! - the [`Engine`] executes the plan against the [`Store`](reckon_db::Store)
//!   and reports exactly one [`ReconcileResult`](reckon_model::ReconcileResult)
//!   per input record.
//!
//! Per-record failures never abort a batch. Only [`Engine::submit`]
//! precondition failures and a total import fetch failure surface as `Err`.

use std::sync::Arc;

use reckon_db::{Resolver, Store};
use reckon_model::SyncContext;

mod acks;
mod cancel;
mod fetcher;
mod import;
pub mod merge;
mod normalizer;
mod publish;
mod resolve;
mod stops;
mod submit;
mod sweep;

pub use acks::REJECTED_MEMO_PREFIX;
pub use cancel::CANCELED_MEMO;
pub use fetcher::{Book, FeedRecord, FetchOutcome, Fetcher, Pass};
pub use import::{FeedTally, ImportReport};
pub use normalizer::{logical_key, normalize, BatchRecord, Normalized};
pub use publish::Outcome;
pub use stops::SubmitStopRequest;
pub use submit::{PositionRef, SubmitRequest, SUPERSEDED_MEMO};
pub use sweep::EXPIRED_MEMO;

/// Reconciliation engine for one account.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    resolver: Arc<dyn Resolver>,
    ctx: SyncContext,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, resolver: Arc<dyn Resolver>, ctx: SyncContext) -> Self {
        Self {
            store,
            resolver,
            ctx,
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}
