//! reckon-model
//!
//! Pure domain types for broker-state reconciliation: record keys, request and
//! stop-leg records, broker mirrors, lifecycle statuses, typed patches, the
//! chronology guard and per-record results.
//!
//! No IO. Store, resolver and exchange access live in `reckon-db` and
//! `reckon-broker`; the state-transition rules live in `reckon-reconcile`.

mod chronology;
mod context;
mod key;
mod patch;
mod record;
mod result;
mod status;

pub use chronology::{next_after, Freshness};
pub use context::{SyncContext, DEFAULT_EXPIRY_SECS, DEFAULT_PAGE_DELAY, DEFAULT_PAGE_SIZE};
pub use key::{KeyError, RecordKey, KEY_WIDTH};
pub use patch::{OrderPatch, RequestPatch, StopOrderPatch, StopRequestPatch};
pub use record::{
    MappedState, OrderRecord, Position, PositionKey, RefKey, ReferenceTable, RequestRecord,
    StopOrderRecord, StopRequestRecord,
};
pub use result::{codes, ReconcileError, ReconcileResult, ResultState};
pub use status::{
    Action, AutoStatus, MarginMode, PositionSide, PositionStatus, RequestStatus, Source, StopType,
};
