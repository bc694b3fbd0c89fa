//! Order feed merge
//!
//! # Behavior under test
//! - a new exchange order is inserted with its mapped status and mirrored;
//! - a newer revision with a changed field is written, an older one is a
//!   no-op with zero rows;
//! - replaying the same batch changes nothing;
//! - two revisions of one key in a batch: only the newest is merged, the
//!   other is reported as superseded;
//! - one bad record in a batch fails alone with its code, the rest merge;
//! - a first history sighting keeps its mapped status; a newer history
//!   revision of a stored order still reported live lands as `Expired`;
//! - an auto-managed position keeps its stored trade parameters and parks a
//!   live order in `Hold`, except on history revisions, which adopt the
//!   exchange's parameters;
//! - a failed mirror write leaves the request unwritten, so redelivering the
//!   record writes both;
//! - a superseded revision with its own broker order id still gets its
//!   mirror row;
//! - a missing fallback reference code is caught by the startup check.

use std::sync::Arc;

use rust_decimal::Decimal;

use reckon_db::{MemoryResolver, MemoryStore};
use reckon_model::{
    codes, PositionSide, RecordKey, ReferenceTable, RequestStatus, ResultState, Source,
};
use reckon_reconcile::Engine;
use reckon_testkit::{
    at, auto_position, context, raw_order, seeded_resolver, FaultStore, SYMBOL,
};

fn engine_with(resolver: MemoryResolver) -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store.clone(), Arc::new(resolver), context());
    (engine, store)
}

fn key(raw: &str) -> RecordKey {
    RecordKey::from_client_order_id(raw).unwrap()
}

#[tokio::test]
async fn newer_revision_updates_and_older_revision_is_ignored() {
    let (engine, store) = engine_with(seeded_resolver());

    let first = engine
        .publish_orders(Source::Pending, vec![raw_order("0xAB", 9001, "live", 100)])
        .await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].state, ResultState::Inserted);
    assert_eq!(first[0].code, codes::INSERTED);
    assert_eq!(first[0].rows, 1);
    assert_eq!(first[0].key.as_deref(), Some("0x0000000000ab"));

    let stored = store.requests().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, RequestStatus::Pending);
    assert_eq!(stored[0].order_id, Some(9001));
    assert_eq!(store.orders().await.len(), 1);

    let mut repriced = raw_order("0xAB", 9001, "live", 200);
    repriced.price = Some("12".to_string());
    let second = engine.publish_orders(Source::Pending, vec![repriced]).await;
    assert_eq!(second[0].state, ResultState::Updated);
    assert_eq!(second[0].rows, 1);

    let stored = store.requests().await;
    assert_eq!(stored[0].price, Some(Decimal::from(12)));
    assert_eq!(stored[0].status, RequestStatus::Pending);
    assert_eq!(stored[0].update_time, at(200));

    let mut late = raw_order("0xAB", 9001, "filled", 150);
    late.price = Some("11".to_string());
    let third = engine.publish_orders(Source::Pending, vec![late]).await;
    assert!(third[0].success);
    assert_eq!(third[0].state, ResultState::Exists);
    assert_eq!(third[0].rows, 0);

    let stored = store.requests().await;
    assert_eq!(stored[0].price, Some(Decimal::from(12)));
    assert_eq!(stored[0].status, RequestStatus::Pending);
    assert_eq!(stored[0].update_time, at(200));
}

#[tokio::test]
async fn replaying_a_batch_changes_nothing() {
    let (engine, store) = engine_with(seeded_resolver());
    let batch = vec![
        raw_order("0x01", 1, "live", 100),
        raw_order("0x02", 2, "filled", 110),
    ];

    let first = engine.publish_orders(Source::Pending, batch.clone()).await;
    assert!(first.iter().all(|r| r.state == ResultState::Inserted));
    let before = store.requests().await;

    let again = engine.publish_orders(Source::Pending, batch).await;
    assert_eq!(again.len(), 2);
    assert!(again.iter().all(|r| r.is_noop() && r.rows == 0));
    assert_eq!(store.requests().await, before);
}

#[tokio::test]
async fn in_batch_duplicates_keep_the_newest_revision() {
    let (engine, store) = engine_with(seeded_resolver());

    let mut newer = raw_order("0x0c", 3, "filled", 300);
    newer.filled_size = Some("5".to_string());
    let results = engine
        .publish_orders(
            Source::Pending,
            vec![raw_order("0x0c", 3, "live", 250), newer],
        )
        .await;

    assert_eq!(results.len(), 2);
    let superseded: Vec<_> = results
        .iter()
        .filter(|r| r.message.contains("superseded"))
        .collect();
    assert_eq!(superseded.len(), 1);
    assert_eq!(superseded[0].rows, 0);
    assert!(results.iter().any(|r| r.state == ResultState::Inserted));

    let stored = store.requests().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, RequestStatus::Fulfilled);
    assert_eq!(stored[0].update_time, at(300));
    assert_eq!(store.orders().await[0].filled_size, Decimal::from(5));
}

#[tokio::test]
async fn one_bad_record_does_not_abort_the_batch() {
    let (engine, store) = engine_with(seeded_resolver());

    let mut batch: Vec<_> = (1..=5u64)
        .map(|n| raw_order(&format!("0x{n:02x}"), n, "live", 100 + n as i64))
        .collect();
    batch[2].order_type = Some("iceberg".to_string());

    let results = engine.publish_orders(Source::Pending, batch).await;
    assert_eq!(results.len(), 5);

    let failed: Vec<_> = results.iter().filter(|r| !r.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].code, codes::UNRESOLVED_STATE);
    assert_eq!(failed[0].key.as_deref(), Some("0x000000000003"));
    assert_eq!(
        results
            .iter()
            .filter(|r| r.state == ResultState::Inserted)
            .count(),
        4
    );
    assert_eq!(store.requests().await.len(), 4);
}

#[tokio::test]
async fn unowned_instrument_and_missing_ids_fail_with_their_codes() {
    let (engine, store) = engine_with(seeded_resolver());

    let mut foreign = raw_order("0x10", 10, "live", 100);
    foreign.inst_id = Some("ETH-USDT".to_string());
    let mut anonymous = raw_order("", 0, "live", 100);
    anonymous.order_id = None;

    let results = engine
        .publish_orders(Source::Pending, vec![foreign, anonymous])
        .await;
    let mut codes_seen: Vec<i32> = results.iter().map(|r| r.code).collect();
    codes_seen.sort();
    assert_eq!(
        codes_seen,
        vec![codes::INVALID_ID, codes::UNAUTHORIZED_POSITION]
    );
    assert!(store.requests().await.is_empty());
}

#[tokio::test]
async fn first_history_sighting_keeps_the_mapped_status() {
    let (engine, store) = engine_with(seeded_resolver());

    let results = engine
        .publish_orders(
            Source::History,
            vec![
                raw_order("0x21", 21, "live", 100),
                raw_order("0x22", 22, "filled", 100),
            ],
        )
        .await;
    assert!(results.iter().all(|r| r.state == ResultState::Inserted));

    let stored = store.requests().await;
    let status_of = |k: &str| {
        stored
            .iter()
            .find(|r| r.request == key(k))
            .map(|r| r.status)
    };
    assert_eq!(status_of("0x21"), Some(RequestStatus::Pending));
    assert_eq!(status_of("0x22"), Some(RequestStatus::Fulfilled));
    assert_eq!(
        stored[0].memo.as_deref(),
        Some("Updated via history sync")
    );
}

#[tokio::test]
async fn newer_history_revision_still_reported_live_expires_the_request() {
    let (engine, store) = engine_with(seeded_resolver());

    engine
        .publish_orders(Source::Pending, vec![raw_order("0x23", 23, "live", 100)])
        .await;
    assert_eq!(store.requests().await[0].status, RequestStatus::Pending);

    let results = engine
        .publish_orders(Source::History, vec![raw_order("0x23", 23, "live", 200)])
        .await;
    assert_eq!(results[0].state, ResultState::Updated);

    let stored = store.requests().await;
    assert_eq!(stored[0].status, RequestStatus::Expired);
    assert_eq!(stored[0].update_time, at(200));
}

#[tokio::test]
async fn auto_position_keeps_stored_parameters_and_holds_live_orders() {
    let resolver = seeded_resolver().with_position(auto_position(1, SYMBOL, PositionSide::Net));
    let (engine, store) = engine_with(resolver);

    engine
        .publish_orders(Source::Pending, vec![raw_order("0x31", 31, "filled", 100)])
        .await;

    let mut drifted = raw_order("0x31", 31, "live", 200);
    drifted.price = Some("99".to_string());
    drifted.size = Some("1".to_string());
    let results = engine.publish_orders(Source::Push, vec![drifted]).await;
    assert_eq!(results[0].state, ResultState::Updated);

    let stored = store.requests().await;
    assert_eq!(stored[0].status, RequestStatus::Hold);
    assert_eq!(stored[0].price, Some(Decimal::from(10)));
    assert_eq!(stored[0].size, Decimal::from(5));
    assert_eq!(stored[0].memo.as_deref(), Some("Updated via push"));
}

#[tokio::test]
async fn market_orders_store_no_price() {
    let (engine, store) = engine_with(seeded_resolver());

    let mut market = raw_order("0x41", 41, "filled", 100);
    market.order_type = Some("market".to_string());
    market.price = Some("-1".to_string());
    engine.publish_orders(Source::Pending, vec![market]).await;

    assert_eq!(store.requests().await[0].price, None);
}

#[tokio::test]
async fn history_revision_on_auto_position_adopts_the_exchange_parameters() {
    let resolver = seeded_resolver().with_position(auto_position(1, SYMBOL, PositionSide::Net));
    let (engine, store) = engine_with(resolver);

    engine
        .publish_orders(Source::Pending, vec![raw_order("0x32", 32, "live", 100)])
        .await;

    let mut settled = raw_order("0x32", 32, "filled", 200);
    settled.price = Some("99".to_string());
    settled.size = Some("1".to_string());
    settled.leverage = Some("7".to_string());
    let results = engine.publish_orders(Source::History, vec![settled]).await;
    assert_eq!(results[0].state, ResultState::Updated);

    let stored = store.requests().await;
    assert_eq!(stored[0].status, RequestStatus::Fulfilled);
    assert_eq!(stored[0].price, Some(Decimal::from(99)));
    assert_eq!(stored[0].size, Decimal::from(1));
    assert_eq!(stored[0].leverage, 7);
    assert_eq!(stored[0].memo.as_deref(), Some("Updated via history sync"));
}

#[tokio::test]
async fn failed_mirror_write_leaves_the_request_for_redelivery() {
    let memory = Arc::new(MemoryStore::new());
    let faulty = Arc::new(FaultStore::new(memory.clone()));
    let engine = Engine::new(faulty.clone(), Arc::new(seeded_resolver()), context());
    let batch = vec![raw_order("0x51", 51, "live", 100)];

    faulty.set_mirrors_down(true);
    let failed = engine.publish_orders(Source::Pending, batch.clone()).await;
    assert_eq!(failed.len(), 1);
    assert!(!failed[0].success);
    assert_eq!(failed[0].code, codes::UNCLASSIFIED);
    assert!(memory.requests().await.is_empty());
    assert!(memory.orders().await.is_empty());

    faulty.set_mirrors_down(false);
    let retried = engine.publish_orders(Source::Pending, batch).await;
    assert_eq!(retried[0].state, ResultState::Inserted);
    assert_eq!(memory.requests().await.len(), 1);
    assert_eq!(memory.orders().await.len(), 1);
}

#[tokio::test]
async fn superseded_revision_with_its_own_order_id_is_mirrored() {
    let (engine, store) = engine_with(seeded_resolver());

    let results = engine
        .publish_orders(
            Source::Pending,
            vec![
                raw_order("0x0d", 4, "canceled", 250),
                raw_order("0x0d", 5, "live", 300),
            ],
        )
        .await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    assert!(results.iter().any(|r| r.state == ResultState::Inserted));
    assert!(results.iter().any(|r| r.message.contains("mirror merged")));

    let mut order_ids: Vec<u64> = store.orders().await.iter().map(|o| o.order_id).collect();
    order_ids.sort();
    assert_eq!(order_ids, vec![4, 5]);

    let stored = store.requests().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].order_id, Some(5));
}

#[tokio::test]
async fn startup_check_catches_a_missing_fallback_code() {
    let (engine, _) = engine_with(seeded_resolver());
    assert!(engine.check_reference_tables().await.is_ok());

    let broken = MemoryResolver::new()
        .with_reference(ReferenceTable::CancelSource, "not_canceled")
        .with_reference(ReferenceTable::RequestType, "limit");
    let (engine, _) = engine_with(broken);
    let err = engine.check_reference_tables().await.unwrap_err();
    assert_eq!(err.code(), codes::UNRESOLVED_STATE);
    assert!(err.to_string().contains("normal"));
}
