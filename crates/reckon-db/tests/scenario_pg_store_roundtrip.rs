//! Postgres store round trip
//!
//! # Behavior under test
//! - migrations seed the reference tables the resolver reads;
//! - a request inserted through `PgStore` reads back identically;
//! - a patch updates only the fields it carries and reports one row;
//! - duplicate inserts fail (the merge engine relies on this);
//! - history cursors persist and only move forward.
//!
//! Requires a disposable database in RECKON_DATABASE_URL.

use chrono::{TimeZone, Utc};
use reckon_db::{
    connect_from_env, migrate, Cursor, CursorStore, NewPosition, PgStore, RequestFilter, Resolver,
    Store,
};
use reckon_model::{
    Action, AutoStatus, MarginMode, PositionSide, PositionStatus, RecordKey, ReferenceTable,
    RequestPatch, RequestRecord, RequestStatus,
};
use rust_decimal::Decimal;

async fn store() -> PgStore {
    let pool = connect_from_env().await.expect("connect");
    migrate(&pool).await.expect("migrate");
    PgStore::new(pool)
}

#[tokio::test]
#[ignore = "requires RECKON_DATABASE_URL; run: cargo test -p reckon-db -- --ignored"]
async fn request_insert_read_update_roundtrip() {
    let store = store().await;

    let position = store
        .upsert_position(&NewPosition {
            account: "IT".into(),
            symbol: "BTC-USDT".into(),
            side: PositionSide::Net,
            auto_status: AutoStatus::Disabled,
            status: PositionStatus::Closed,
            leverage: 3,
            margin_mode: MarginMode::Cross,
        })
        .await
        .expect("position");

    let limit = store
        .reference(ReferenceTable::RequestType, "limit")
        .await
        .unwrap()
        .expect("seeded request_type 'limit'");
    let live = store
        .order_state("live")
        .await
        .unwrap()
        .expect("seeded order state 'live'");
    assert_eq!(live.status, RequestStatus::Pending);

    let key = RecordKey::generate();
    let t = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let rec = RequestRecord {
        request: key,
        position,
        action: Action::Buy,
        margin_mode: MarginMode::Cross,
        price: Some(Decimal::new(6512345, 2)),
        size: Decimal::new(5, 1),
        leverage: 3,
        request_type: limit,
        reduce_only: false,
        order_id: Some(1_000_123),
        state: Some(live.state),
        status: RequestStatus::Pending,
        memo: None,
        broker_id: None,
        create_time: t,
        update_time: t,
        expiry_time: t + chrono::Duration::hours(8),
    };

    assert_eq!(store.insert_request(&rec).await.unwrap(), 1);
    assert!(
        store.insert_request(&rec).await.is_err(),
        "duplicate insert must fail"
    );
    assert_eq!(store.request(key).await.unwrap().as_ref(), Some(&rec));

    let patch = RequestPatch {
        price: Some(Decimal::new(6600000, 2)),
        update_time: Some(t + chrono::Duration::seconds(1)),
        ..RequestPatch::default()
    };
    assert_eq!(store.update_request(key, &patch).await.unwrap(), 1);

    let found = store
        .find_requests(&RequestFilter::by_position(position, &[RequestStatus::Pending]))
        .await
        .unwrap();
    let row = found.iter().find(|r| r.request == key).expect("row");
    assert_eq!(row.price, Some(Decimal::new(6600000, 2)));
    assert_eq!(row.size, rec.size, "untouched fields keep their value");
}

#[tokio::test]
#[ignore = "requires RECKON_DATABASE_URL; run: cargo test -p reckon-db -- --ignored"]
async fn cursor_persists_and_never_rewinds() {
    let store = store().await;

    store.save_cursor(Cursor::AuditStops, 41).await.unwrap();
    store.save_cursor(Cursor::AuditStops, 42).await.unwrap();
    assert_eq!(store.load_cursor(Cursor::AuditStops).await.unwrap(), Some(42));
    store.save_cursor(Cursor::AuditStops, 17).await.unwrap();
    assert_eq!(store.load_cursor(Cursor::AuditStops).await.unwrap(), Some(42));
}
