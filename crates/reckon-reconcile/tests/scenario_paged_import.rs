//! Paged fetch and import
//!
//! # Behavior under test
//! - history pages walk from the persisted cursor and persist it after every
//!   page; pending pages walk from 0;
//! - an empty page completes a pass;
//! - a failed request or the caller's deadline ends a pass early and keeps
//!   the records already fetched;
//! - import merges history and pending, reports one 203 total per pass and
//!   tallies the outcomes;
//! - import fails as a whole only when neither pass retrieved anything.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use reckon_broker::{paths, BrokerError, RawOrder, RawStopOrder};
use reckon_db::{Cursor, CursorStore, MemoryStore};
use reckon_model::{codes, RequestStatus, ResultState, Source};
use reckon_reconcile::{Book, Engine, Fetcher};
use reckon_testkit::{context, raw_order, raw_stop, seeded_resolver, FakeBroker, Step};

fn harness() -> (Arc<FakeBroker>, Arc<MemoryStore>, Fetcher, Engine) {
    let broker = Arc::new(FakeBroker::new());
    let store = Arc::new(MemoryStore::new());
    let ctx = context().with_page_size(2);
    let fetcher = Fetcher::new(broker.clone(), store.clone(), &ctx);
    let engine = Engine::new(store.clone(), Arc::new(seeded_resolver()), ctx);
    (broker, store, fetcher, engine)
}

fn http_503() -> BrokerError {
    BrokerError::Http {
        status: 503,
        body: "busy".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_pass_walks_pages_and_persists_the_cursor() {
    let (broker, store, fetcher, _) = harness();
    broker
        .page(
            paths::ORDERS_HISTORY,
            &[raw_order("0x01", 11, "filled", 100), raw_order("0x02", 12, "filled", 110)],
        )
        .page(paths::ORDERS_HISTORY, &[raw_order("0x03", 13, "filled", 120)]);

    let out = fetcher.fetch_history::<RawOrder>(None).await;
    assert!(out.complete);
    assert_eq!(out.error, None);
    assert_eq!(out.pages, 2);
    assert_eq!(out.records.len(), 3);
    assert_eq!(out.cursor, 13);
    assert_eq!(store.load_cursor(Cursor::AuditOrder).await.unwrap(), Some(13));

    let calls = broker.calls_to(paths::ORDERS_HISTORY);
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].param("before"), None);
    assert_eq!(calls[0].param("limit"), Some("2"));
    assert_eq!(calls[1].param("before"), Some("12"));
    assert_eq!(calls[2].param("before"), Some("13"));
}

#[tokio::test]
async fn history_pass_resumes_from_the_saved_cursor() {
    let (broker, store, fetcher, _) = harness();
    store.save_cursor(Cursor::AuditStops, 450).await.unwrap();

    let out = fetcher.fetch_history::<RawStopOrder>(None).await;
    assert!(out.complete);
    assert!(out.records.is_empty());
    assert_eq!(out.cursor, 450);

    let calls = broker.calls_to(paths::STOPS_HISTORY);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].param("before"), Some("450"));
}

#[tokio::test]
async fn pending_pass_starts_at_zero_and_leaves_cursors_alone() {
    let (broker, store, fetcher, _) = harness();
    broker.page(paths::ORDERS_PENDING, &[raw_order("0x05", 15, "live", 100)]);

    let out = fetcher.fetch_pending::<RawOrder>(None).await;
    assert!(out.complete);
    assert_eq!(out.records.len(), 1);

    let calls = broker.calls_to(paths::ORDERS_PENDING);
    assert_eq!(calls[0].param("after"), Some("0"));
    assert_eq!(calls[1].param("after"), Some("15"));
    assert_eq!(store.load_cursor(Cursor::AuditOrder).await.unwrap(), None);
}

#[tokio::test]
async fn failed_page_returns_a_partial_batch() {
    let (broker, store, fetcher, _) = harness();
    broker
        .page(
            paths::ORDERS_HISTORY,
            &[raw_order("0x01", 21, "filled", 100), raw_order("0x02", 22, "filled", 110)],
        )
        .fail(paths::ORDERS_HISTORY, http_503());

    let out = fetcher.fetch_history::<RawOrder>(None).await;
    assert!(!out.complete);
    assert!(!out.is_total_failure());
    assert_eq!(out.records.len(), 2);
    assert!(out.error.as_deref().unwrap_or("").contains("503"));
    assert_eq!(store.load_cursor(Cursor::AuditOrder).await.unwrap(), Some(22));
}

#[tokio::test(start_paused = true)]
async fn deadline_ends_a_hanging_pass() {
    let (broker, _, fetcher, _) = harness();
    broker
        .page(paths::STOPS_PENDING, &[raw_stop("0x07", 31, "live", 100)])
        .script(paths::STOPS_PENDING, Step::Hang);

    let deadline = Instant::now() + Duration::from_secs(5);
    let out = fetcher.fetch_pending::<RawStopOrder>(Some(deadline)).await;
    assert!(!out.complete);
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.error.as_deref(), Some("deadline reached"));
    assert!(Instant::now() >= deadline);
}

#[tokio::test]
async fn undecodable_records_are_skipped() {
    let (broker, _, fetcher, _) = harness();
    broker.script(
        paths::ORDERS_PENDING,
        Step::Page(vec![
            serde_json::json!({"orderId": "41", "clientOrderId": "0x41"}),
            serde_json::json!(["not", "an", "order"]),
        ]),
    );

    let out = fetcher.fetch_pending::<RawOrder>(None).await;
    assert!(out.complete);
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.cursor, 41);
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[tokio::test]
async fn import_merges_both_passes_and_reports_totals() {
    let (broker, store, fetcher, engine) = harness();
    // 0x61 was last seen live; history now reports it still live.
    engine
        .publish_orders(Source::Pending, vec![raw_order("0x61", 61, "live", 50)])
        .await;
    broker
        .page(
            paths::ORDERS_HISTORY,
            &[raw_order("0x61", 61, "live", 100), raw_order("0x62", 62, "filled", 110)],
        )
        .page(paths::ORDERS_PENDING, &[raw_order("0x63", 63, "live", 120)]);

    let mut unknown = raw_order("0x64", 64, "live", 130);
    unknown.state = Some("mystery".to_string());
    broker.page(paths::ORDERS_PENDING, &[unknown]);

    let report = engine.import_orders(&fetcher, None).await.unwrap();
    assert_eq!(report.book, Book::Orders);
    assert!(report.history_complete);
    assert!(report.pending_complete);

    // 2 history results + total, 2 pending results + total.
    assert_eq!(report.results.len(), 6);
    let totals: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.state == ResultState::Total)
        .collect();
    assert_eq!(totals.len(), 2);
    assert!(totals.iter().all(|t| t.code == codes::TOTAL));
    assert_eq!(totals[0].context, "orders.history");
    assert_eq!(totals[0].rows, 2);
    assert_eq!(totals[1].context, "orders.pending");
    assert_eq!(totals[1].rows, 2);

    assert_eq!(report.tally.accepted, 3);
    assert_eq!(report.tally.expired, 1);
    assert_eq!(report.tally.rejected, 1);
    assert_eq!(report.tally.noop, 0);

    let statuses: Vec<RequestStatus> = store.requests().await.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            RequestStatus::Expired,
            RequestStatus::Fulfilled,
            RequestStatus::Pending
        ]
    );
}

#[tokio::test]
async fn import_with_one_failed_pass_still_merges_the_other() {
    let (broker, store, fetcher, engine) = harness();
    broker
        .fail(paths::STOPS_HISTORY, http_503())
        .page(paths::STOPS_PENDING, &[raw_stop("0x70", 70, "live", 100)]);

    let report = engine.import_stops(&fetcher, None).await.unwrap();
    assert!(!report.history_complete);
    assert!(report.pending_complete);
    assert!(report.results[0].message.contains("partial"));
    assert_eq!(report.tally.accepted, 1);
    assert_eq!(store.stop_requests().await.len(), 2);
}

#[tokio::test]
async fn import_fails_when_no_pass_retrieved_anything() {
    let (broker, store, fetcher, engine) = harness();
    broker
        .fail(paths::ORDERS_HISTORY, http_503())
        .fail(paths::ORDERS_PENDING, BrokerError::Timeout);

    let err = engine.import_orders(&fetcher, None).await.unwrap_err();
    assert_eq!(err.code(), codes::UNCLASSIFIED);
    assert!(err.to_string().contains("orders import"));
    assert!(store.requests().await.is_empty());
}
