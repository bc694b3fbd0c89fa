//! Signed paged reads against a mock exchange
//!
//! # Behavior under test
//! - every request carries the five ACCESS-* headers;
//! - the cursor and page size travel as query parameters;
//! - envelope code "0" yields the `data` records;
//! - a non-zero envelope code surfaces as `BrokerError::Api`;
//! - an HTTP error status surfaces as `BrokerError::Http`.

use httpmock::prelude::*;
use reckon_broker::wire::decode_records;
use reckon_broker::{paths, BrokerClient, BrokerError, HmacSigner, HttpBrokerClient, RawOrder};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn client(server: &MockServer) -> HttpBrokerClient {
    let signer = Arc::new(HmacSigner::new("key-1", "secret-1", "pass-1"));
    HttpBrokerClient::new_with_base_url(signer, server.base_url(), Duration::from_secs(5))
        .expect("client")
}

fn q(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn pending_page_is_signed_and_decoded() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(paths::ORDERS_PENDING)
                .query_param("after", "0")
                .query_param("limit", "20")
                .header("ACCESS-KEY", "key-1")
                .header("ACCESS-PASSPHRASE", "pass-1")
                .header_exists("ACCESS-SIGN")
                .header_exists("ACCESS-TIMESTAMP")
                .header_exists("ACCESS-NONCE");
            then.status(200).json_body(json!({
                "code": "0",
                "msg": "success",
                "data": [
                    {"orderId": "101", "clientOrderId": "0xab", "state": "live", "updateTime": "1700000000000"},
                    {"orderId": "102", "clientOrderId": "0xac", "state": "filled", "updateTime": "1700000000100"}
                ]
            }));
        })
        .await;

    let values = client(&server)
        .get_page(paths::ORDERS_PENDING, &q(&[("after", "0"), ("limit", "20")]))
        .await
        .expect("page");
    m.assert_async().await;

    let (orders, bad): (Vec<RawOrder>, _) = decode_records(values);
    assert!(bad.is_empty());
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].client_id(), Some("0xab"));
    assert_eq!(orders[1].numeric_id(), Some(102));
}

#[tokio::test]
async fn exchange_error_code_is_not_success() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(paths::ORDERS_HISTORY);
            then.status(200)
                .json_body(json!({"code": "152409", "msg": "signature invalid"}));
        })
        .await;

    let err = client(&server)
        .get_page(paths::ORDERS_HISTORY, &q(&[("limit", "20")]))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BrokerError::Api {
            code: "152409".into(),
            msg: "signature invalid".into()
        }
    );
}

#[tokio::test]
async fn http_failure_status_is_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(paths::STOPS_PENDING);
            then.status(503).body("maintenance");
        })
        .await;

    let err = client(&server)
        .get_page(paths::STOPS_PENDING, &[])
        .await
        .unwrap_err();
    match err {
        BrokerError::Http { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected http error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_data_is_an_empty_page() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(paths::STOPS_HISTORY);
            then.status(200).json_body(json!({"code": "0", "msg": "success"}));
        })
        .await;

    let values = client(&server)
        .get_page(paths::STOPS_HISTORY, &[])
        .await
        .expect("page");
    assert!(values.is_empty());
}
