//! 401 recovery and refresh coordination against a mock backend.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gibsi_client::api::market::{DataQuery, DataSet};
use gibsi_client::api::{ApiClient, ApiError};
use gibsi_client::store::{BridgeStore, TokenStore};

fn client_for(server: &MockServer, bridge: &str) -> ApiClient {
    let tokens = TokenStore::new(Arc::new(BridgeStore::from_bridge_string(bridge)));
    ApiClient::new(&server.uri(), Duration::from_secs(5), tokens).unwrap()
}

fn expired() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({ "message": "Token has expired" }))
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/top_gainers"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(expired())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/top_gainers"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "ticker": "INFY" }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/refresh"))
        .and(header("authorization", "Bearer R1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "A2" }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, "access_token:A1|refresh_token:R1");
    let calls = (0..5).map(|_| client.top_gainers());
    let results = join_all(calls).await;

    for r in results {
        assert_eq!(r.unwrap(), json!([{ "ticker": "INFY" }]));
    }
    assert_eq!(client.tokens().access_token().as_deref(), Some("A2"));
    assert_eq!(client.tokens().refresh_token().as_deref(), Some("R1"));
    assert!(!client.coordinator().is_refreshing());
    server.verify().await;
}

#[tokio::test]
async fn test_second_401_after_retry_is_final() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "User disabled" })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "A2" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, "access_token:A1|refresh_token:R1");
    let err = client.profile().await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized(ref m) if m == "User disabled"));
    assert_eq!(err.user_message(), "Session expired. Please log in again.");
    server.verify().await;
}

#[tokio::test]
async fn test_missing_refresh_token_never_calls_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(expired())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "A2" })))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server, "access_token:A1");
    let err = client.health().await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized(ref m) if m == "Token has expired"));
    server.verify().await;
}

#[tokio::test]
async fn test_failed_refresh_rejects_every_waiter_and_keeps_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/stocks_list"))
        .respond_with(expired())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "message": "Refresh token revoked" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, "access_token:A1|refresh_token:R1");
    let results = join_all((0..3).map(|_| client.stocks_list())).await;

    for r in results {
        assert!(r.unwrap_err().is_unauthorized());
    }
    // Clearing is the session's job, not the client's.
    assert_eq!(client.tokens().access_token().as_deref(), Some("A1"));
    assert_eq!(client.tokens().refresh_token().as_deref(), Some("R1"));
    assert_eq!(client.coordinator().pending(), 0);
    server.verify().await;
}

#[tokio::test]
async fn test_token_refreshed_elsewhere_is_reused() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/market_update"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(expired().set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/market_update"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "market": "open" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "A3" })))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server, "access_token:A1|refresh_token:R1");
    let tokens = client.tokens().clone();
    let call = tokio::spawn({
        let client = client.clone();
        async move { client.market_update().await }
    });

    // A newer token lands in storage while the A1 call is in flight.
    tokio::time::sleep(Duration::from_millis(100)).await;
    tokens.set_access_token("A2").unwrap();

    let body = call.await.unwrap().unwrap();
    assert_eq!(body, json!({ "market": "open" }));
    server.verify().await;
}

#[tokio::test]
async fn test_refresh_result_dropped_when_tokens_cleared_mid_flight() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/stocks_list"))
        .respond_with(expired())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "A2" }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, "access_token:A1|refresh_token:R1");
    let tokens = client.tokens().clone();
    let call = tokio::spawn({
        let client = client.clone();
        async move { client.stocks_list().await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    tokens.clear();

    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_unauthorized());
    assert!(tokens.access_token().is_none());
    assert!(tokens.refresh_token().is_none());
    assert!(!client.coordinator().is_refreshing());
    server.verify().await;
}

#[tokio::test]
async fn test_api_error_message_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "mongo unreachable" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let client = client_for(&server, "access_token:A1|refresh_token:R1");

    let err = client.health().await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.user_message(), "mongo unreachable");

    let err = client.users().await.unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert_eq!(err.user_message(), "Forbidden");
}

#[tokio::test]
async fn test_requests_carry_request_id_and_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/data_query"))
        .and(query_param("db", "intraday"))
        .and(query_param("ticker", "INFY"))
        .and(query_param("stock_id", "1594"))
        .and(query_param("page", "2"))
        .and(query_param("limit", "50"))
        .and(query_param("date", "2024-06-03"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [], "total": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, "access_token:A1|refresh_token:R1");
    let q = DataQuery {
        db: DataSet::Intraday,
        ticker: "INFY".to_string(),
        stock_id: "1594".to_string(),
        page: 2,
        limit: 50,
        date: Some("2024-06-03".to_string()),
    };
    let body = client.data_query(&q).await.unwrap();
    assert_eq!(body["total"], 0);

    let received = server.received_requests().await.unwrap();
    let id = received[0].headers.get("x-request-id").unwrap();
    assert!(uuid::Uuid::parse_str(id.to_str().unwrap()).is_ok());
    server.verify().await;
}
