//! Transport contract tests against a local mock Gotify server: status
//! classification, headers on the wire, timeouts and session teardown.

use std::time::Duration;

use gotify_poller::poll::build_poll_request;
use gotify_poller::transport::{TransportClient, TransportError};
use reqwest::header::HeaderMap;
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn ok_response_returns_body_and_sends_auth_headers() {
    let mock_server = MockServer::start().await;
    let body = json!({"messages": [{"id": 1, "title": "hi", "message": "there"}]});

    Mock::given(method("GET"))
        .and(path("/message"))
        .and(query_param("limit", "5"))
        .and(header("X-Gotify-Key", "Ctoken"))
        .and(header("Accept", "application/json"))
        .and(header_exists("User-Agent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = TransportClient::new(10).unwrap();
    let request = build_poll_request(&mock_server.uri(), "Ctoken").unwrap();
    let bytes = client
        .fetch(&request.url, request.headers, client.timeout_secs())
        .await
        .expect("request should succeed");

    let decoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(decoded, body);
}

#[tokio::test]
async fn any_success_status_is_accepted() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let client = TransportClient::new(10).unwrap();
    let result = client
        .fetch(&format!("{}/message", mock_server.uri()), HeaderMap::new(), 10)
        .await;
    assert_eq!(result.map(|bytes| bytes.len()), Ok(0));
}

#[tokio::test]
async fn unauthorized_maps_to_authentication_failed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Unauthorized"})))
        .mount(&mock_server)
        .await;

    let client = TransportClient::new(10).unwrap();
    let result = client
        .fetch(&format!("{}/message", mock_server.uri()), HeaderMap::new(), 10)
        .await;
    assert_eq!(result, Err(TransportError::AuthenticationFailed));
}

#[tokio::test]
async fn other_statuses_carry_the_code() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&mock_server)
        .await;

    let client = TransportClient::new(10).unwrap();
    let result = client
        .fetch(&format!("{}/message", mock_server.uri()), HeaderMap::new(), 10)
        .await;
    assert_eq!(result, Err(TransportError::GenericHttp { status_code: 503 }));
}

#[tokio::test]
async fn closed_port_is_connection_refused() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let client = TransportClient::new(5).unwrap();
    let result = client
        .fetch(&format!("http://127.0.0.1:{port}/message"), HeaderMap::new(), 5)
        .await;
    assert_eq!(result, Err(TransportError::ConnectionRefused));
}

#[tokio::test]
async fn slow_server_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(8)))
        .mount(&mock_server)
        .await;

    let client = TransportClient::new(5).unwrap();
    let result = client
        .fetch(&format!("{}/message", mock_server.uri()), HeaderMap::new(), 5)
        .await;
    assert_eq!(result, Err(TransportError::Timeout(5)));
}

#[tokio::test]
async fn close_aborts_in_flight_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(20)))
        .mount(&mock_server)
        .await;

    let mut client = TransportClient::new(30).unwrap();
    let in_flight = tokio::spawn(client.fetch(
        &format!("{}/message", mock_server.uri()),
        HeaderMap::new(),
        30,
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.close();

    let result = tokio::time::timeout(Duration::from_secs(2), in_flight)
        .await
        .expect("close should abort the request promptly")
        .unwrap();
    assert_eq!(result, Err(TransportError::SessionClosed));
}

#[tokio::test]
async fn https_against_plain_http_server_is_a_tls_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let https_uri = mock_server.uri().replacen("http://", "https://", 1);
    let client = TransportClient::new(5).unwrap();
    let result = client
        .fetch(&format!("{https_uri}/message"), HeaderMap::new(), 5)
        .await;
    assert_eq!(result, Err(TransportError::Tls));
}

#[tokio::test]
async fn unknown_host_is_a_dns_error() {
    let client = TransportClient::new(5).unwrap();
    let result = client
        .fetch("http://no-such-host.invalid/message", HeaderMap::new(), 5)
        .await;
    assert_eq!(result, Err(TransportError::DnsResolution));
}
