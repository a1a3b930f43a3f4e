//! End-to-end poll cycles: coordinator, transport and decoding against a mock
//! Gotify server.

use gotify_poller::consts::{CONFIG_ERROR_TITLE, CONNECTION_ERROR_TITLE};
use gotify_poller::model::ConnectionState;
use gotify_poller::poll::{AlertSink, PollCoordinator};
use gotify_poller::settings::{SettingKey, SettingsStore, StoredSettings};
use gotify_poller::shell::StatusIndicator;
use gotify_poller::transport::TransportClient;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Collected(Vec<(String, String)>);

impl AlertSink for Collected {
    fn show_alert(&mut self, title: &str, body: &str) {
        self.0.push((title.to_string(), body.to_string()));
    }
}

#[derive(Default)]
struct Status(Vec<bool>);

impl StatusIndicator for Status {
    fn set_connected(&mut self, connected: bool) {
        self.0.push(connected);
    }
    fn show_settings(&mut self, _snapshot: &[(SettingKey, String)]) {}
    fn show_report(&mut self, _report: &str) {}
    fn destroy(&mut self) {}
}

fn settings_for(server: &MockServer) -> SettingsStore {
    SettingsStore::in_memory(StoredSettings {
        gotify_url: server.uri(),
        client_token: "Ctoken".to_string(),
        ..StoredSettings::default()
    })
}

fn batch(ids: &[i64]) -> serde_json::Value {
    let messages: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({"id": id, "title": format!("title {id}"), "message": format!("body {id}")})
        })
        .collect();
    json!({ "messages": messages, "paging": {"size": ids.len(), "limit": 5} })
}

async fn serve(server: &MockServer, response: ResponseTemplate) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/message"))
        .and(header("X-Gotify-Key", "Ctoken"))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn only_unseen_messages_are_shown_oldest_first() {
    let server = MockServer::start().await;
    let settings = settings_for(&server);
    let transport = TransportClient::new(settings.request_timeout()).unwrap();
    let mut coordinator = PollCoordinator::new();
    let (mut shown, mut status) = (Collected::default(), Status::default());

    serve(&server, ResponseTemplate::new(200).set_body_json(batch(&[2, 1]))).await;
    coordinator
        .poll_once(&transport, &settings, &mut shown, &mut status)
        .await;
    coordinator
        .poll_once(&transport, &settings, &mut shown, &mut status)
        .await;

    serve(&server, ResponseTemplate::new(200).set_body_json(batch(&[4, 3, 2, 1]))).await;
    coordinator
        .poll_once(&transport, &settings, &mut shown, &mut status)
        .await;

    let titles: Vec<&str> = shown.0.iter().map(|(title, _)| title.as_str()).collect();
    assert_eq!(titles, vec!["title 1", "title 2", "title 3", "title 4"]);
    assert_eq!(coordinator.state().last_seen_id, 4);
    assert_eq!(coordinator.state().connection, ConnectionState::Connected);
    assert_eq!(status.0.last(), Some(&true));
}

#[tokio::test]
async fn repeated_auth_failures_raise_one_alert_on_the_fourth() {
    let server = MockServer::start().await;
    let settings = settings_for(&server);
    let transport = TransportClient::new(settings.request_timeout()).unwrap();
    let mut coordinator = PollCoordinator::new();
    let (mut shown, mut status) = (Collected::default(), Status::default());

    serve(&server, ResponseTemplate::new(401)).await;
    for _ in 0..3 {
        coordinator
            .poll_once(&transport, &settings, &mut shown, &mut status)
            .await;
    }
    assert!(shown.0.is_empty());
    assert_eq!(coordinator.state().connection, ConnectionState::Disconnected);

    coordinator
        .poll_once(&transport, &settings, &mut shown, &mut status)
        .await;
    assert_eq!(
        shown.0,
        vec![(
            CONNECTION_ERROR_TITLE.to_string(),
            "Cannot connect to server: Authentication failed - check your client token"
                .to_string()
        )]
    );
    assert_eq!(coordinator.state().consecutive_errors, 0);

    serve(&server, ResponseTemplate::new(200).set_body_json(batch(&[]))).await;
    coordinator
        .poll_once(&transport, &settings, &mut shown, &mut status)
        .await;
    assert_eq!(coordinator.state().connection, ConnectionState::Connected);
    assert_eq!(coordinator.last_error(), None);
}

#[tokio::test]
async fn non_json_body_counts_as_an_empty_batch() {
    let server = MockServer::start().await;
    let settings = settings_for(&server);
    let transport = TransportClient::new(settings.request_timeout()).unwrap();
    let mut coordinator = PollCoordinator::new();
    let (mut shown, mut status) = (Collected::default(), Status::default());

    serve(
        &server,
        ResponseTemplate::new(200).set_body_string("<html>proxy login</html>"),
    )
    .await;
    coordinator
        .poll_once(&transport, &settings, &mut shown, &mut status)
        .await;

    assert!(shown.0.is_empty());
    assert_eq!(coordinator.state().connection, ConnectionState::Connected);
    assert_eq!(coordinator.state().consecutive_errors, 0);
}

#[tokio::test]
async fn missing_token_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let settings = SettingsStore::in_memory(StoredSettings {
        gotify_url: server.uri(),
        ..StoredSettings::default()
    });
    let transport = TransportClient::new(settings.request_timeout()).unwrap();
    let mut coordinator = PollCoordinator::new();
    let (mut shown, mut status) = (Collected::default(), Status::default());

    for _ in 0..3 {
        coordinator
            .poll_once(&transport, &settings, &mut shown, &mut status)
            .await;
    }

    assert_eq!(shown.0.len(), 1);
    assert_eq!(shown.0[0].0, CONFIG_ERROR_TITLE);
    assert_eq!(coordinator.state().connection, ConnectionState::Disconnected);
}
