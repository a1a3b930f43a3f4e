use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT as USER_AGENT_HEADER,
};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    consts::{
        AUTH_HEADER, CONFIG_ERROR_BODY, CONFIG_ERROR_TITLE, CONNECTION_ERROR_THRESHOLD,
        CONNECTION_ERROR_TITLE, POLL_MESSAGE_LIMIT, USER_AGENT,
    },
    core::{redact_url, truncate_message, unix_now_secs},
    messages::{parse_message_list, select_new_messages},
    model::{ConnectionState, PollState},
    settings::SettingsStore,
    shell::StatusIndicator,
    transport::{TransportClient, TransportError},
};

/// Where new messages and user-facing errors are shown. The coordinator knows
/// nothing about how.
pub trait AlertSink {
    fn show_alert(&mut self, title: &str, body: &str);
}

/// A GET ready to hand to the transport. The token travels in a header only.
#[derive(Debug, Clone)]
pub struct PollRequest {
    pub url: String,
    pub headers: HeaderMap,
}

/// A poll whose network call has been started on behalf of `generation`.
#[derive(Debug)]
pub struct PendingPoll {
    pub generation: u64,
    pub request: PollRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Configuration,
    Transport,
}

/// Drives the poll-dedupe-notify loop.
///
/// Owns the repeating timer and [`PollState`]. A tick that arrives while the
/// previous fetch is still in flight is skipped. Every dispatched fetch is tagged
/// with the current generation; `stop` and `restart` bump it, so completions that
/// arrive afterwards only clear the busy flag.
pub struct PollCoordinator {
    state: PollState,
    timer: Option<Interval>,
    interval_secs: u64,
    generation: u64,
    in_flight: Option<u64>,
    failure: Option<FailureKind>,
    last_error: Option<String>,
    last_poll_at: Option<u64>,
}

impl Default for PollCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl PollCoordinator {
    pub fn new() -> Self {
        Self {
            state: PollState::default(),
            timer: None,
            interval_secs: 0,
            generation: 0,
            in_flight: None,
            failure: None,
            last_error: None,
            last_poll_at: None,
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn is_polling(&self) -> bool {
        self.timer.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_poll_at(&self) -> Option<u64> {
        self.last_poll_at
    }

    /// Installs a fresh repeating timer at the configured interval, replacing any
    /// existing one, and reports `Connected` until a poll says otherwise.
    pub fn start(&mut self, settings: &SettingsStore, status: &mut dyn StatusIndicator) {
        self.cancel_timer();
        let interval_secs = settings.poll_interval();
        let period = Duration::from_secs(interval_secs);
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timer = Some(timer);
        self.interval_secs = interval_secs;
        self.set_connection(ConnectionState::Connected, status);
        info!("started polling every {interval_secs} seconds");
    }

    /// Cancels the timer (if any) and reports `Disconnected`. A fetch already in
    /// flight still completes but is ignored.
    pub fn stop(&mut self, status: &mut dyn StatusIndicator) {
        if self.cancel_timer() {
            info!("stopped polling");
        }
        self.set_connection(ConnectionState::Disconnected, status);
    }

    pub fn restart(&mut self, settings: &SettingsStore, status: &mut dyn StatusIndicator) {
        self.stop(status);
        self.start(settings, status);
    }

    /// Restarts only while polling, so a manual disconnect survives settings edits.
    /// Returns whether a restart happened.
    pub fn on_interval_changed(
        &mut self,
        settings: &SettingsStore,
        status: &mut dyn StatusIndicator,
    ) -> bool {
        if !self.is_polling() {
            debug!("poll interval changed while stopped, nothing to restart");
            return false;
        }
        if settings.poll_interval() == self.interval_secs {
            return false;
        }
        info!(
            "poll interval changed to {} seconds, restarting",
            settings.poll_interval()
        );
        self.restart(settings, status);
        true
    }

    /// Resolves on the next tick; never resolves while stopped.
    pub async fn next_tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// First half of a poll cycle: validates configuration and builds the request.
    /// `None` means nothing has to be fetched this tick.
    pub fn begin_poll(
        &mut self,
        settings: &SettingsStore,
        alerts: &mut dyn AlertSink,
        status: &mut dyn StatusIndicator,
    ) -> Option<PendingPoll> {
        if let Some(busy_generation) = self.in_flight {
            debug!("previous poll (generation {busy_generation}) still in flight, skipping tick");
            return None;
        }
        self.last_poll_at = Some(unix_now_secs());

        let base_url = settings.gotify_url();
        let token = settings.client_token();
        if base_url.is_empty() || token.is_empty() {
            debug!("missing server URL or client token");
            if self.failure != Some(FailureKind::Configuration) {
                self.state.consecutive_errors = 0;
            }
            if self.state.consecutive_errors == 0 {
                alerts.show_alert(CONFIG_ERROR_TITLE, CONFIG_ERROR_BODY);
            }
            self.state.consecutive_errors = self.state.consecutive_errors.saturating_add(1);
            self.failure = Some(FailureKind::Configuration);
            self.last_error = Some("Missing server URL or client token".to_string());
            self.set_connection(ConnectionState::Disconnected, status);
            return None;
        }

        if self.failure == Some(FailureKind::Configuration) {
            self.state.consecutive_errors = 0;
            self.failure = None;
        }

        let request = match build_poll_request(base_url, token) {
            Ok(request) => request,
            Err(error) => {
                self.record_transport_failure(error, alerts, status);
                return None;
            }
        };
        debug!("polling {}", redact_url(&request.url));
        self.in_flight = Some(self.generation);
        Some(PendingPoll {
            generation: self.generation,
            request,
        })
    }

    /// Second half of a poll cycle. Never fails: every error is absorbed here.
    pub fn complete_poll(
        &mut self,
        generation: u64,
        result: Result<Bytes, TransportError>,
        alerts: &mut dyn AlertSink,
        status: &mut dyn StatusIndicator,
    ) {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }
        if generation != self.generation {
            debug!(
                "ignoring poll result from generation {generation} (current {})",
                self.generation
            );
            return;
        }

        let body = match result {
            Ok(body) => {
                debug!("poll returned {} bytes", body.len());
                body
            }
            Err(error) => {
                self.record_transport_failure(error, alerts, status);
                return;
            }
        };

        let batch = match parse_message_list(&body) {
            Ok(batch) => batch,
            Err(error) => {
                debug!(
                    "{error}; treating as empty batch, body={}",
                    truncate_message(&String::from_utf8_lossy(&body), 140)
                );
                Vec::new()
            }
        };

        let (fresh, high_water) = select_new_messages(&batch, self.state.last_seen_id);
        for message in &fresh {
            alerts.show_alert(&message.title, &message.message);
        }
        if !fresh.is_empty() {
            info!(
                "showed {} new message(s), last seen id {}",
                fresh.len(),
                high_water
            );
        }
        self.state.last_seen_id = high_water;
        self.state.consecutive_errors = 0;
        self.failure = None;
        self.last_error = None;
        self.set_connection(ConnectionState::Connected, status);
    }

    /// Runs one whole cycle inline: begin, fetch, complete.
    pub async fn poll_once(
        &mut self,
        transport: &TransportClient,
        settings: &SettingsStore,
        alerts: &mut dyn AlertSink,
        status: &mut dyn StatusIndicator,
    ) {
        let Some(pending) = self.begin_poll(settings, alerts, status) else {
            return;
        };
        let result = transport
            .fetch(
                &pending.request.url,
                pending.request.headers,
                transport.timeout_secs(),
            )
            .await;
        self.complete_poll(pending.generation, result, alerts, status);
    }

    fn record_transport_failure(
        &mut self,
        error: TransportError,
        alerts: &mut dyn AlertSink,
        status: &mut dyn StatusIndicator,
    ) {
        debug!("poll failed: {error}");
        self.set_connection(ConnectionState::Disconnected, status);
        self.state.consecutive_errors = self.state.consecutive_errors.saturating_add(1);
        self.failure = Some(FailureKind::Transport);
        self.last_error = Some(error.to_string());
        if self.state.consecutive_errors > CONNECTION_ERROR_THRESHOLD {
            warn!(
                "{} consecutive poll failures: {error}",
                self.state.consecutive_errors
            );
            alerts.show_alert(
                CONNECTION_ERROR_TITLE,
                &format!("Cannot connect to server: {error}"),
            );
            self.state.consecutive_errors = 0;
        }
    }

    fn cancel_timer(&mut self) -> bool {
        let had_timer = self.timer.take().is_some();
        if had_timer {
            self.generation = self.generation.wrapping_add(1);
        }
        had_timer
    }

    fn set_connection(&mut self, connection: ConnectionState, status: &mut dyn StatusIndicator) {
        if self.state.connection != connection {
            debug!("connection state -> {}", connection.as_str());
        }
        self.state.connection = connection;
        status.set_connected(connection.is_connected());
    }
}

/// `{base}/message?limit=5` with the token in the auth header.
pub fn build_poll_request(base_url: &str, token: &str) -> Result<PollRequest, TransportError> {
    let url = format!(
        "{}/message?limit={POLL_MESSAGE_LIMIT}",
        base_url.trim_end_matches('/')
    );

    let mut token_value = HeaderValue::from_str(token.trim()).map_err(|error| {
        TransportError::RequestConstructionFailed(format!("Invalid client token: {error}"))
    })?;
    token_value.set_sensitive(true);

    let auth_header = HeaderName::from_bytes(AUTH_HEADER.as_bytes())
        .map_err(|error| TransportError::RequestConstructionFailed(error.to_string()))?;

    let mut headers = HeaderMap::new();
    headers.insert(auth_header, token_value);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT));
    Ok(PollRequest { url, headers })
}
