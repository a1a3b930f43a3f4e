use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    alerts::AlertManager,
    consts::{TEST_ALERT_BODY, TEST_ALERT_TITLE},
    diagnostics,
    logging::LogHandle,
    poll::{AlertSink, PollCoordinator},
    settings::{SettingKey, SettingsStore, Subscription},
    shell::{AlertHost, AlertId, MenuAction, ShellCommand, StatusIndicator},
    transport::{TransportClient, TransportError},
};

const WATCHED_KEYS: [SettingKey; 3] = [
    SettingKey::PollInterval,
    SettingKey::RequestTimeout,
    SettingKey::DebugMode,
];

struct PollCompletion {
    generation: u64,
    result: Result<Bytes, TransportError>,
}

/// Routes coordinator alerts into the alert manager with the auto-close delay
/// read at the moment the alert is shown.
struct LiveAlerts<'a, H: AlertHost> {
    alerts: &'a mut AlertManager<H>,
    auto_close: Option<Duration>,
}

impl<H: AlertHost> AlertSink for LiveAlerts<'_, H> {
    fn show_alert(&mut self, title: &str, body: &str) {
        if let Err(error) = self.alerts.show_alert(title, body, self.auto_close) {
            warn!("{error}");
        }
    }
}

/// Owns every component and drives them from one event loop.
pub struct App<H: AlertHost, S: StatusIndicator> {
    settings: SettingsStore,
    transport: TransportClient,
    alerts: AlertManager<H>,
    coordinator: PollCoordinator,
    status: S,
    log: Option<LogHandle>,
    subscriptions: Vec<Subscription>,
    settings_tx: mpsc::UnboundedSender<SettingKey>,
    settings_rx: mpsc::UnboundedReceiver<SettingKey>,
    close_rx: mpsc::UnboundedReceiver<AlertId>,
    completion_tx: mpsc::UnboundedSender<PollCompletion>,
    completion_rx: mpsc::UnboundedReceiver<PollCompletion>,
    enabled: bool,
}

impl<H: AlertHost, S: StatusIndicator> App<H, S> {
    pub fn new(settings: SettingsStore, host: H, status: S) -> Result<Self, TransportError> {
        let transport = TransportClient::new(settings.request_timeout())?;
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        let (settings_tx, settings_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Ok(Self {
            settings,
            transport,
            alerts: AlertManager::new(host, close_tx),
            coordinator: PollCoordinator::new(),
            status,
            log: None,
            subscriptions: Vec::new(),
            settings_tx,
            settings_rx,
            close_rx,
            completion_tx,
            completion_rx,
            enabled: false,
        })
    }

    pub fn with_log_handle(mut self, log: LogHandle) -> Self {
        self.log = Some(log);
        self
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn alerts(&self) -> &AlertManager<H> {
        &self.alerts
    }

    pub fn coordinator(&self) -> &PollCoordinator {
        &self.coordinator
    }

    pub fn status(&self) -> &S {
        &self.status
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Subscribes to the settings that affect a running loop and starts polling.
    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        for key in WATCHED_KEYS {
            let subscription = self.settings.subscribe(key, self.settings_tx.clone());
            self.subscriptions.push(subscription);
        }
        self.apply_debug_mode();
        self.coordinator.start(&self.settings, &mut self.status);
        info!("gotify poller enabled");
    }

    /// Teardown order: poll timer, alerts with their timers, transport session,
    /// settings subscriptions, status affordance. Idempotent.
    pub fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        self.coordinator.stop(&mut self.status);
        self.alerts.clear_all_immediate();
        self.transport.close();
        for subscription in self.subscriptions.drain(..) {
            self.settings.unsubscribe(subscription);
        }
        self.status.destroy();
        info!("gotify poller disabled");
    }

    /// Runs until `Shutdown` arrives or every command sender is gone, then disables.
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<ShellCommand>) {
        self.enable();
        loop {
            tokio::select! {
                () = self.coordinator.next_tick() => self.on_tick(),
                Some(done) = self.completion_rx.recv() => self.on_completion(done),
                Some(timer) = self.alerts.next_timer(), if self.alerts.pending_timers() > 0 => {
                    self.alerts.handle_timer(timer);
                }
                Some(id) = self.close_rx.recv() => {
                    self.alerts.close_alert(id);
                }
                Some(key) = self.settings_rx.recv() => self.on_setting_changed(key),
                command = commands.recv() => match command {
                    Some(ShellCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }
        self.disable();
    }

    pub fn handle_command(&mut self, command: ShellCommand) {
        debug!("shell command: {command:?}");
        match command {
            ShellCommand::Menu(MenuAction::TestAlert) => {
                let auto_close = self.settings.notification_timeout();
                if let Err(error) =
                    self.alerts
                        .show_alert(TEST_ALERT_TITLE, TEST_ALERT_BODY, auto_close)
                {
                    warn!("{error}");
                }
            }
            ShellCommand::Menu(MenuAction::ToggleConnection) => {
                if self.coordinator.state().connection.is_connected() {
                    self.coordinator.stop(&mut self.status);
                } else {
                    self.coordinator.start(&self.settings, &mut self.status);
                }
            }
            ShellCommand::Menu(MenuAction::OpenSettings) => {
                self.status.show_settings(&self.settings.masked_snapshot());
            }
            ShellCommand::Menu(MenuAction::ClearAll) => self.alerts.clear_all(),
            ShellCommand::ClickClose(id) => {
                if !self.alerts.host_mut().press_close(id) {
                    self.status.show_report(&format!("no open alert #{id}"));
                }
            }
            ShellCommand::SetSetting { key, value } => {
                match self.settings.set_from_str(key, &value) {
                    Ok(true) => {}
                    Ok(false) => debug!("{key} unchanged"),
                    Err(error) => {
                        warn!("{error}");
                        self.status.show_report(&error.to_string());
                    }
                }
            }
            ShellCommand::ShowDiagnostics => {
                let report = diagnostics::snapshot(&self.coordinator, self.alerts.len()).report();
                self.status.show_report(&report);
            }
            ShellCommand::Shutdown => self.disable(),
        }
    }

    fn on_tick(&mut self) {
        let mut sink = LiveAlerts {
            alerts: &mut self.alerts,
            auto_close: self.settings.notification_timeout(),
        };
        let Some(pending) = self
            .coordinator
            .begin_poll(&self.settings, &mut sink, &mut self.status)
        else {
            return;
        };

        let fetch = self.transport.fetch(
            &pending.request.url,
            pending.request.headers,
            self.transport.timeout_secs(),
        );
        let completion_tx = self.completion_tx.clone();
        let generation = pending.generation;
        tokio::spawn(async move {
            let result = fetch.await;
            let _ = completion_tx.send(PollCompletion { generation, result });
        });
    }

    fn on_completion(&mut self, done: PollCompletion) {
        let mut sink = LiveAlerts {
            alerts: &mut self.alerts,
            auto_close: self.settings.notification_timeout(),
        };
        self.coordinator
            .complete_poll(done.generation, done.result, &mut sink, &mut self.status);
        let snapshot = diagnostics::snapshot(&self.coordinator, self.alerts.len());
        debug!(?snapshot, "poll completed");
    }

    fn on_setting_changed(&mut self, key: SettingKey) {
        match key {
            SettingKey::RequestTimeout => {
                self.transport.set_timeout(self.settings.request_timeout());
                debug!("request timeout now {}s", self.transport.timeout_secs());
                self.coordinator
                    .on_interval_changed(&self.settings, &mut self.status);
            }
            SettingKey::PollInterval => {
                self.coordinator
                    .on_interval_changed(&self.settings, &mut self.status);
            }
            SettingKey::DebugMode => self.apply_debug_mode(),
            other => debug!("ignoring change of {other}"),
        }
    }

    fn apply_debug_mode(&self) {
        if let Some(log) = &self.log {
            if let Err(error) = log.set_debug(self.settings.debug_mode()) {
                warn!("failed to switch log level: {error}");
            }
        }
    }
}
