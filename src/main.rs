use std::path::PathBuf;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};

use gotify_poller::{
    app::App,
    consts::FALLBACK_MONITOR_WIDTH,
    core::{redact_url, settings_file},
    diagnostics,
    logging::{self, LogHandle},
    poll::{AlertSink, PollCoordinator},
    settings::{SettingKey, SettingValue, SettingsStore},
    shell::ShellCommand,
    terminal::{spawn_stdin_reader, Console, TerminalAlertHost, TerminalStatus, HELP_TEXT},
    transport::TransportClient,
};

#[derive(Parser, Debug)]
#[command(name = "gotify-poller", version, about)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Gotify server URL, saved to the settings file
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Client token, saved to the settings file
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// Poll interval in seconds, saved to the settings file
    #[arg(long, value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Enable debug logging, saved to the settings file
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Poll continuously and show new messages (default)
    Run,
    /// Poll once, print the result and exit
    Check,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = match cli.config.clone() {
        Some(path) => path,
        None => settings_file().map_err(anyhow::Error::msg)?,
    };
    let mut settings = SettingsStore::load(path.clone())
        .with_context(|| format!("loading settings from {}", path.display()))?;
    apply_overrides(&mut settings, &cli)?;

    let log = logging::init(settings.debug_mode()).context("initialising logging")?;
    info!(
        "settings {} server={}",
        path.display(),
        redact_url(settings.gotify_url())
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let result = runtime.block_on(async move {
        match cli.command.unwrap_or(Command::Run) {
            Command::Run => run(settings, log).await,
            Command::Check => check(settings).await,
        }
    });
    // stdin is read on a blocking thread that never returns on its own.
    runtime.shutdown_background();
    result
}

fn apply_overrides(settings: &mut SettingsStore, cli: &Cli) -> anyhow::Result<()> {
    if let Some(url) = &cli.url {
        settings.set(SettingKey::GotifyUrl, SettingValue::Text(url.clone()))?;
    }
    if let Some(token) = &cli.token {
        settings.set(SettingKey::ClientToken, SettingValue::Text(token.clone()))?;
    }
    if let Some(secs) = cli.poll_interval {
        settings.set(SettingKey::PollInterval, SettingValue::Int(secs))?;
    }
    if cli.debug {
        settings.set(SettingKey::DebugMode, SettingValue::Bool(true))?;
    }
    Ok(())
}

async fn run(settings: SettingsStore, log: LogHandle) -> anyhow::Result<()> {
    let console = Console::stdout();
    let host = TerminalAlertHost::new(console.clone(), FALLBACK_MONITOR_WIDTH);
    let status = TerminalStatus::new(console);
    let mut app = App::new(settings, host, status)?.with_log_handle(log);

    let (tx, rx) = mpsc::unbounded_channel();
    spawn_stdin_reader(tx.clone());
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(ShellCommand::Shutdown);
            }
            Err(error) => warn!("failed to listen for ctrl-c: {error}"),
        }
    });

    println!("{HELP_TEXT}");
    app.run(rx).await;
    Ok(())
}

#[derive(Default)]
struct PrintedAlerts {
    shown: usize,
}

impl AlertSink for PrintedAlerts {
    fn show_alert(&mut self, title: &str, body: &str) {
        self.shown += 1;
        println!("{title}: {body}");
    }
}

async fn check(settings: SettingsStore) -> anyhow::Result<()> {
    let transport = TransportClient::new(settings.request_timeout())?;
    let mut coordinator = PollCoordinator::new();
    let mut alerts = PrintedAlerts::default();
    let mut status = TerminalStatus::new(Console::stdout());

    coordinator
        .poll_once(&transport, &settings, &mut alerts, &mut status)
        .await;
    println!(
        "{}",
        diagnostics::snapshot(&coordinator, alerts.shown).report()
    );

    if !coordinator.state().connection.is_connected() {
        bail!("poll failed");
    }
    Ok(())
}
