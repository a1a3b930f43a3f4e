use tracing_subscriber::{
    fmt, layer::SubscriberExt as _, reload, util::SubscriberInitExt as _, EnvFilter, Registry,
};

const INFO_DIRECTIVE: &str = "gotify_poller=info";
const DEBUG_DIRECTIVE: &str = "gotify_poller=debug";

/// Lets `debug-mode` swap the log filter after startup.
#[derive(Clone)]
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    pub fn set_debug(&self, enabled: bool) -> Result<(), reload::Error> {
        self.handle.reload(filter_for(enabled))?;
        tracing::info!(
            "debug logging {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }
}

pub fn filter_for(debug: bool) -> EnvFilter {
    EnvFilter::new(if debug { DEBUG_DIRECTIVE } else { INFO_DIRECTIVE })
}

/// Installs the global subscriber writing to stderr. `RUST_LOG`, when set, wins
/// over `debug` for the initial filter.
pub fn init(debug: bool) -> Result<LogHandle, tracing_subscriber::util::TryInitError> {
    let initial = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(debug));
    let (filter, handle) = reload::Layer::new(initial);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()?;
    Ok(LogHandle { handle })
}
