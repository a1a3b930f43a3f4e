pub(crate) const SETTINGS_DIR_NAME: &str = "gotify-poller";
pub(crate) const SETTINGS_FILE_NAME: &str = "settings.json";

pub const USER_AGENT: &str = concat!("gotify-poller/", env!("CARGO_PKG_VERSION"));
pub(crate) const AUTH_HEADER: &str = "X-Gotify-Key";
pub(crate) const POLL_MESSAGE_LIMIT: usize = 5;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const MIN_POLL_INTERVAL_SECS: u64 = 15;
pub const MAX_POLL_INTERVAL_SECS: u64 = 300;
/// Poll interval must stay this far above the request timeout.
pub const POLL_INTERVAL_TIMEOUT_MARGIN_SECS: u64 = 5;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const MIN_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_NOTIFICATION_TIMEOUT_SECS: u64 = 0;
pub const MAX_NOTIFICATION_TIMEOUT_SECS: u64 = 3600;

/// Consecutive transport failures tolerated before a connection error alert.
pub const CONNECTION_ERROR_THRESHOLD: u32 = 3;

pub const WRAP_WIDTH: usize = 50;
pub const MAX_VISIBLE_LINES: usize = 8;
pub const LINE_HEIGHT: u32 = 18;
pub const BASE_ALERT_HEIGHT: u32 = 80;
pub const ALERT_WIDTH: u32 = 500;
pub(crate) const ALERT_CENTER_OFFSET: u32 = 400;
/// Screen width assumed by hosts that cannot measure one.
pub const FALLBACK_MONITOR_WIDTH: u32 = 1920;
pub const STACK_TOP_MARGIN: i32 = 20;
pub const STACK_GAP: i32 = 10;
pub const FADE_IN_MS: u64 = 300;
pub const FADE_OUT_MS: u64 = 200;

pub(crate) const DEFAULT_ALERT_TITLE: &str = "Gotify";
pub const CONFIG_ERROR_TITLE: &str = "Gotify Configuration Required";
pub const CONFIG_ERROR_BODY: &str =
    "Please set your Gotify server URL and client token in settings.";
pub const CONNECTION_ERROR_TITLE: &str = "Gotify Connection Error";
pub const TEST_ALERT_TITLE: &str = "Manual Test";
pub const TEST_ALERT_BODY: &str =
    "This is a persistent custom notification! Close with X button.";
