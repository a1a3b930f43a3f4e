use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    consts::{
        DEFAULT_NOTIFICATION_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS,
        DEFAULT_REQUEST_TIMEOUT_SECS, MAX_NOTIFICATION_TIMEOUT_SECS, MAX_POLL_INTERVAL_SECS,
        MAX_REQUEST_TIMEOUT_SECS, MIN_POLL_INTERVAL_SECS, MIN_REQUEST_TIMEOUT_SECS,
        POLL_INTERVAL_TIMEOUT_MARGIN_SECS,
    },
    core::restrict_file_permissions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    GotifyUrl,
    ClientToken,
    PollInterval,
    RequestTimeout,
    NotificationTimeout,
    DebugMode,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::GotifyUrl,
        SettingKey::ClientToken,
        SettingKey::PollInterval,
        SettingKey::RequestTimeout,
        SettingKey::NotificationTimeout,
        SettingKey::DebugMode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GotifyUrl => "gotify-url",
            Self::ClientToken => "client-token",
            Self::PollInterval => "poll-interval",
            Self::RequestTimeout => "request-timeout",
            Self::NotificationTimeout => "notification-timeout",
            Self::DebugMode => "debug-mode",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == raw.trim())
            .ok_or_else(|| SettingsError::UnknownKey(raw.trim().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Text(String),
    Int(u64),
    Bool(bool),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => write!(f, "{value:?}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Unknown setting '{0}'")]
    UnknownKey(String),
    #[error("Setting '{key}' expects {expected}")]
    TypeMismatch {
        key: SettingKey,
        expected: &'static str,
    },
    #[error("Setting '{key}' must be between {min} and {max} (got {value})")]
    OutOfRange {
        key: SettingKey,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to access settings file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct StoredSettings {
    pub gotify_url: String,
    pub client_token: String,
    pub poll_interval: u64,
    pub request_timeout: u64,
    pub notification_timeout: u64,
    pub debug_mode: bool,
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            gotify_url: String::new(),
            client_token: String::new(),
            poll_interval: DEFAULT_POLL_INTERVAL_SECS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT_SECS,
            debug_mode: false,
        }
    }
}

/// Cancelable token returned by [`SettingsStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

struct Subscriber {
    id: Subscription,
    key: SettingKey,
    tx: mpsc::UnboundedSender<SettingKey>,
}

/// Typed key/value settings with change notification and optional JSON persistence.
///
/// Values are read live on every call; a changed key is pushed to each matching
/// subscriber's channel and consumed on the owner's next event-loop turn.
pub struct SettingsStore {
    values: StoredSettings,
    path: Option<PathBuf>,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
}

impl SettingsStore {
    pub fn in_memory(values: StoredSettings) -> Self {
        Self {
            values,
            path: None,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Loads `path`, falling back to defaults when the file does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let values = read_settings(&path)?;
        restrict_file_permissions(&path);
        debug!(
            "settings loaded from {path:?} url={:?} has_token={}",
            values.gotify_url,
            !values.client_token.trim().is_empty()
        );
        Ok(Self {
            values,
            path: Some(path),
            subscribers: Vec::new(),
            next_subscription: 0,
        })
    }

    pub fn gotify_url(&self) -> &str {
        self.values.gotify_url.trim()
    }

    pub fn client_token(&self) -> &str {
        self.values.client_token.trim()
    }

    pub fn request_timeout(&self) -> u64 {
        self.values
            .request_timeout
            .clamp(MIN_REQUEST_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS)
    }

    /// Effective poll interval: never below `max(15, request-timeout + 5)`.
    pub fn poll_interval(&self) -> u64 {
        let floor = MIN_POLL_INTERVAL_SECS
            .max(self.request_timeout() + POLL_INTERVAL_TIMEOUT_MARGIN_SECS);
        self.values
            .poll_interval
            .max(floor)
            .min(MAX_POLL_INTERVAL_SECS)
    }

    /// `None` means alerts stay until closed.
    pub fn notification_timeout(&self) -> Option<Duration> {
        match self.values.notification_timeout.min(MAX_NOTIFICATION_TIMEOUT_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn debug_mode(&self) -> bool {
        self.values.debug_mode
    }

    pub fn get(&self, key: SettingKey) -> SettingValue {
        match key {
            SettingKey::GotifyUrl => SettingValue::Text(self.values.gotify_url.clone()),
            SettingKey::ClientToken => SettingValue::Text(self.values.client_token.clone()),
            SettingKey::PollInterval => SettingValue::Int(self.values.poll_interval),
            SettingKey::RequestTimeout => SettingValue::Int(self.values.request_timeout),
            SettingKey::NotificationTimeout => {
                SettingValue::Int(self.values.notification_timeout)
            }
            SettingKey::DebugMode => SettingValue::Bool(self.values.debug_mode),
        }
    }

    /// Validates and stores `value`. Returns `false` when the value was unchanged,
    /// in which case nobody is notified.
    pub fn set(&mut self, key: SettingKey, value: SettingValue) -> Result<bool, SettingsError> {
        let mut next = self.values.clone();
        match (key, value) {
            (SettingKey::GotifyUrl, SettingValue::Text(url)) => {
                next.gotify_url = normalize_base_url(&url)?;
            }
            (SettingKey::ClientToken, SettingValue::Text(token)) => {
                next.client_token = token.trim().to_string();
            }
            (SettingKey::PollInterval, SettingValue::Int(secs)) => {
                next.poll_interval =
                    check_range(key, secs, MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS)?;
            }
            (SettingKey::RequestTimeout, SettingValue::Int(secs)) => {
                next.request_timeout =
                    check_range(key, secs, MIN_REQUEST_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS)?;
            }
            (SettingKey::NotificationTimeout, SettingValue::Int(secs)) => {
                next.notification_timeout =
                    check_range(key, secs, 0, MAX_NOTIFICATION_TIMEOUT_SECS)?;
            }
            (SettingKey::DebugMode, SettingValue::Bool(enabled)) => {
                next.debug_mode = enabled;
            }
            (key, _) => {
                return Err(SettingsError::TypeMismatch {
                    key,
                    expected: expected_type(key),
                })
            }
        }

        if next == self.values {
            return Ok(false);
        }
        if let Some(path) = self.path.as_deref() {
            write_settings(path, &next)?;
        }
        self.values = next;
        info!("setting changed: {key}");
        self.notify(key);
        Ok(true)
    }

    /// Parses `raw` according to the key's type, then behaves like [`SettingsStore::set`].
    pub fn set_from_str(&mut self, key: SettingKey, raw: &str) -> Result<bool, SettingsError> {
        let raw = raw.trim();
        let value = match key {
            SettingKey::GotifyUrl | SettingKey::ClientToken => SettingValue::Text(raw.to_string()),
            SettingKey::PollInterval
            | SettingKey::RequestTimeout
            | SettingKey::NotificationTimeout => {
                SettingValue::Int(raw.parse().map_err(|_| SettingsError::TypeMismatch {
                    key,
                    expected: expected_type(key),
                })?)
            }
            SettingKey::DebugMode => match raw.to_ascii_lowercase().as_str() {
                "true" | "on" | "1" | "yes" => SettingValue::Bool(true),
                "false" | "off" | "0" | "no" => SettingValue::Bool(false),
                _ => {
                    return Err(SettingsError::TypeMismatch {
                        key,
                        expected: expected_type(key),
                    })
                }
            },
        };
        self.set(key, value)
    }

    pub fn subscribe(
        &mut self,
        key: SettingKey,
        tx: mpsc::UnboundedSender<SettingKey>,
    ) -> Subscription {
        self.next_subscription = self.next_subscription.wrapping_add(1);
        let id = Subscription(self.next_subscription);
        self.subscribers.push(Subscriber { id, key, tx });
        debug!("settings subscription added key={key} id={}", id.0);
        id
    }

    /// Idempotent; returns whether the subscription was still registered.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != subscription);
        before != self.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Every key with its current value; the client token is masked.
    pub fn masked_snapshot(&self) -> Vec<(SettingKey, String)> {
        SettingKey::ALL
            .into_iter()
            .map(|key| {
                let shown = match key {
                    SettingKey::ClientToken if self.client_token().is_empty() => {
                        "<unset>".to_string()
                    }
                    SettingKey::ClientToken => {
                        format!("<set, {} chars>", self.client_token().chars().count())
                    }
                    _ => self.get(key).to_string(),
                };
                (key, shown)
            })
            .collect()
    }

    fn notify(&mut self, key: SettingKey) {
        self.subscribers.retain(|subscriber| {
            if subscriber.key != key {
                return true;
            }
            subscriber.tx.send(key).is_ok()
        });
    }
}

fn check_range(key: SettingKey, value: u64, min: u64, max: u64) -> Result<u64, SettingsError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(SettingsError::OutOfRange {
            key,
            value,
            min,
            max,
        })
    }
}

fn expected_type(key: SettingKey) -> &'static str {
    match key {
        SettingKey::GotifyUrl | SettingKey::ClientToken => "a string",
        SettingKey::PollInterval | SettingKey::RequestTimeout | SettingKey::NotificationTimeout => {
            "a whole number of seconds"
        }
        SettingKey::DebugMode => "true or false",
    }
}

pub(crate) fn read_settings(path: &Path) -> Result<StoredSettings, SettingsError> {
    if !path.exists() {
        return Ok(StoredSettings::default());
    }

    let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str::<StoredSettings>(&content)?)
}

pub(crate) fn write_settings(path: &Path, settings: &StoredSettings) -> Result<(), SettingsError> {
    let content = serde_json::to_string_pretty(settings)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, content).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    restrict_file_permissions(path);
    Ok(())
}

/// Trims whitespace and trailing slashes; an empty URL is allowed and clears the setting.
pub fn normalize_base_url(input: &str) -> Result<String, SettingsError> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let url = reqwest::Url::parse(trimmed)
        .map_err(|error| SettingsError::InvalidUrl(error.to_string()))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(SettingsError::InvalidUrl(
            "Server URL must start with http:// or https://".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_through_names() {
        for key in SettingKey::ALL {
            assert_eq!(key.as_str().parse::<SettingKey>().unwrap(), key);
        }
        assert!(matches!(
            "poll_interval".parse::<SettingKey>(),
            Err(SettingsError::UnknownKey(_))
        ));
    }

    #[test]
    fn url_must_be_http_or_https() {
        let mut store = SettingsStore::in_memory(StoredSettings::default());
        assert!(matches!(
            store.set_from_str(SettingKey::GotifyUrl, "ftp://push.example.com"),
            Err(SettingsError::InvalidUrl(_))
        ));
        assert!(store
            .set_from_str(SettingKey::GotifyUrl, " https://push.example.com/ ")
            .unwrap());
        assert_eq!(store.gotify_url(), "https://push.example.com");
        assert!(store.set_from_str(SettingKey::GotifyUrl, "").unwrap());
        assert_eq!(store.gotify_url(), "");
    }

    #[test]
    fn integer_settings_are_range_checked() {
        let mut store = SettingsStore::in_memory(StoredSettings::default());
        assert!(matches!(
            store.set(SettingKey::RequestTimeout, SettingValue::Int(31)),
            Err(SettingsError::OutOfRange { .. })
        ));
        assert!(matches!(
            store.set(SettingKey::PollInterval, SettingValue::Int(5)),
            Err(SettingsError::OutOfRange { .. })
        ));
        assert!(matches!(
            store.set(SettingKey::DebugMode, SettingValue::Int(1)),
            Err(SettingsError::TypeMismatch { .. })
        ));
        assert!(matches!(
            store.set_from_str(SettingKey::PollInterval, "soon"),
            Err(SettingsError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn poll_interval_respects_request_timeout_floor() {
        let mut store = SettingsStore::in_memory(StoredSettings {
            poll_interval: 15,
            ..StoredSettings::default()
        });
        assert_eq!(store.poll_interval(), 15);
        store
            .set(SettingKey::RequestTimeout, SettingValue::Int(25))
            .unwrap();
        assert_eq!(store.poll_interval(), 30);
    }

    #[test]
    fn zero_notification_timeout_means_never() {
        let mut store = SettingsStore::in_memory(StoredSettings::default());
        assert_eq!(store.notification_timeout(), None);
        store
            .set(SettingKey::NotificationTimeout, SettingValue::Int(7))
            .unwrap();
        assert_eq!(store.notification_timeout(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn subscribers_hear_only_their_key_and_only_real_changes() {
        let mut store = SettingsStore::in_memory(StoredSettings::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = store.subscribe(SettingKey::PollInterval, tx.clone());
        store.subscribe(SettingKey::DebugMode, tx);

        store
            .set(SettingKey::PollInterval, SettingValue::Int(60))
            .unwrap();
        store
            .set(SettingKey::PollInterval, SettingValue::Int(60))
            .unwrap();
        store
            .set(SettingKey::RequestTimeout, SettingValue::Int(20))
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), SettingKey::PollInterval);
        assert!(rx.try_recv().is_err());

        assert!(store.unsubscribe(subscription));
        assert!(!store.unsubscribe(subscription));
        store
            .set(SettingKey::PollInterval, SettingValue::Int(90))
            .unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(store.subscriber_count(), 1);
    }

    #[test]
    fn snapshot_masks_token() {
        let store = SettingsStore::in_memory(StoredSettings {
            client_token: "Csecret".to_string(),
            ..StoredSettings::default()
        });
        let snapshot = store.masked_snapshot();
        let token = snapshot
            .iter()
            .find(|(key, _)| *key == SettingKey::ClientToken)
            .map(|(_, value)| value.as_str());
        assert_eq!(token, Some("<set, 7 chars>"));
        assert!(snapshot.iter().all(|(_, value)| !value.contains("Csecret")));
    }

    #[test]
    fn persists_changes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut store = SettingsStore::load(&path).unwrap();
        assert_eq!(store.poll_interval(), DEFAULT_POLL_INTERVAL_SECS);
        store
            .set_from_str(SettingKey::GotifyUrl, "https://push.example.com")
            .unwrap();
        store.set_from_str(SettingKey::DebugMode, "on").unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"gotify-url\": \"https://push.example.com\""));

        let reloaded = SettingsStore::load(&path).unwrap();
        assert_eq!(reloaded.gotify_url(), "https://push.example.com");
        assert!(reloaded.debug_mode());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            SettingsStore::load(&path),
            Err(SettingsError::Json(_))
        ));
    }
}
