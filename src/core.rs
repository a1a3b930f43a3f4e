use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::debug;

use crate::consts::{SETTINGS_DIR_NAME, SETTINGS_FILE_NAME};

/// Default location of `settings.json` under the user's config directory.
pub fn settings_file() -> Result<PathBuf, String> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| "Failed to resolve user config dir".to_string())?
        .join(SETTINGS_DIR_NAME);

    fs::create_dir_all(&config_dir)
        .map_err(|error| format!("Failed to create config directory: {error}"))?;

    Ok(config_dir.join(SETTINGS_FILE_NAME))
}

#[cfg(unix)]
pub(crate) fn restrict_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt as _;

    if path.exists() {
        if let Err(error) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            debug!("restrict_file_permissions: failed for {path:?}: {error}");
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn restrict_file_permissions(_path: &Path) {}

/// Strips credentials and the query string so a URL is safe to log or display.
pub fn redact_url(url: &str) -> String {
    let mut parsed = match reqwest::Url::parse(url) {
        Ok(url) => url,
        Err(_) => return "<invalid-url>".to_string(),
    };
    if !parsed.username().is_empty() {
        let _ = parsed.set_username("***");
    }
    if parsed.password().is_some() {
        let _ = parsed.set_password(None);
    }
    let has_secret_param = parsed
        .query_pairs()
        .any(|(name, _)| name.eq_ignore_ascii_case("token"));
    if has_secret_param {
        parsed.set_query(Some("token=***"));
    }
    parsed.to_string()
}

pub fn truncate_message(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }

    let truncated: String = input.chars().take(max_chars).collect();
    format!("{truncated}...")
}

pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_url_masks_token_query_and_userinfo() {
        assert_eq!(
            redact_url("https://user:pw@push.example.com/message?token=abc"),
            "https://***@push.example.com/message?token=***"
        );
        assert_eq!(
            redact_url("https://push.example.com/message?limit=5"),
            "https://push.example.com/message?limit=5"
        );
        assert_eq!(redact_url("not a url"), "<invalid-url>");
    }

    #[test]
    fn truncate_message_counts_chars() {
        assert_eq!(truncate_message("héllo", 10), "héllo");
        assert_eq!(truncate_message("héllo world", 5), "héllo...");
    }
}
