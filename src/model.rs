use serde::{Deserialize, Serialize};

/// A message as delivered by the server. Never mutated after decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: i64,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GotifyMessageWire {
    pub(crate) id: i64,
    #[serde(default)]
    pub(crate) title: Option<String>,
    pub(crate) message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GotifyMessageListWire {
    #[serde(default)]
    pub(crate) messages: Option<Vec<GotifyMessageWire>>,
}

impl From<GotifyMessageWire> for Message {
    fn from(wire: GotifyMessageWire) -> Self {
        Self {
            id: wire.id,
            title: wire.title.unwrap_or_default(),
            message: wire.message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
        }
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// State owned by the poll coordinator; mutated only when a poll completes or fails.
#[derive(Debug, Clone, Serialize)]
pub struct PollState {
    /// High-water mark of message ids already surfaced.
    pub last_seen_id: i64,
    pub connection: ConnectionState,
    pub consecutive_errors: u32,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            last_seen_id: 0,
            connection: ConnectionState::Disconnected,
            consecutive_errors: 0,
        }
    }
}
