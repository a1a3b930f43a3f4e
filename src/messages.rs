use tracing::debug;

use crate::{
    core::truncate_message,
    model::{GotifyMessageListWire, Message},
};

#[derive(Debug, thiserror::Error)]
#[error("Failed to decode message list: {0}")]
pub struct ParseError(#[from] serde_json::Error);

/// Decodes a `/message` response body. An absent or null `messages` field is an empty batch.
pub fn parse_message_list(body: &[u8]) -> Result<Vec<Message>, ParseError> {
    let list = serde_json::from_slice::<GotifyMessageListWire>(body)?;
    let messages: Vec<Message> = list
        .messages
        .unwrap_or_default()
        .into_iter()
        .map(Message::from)
        .collect();
    debug!("message list parsed count={}", messages.len());
    Ok(messages)
}

/// Picks the messages newer than `last_seen_id`.
///
/// The server lists newest first, so the batch is walked from its last entry to
/// its first. Each message is compared against the running high-water mark, which
/// is returned alongside the selection and never decreases.
pub fn select_new_messages(batch: &[Message], last_seen_id: i64) -> (Vec<&Message>, i64) {
    let mut high_water = last_seen_id;
    let mut fresh = Vec::new();
    for message in batch.iter().rev() {
        if message.id > high_water {
            debug!(
                "new message id={} title={}",
                message.id,
                truncate_message(&message.title, 60)
            );
            fresh.push(message);
            high_water = high_water.max(message.id);
        }
    }
    (fresh, high_water)
}
