//! Conversion of Google Chat events into [`ChannelMessage`].
//!
//! Pull and push deliveries both end up in [`normalize_event`], so the same
//! logical event yields the same message regardless of transport.

use {
    base64::Engine,
    chatrelay_channels::{ChannelChat, ChannelMessage, ChannelSender},
    chatrelay_common::ChatType,
    tracing::debug,
};

use crate::{
    Result,
    event::{
        ChatEvent, ChatSpace, ChatUser, EVENT_ADDED_TO_SPACE, EVENT_MESSAGE,
        EVENT_REMOVED_FROM_SPACE, PubSubMessage, PushEnvelope,
    },
};

const USER_PREFIX: &str = "users/";
const SPACE_PREFIX: &str = "spaces/";

/// What a webhook delivery turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    /// A user message to run through the inbound pipeline.
    Message(ChannelMessage),
    /// The bot was added to a space; reply inline with the welcome text.
    AddedToSpace { welcome: String },
    /// Anything else: bot messages, removals, card clicks, malformed events.
    Ignored,
}

/// Normalize one Chat event. Returns `None` for anything that is not a user
/// message carrying the identifiers downstream code relies on.
pub fn normalize_event(event: &ChatEvent, raw: serde_json::Value) -> Option<ChannelMessage> {
    if !event.is_type(EVENT_MESSAGE) {
        return None;
    }
    let message = event.message.as_ref()?;
    let sender = message.sender.as_ref().or(event.user.as_ref())?;
    if sender.is_bot() {
        debug!("dropping bot-authored google chat message");
        return None;
    }
    let space = message.space.as_ref().or(event.space.as_ref())?;

    let id = message.resource_name()?.trim().to_string();
    let sender_id = strip_resource_prefix(sender.resource_name()?, USER_PREFIX)?;
    let chat_id = strip_resource_prefix(space.resource_name()?, SPACE_PREFIX)?;

    let text = non_empty(message.argument_text.as_deref())
        .or_else(|| non_empty(message.text.as_deref()))
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    let timestamp_ms = message
        .create_time
        .as_deref()
        .or(event.event_time.as_deref())
        .and_then(parse_timestamp_ms);

    Some(ChannelMessage {
        id,
        timestamp_ms,
        sender: ChannelSender {
            id: sender_id,
            display_name: non_empty(sender.display_name.as_deref()).map(str::to_string),
            email: non_empty(sender.email.as_deref()).map(|e| e.trim().to_string()),
        },
        chat: ChannelChat {
            display_name: non_empty(space.display_name.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| chat_id.clone()),
            chat_type: chat_type(space),
            id: chat_id,
        },
        thread_id: message
            .thread
            .as_ref()
            .and_then(|t| t.resource_name())
            .map(|t| t.trim().to_string()),
        text,
        raw,
    })
}

/// Normalize a raw JSON value. Values that do not have the event shape
/// normalize to `None`.
pub fn normalize_value(raw: serde_json::Value) -> Option<ChannelMessage> {
    let event: ChatEvent = match serde_json::from_value(raw.clone()) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "google chat payload is not an event");
            return None;
        },
    };
    normalize_event(&event, raw)
}

/// Decode the base64 event carried by a Pub/Sub message.
///
/// Undecodable payloads are errors so the pull listener can nack them.
pub fn decode_pubsub_data(message: &PubSubMessage) -> Result<serde_json::Value> {
    let data = message.data.as_deref().unwrap_or_default().trim();
    let bytes = base64::engine::general_purpose::STANDARD.decode(data)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Pull-transport entry point.
pub fn normalize_pubsub_message(message: &PubSubMessage) -> Result<Option<ChannelMessage>> {
    Ok(normalize_value(decode_pubsub_data(message)?))
}

/// Push-transport entry point. Accepts either a bare Chat event or a Pub/Sub
/// push envelope wrapping one.
pub fn parse_webhook_body(body: &[u8]) -> Result<WebhookEvent> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    let value = if is_push_envelope(&value) {
        let envelope: PushEnvelope = serde_json::from_value(value)?;
        decode_pubsub_data(&envelope.message)?
    } else {
        value
    };
    Ok(classify_webhook_value(value))
}

fn is_push_envelope(value: &serde_json::Value) -> bool {
    value.get("subscription").is_some_and(|s| s.is_string())
        && value.get("message").is_some_and(|m| m.get("data").is_some())
}

fn classify_webhook_value(value: serde_json::Value) -> WebhookEvent {
    let Ok(event) = serde_json::from_value::<ChatEvent>(value.clone()) else {
        return WebhookEvent::Ignored;
    };
    if event.is_type(EVENT_ADDED_TO_SPACE) {
        return WebhookEvent::AddedToSpace {
            welcome: welcome_text(event.user.as_ref()),
        };
    }
    if event.is_type(EVENT_REMOVED_FROM_SPACE) {
        debug!(
            space = event.space.as_ref().and_then(ChatSpace::resource_name).unwrap_or_default(),
            "google chat app removed from space"
        );
        return WebhookEvent::Ignored;
    }
    match normalize_event(&event, value) {
        Some(message) => WebhookEvent::Message(message),
        None => WebhookEvent::Ignored,
    }
}

/// Greeting returned inline when the bot joins a space.
pub fn welcome_text(user: Option<&ChatUser>) -> String {
    let name = user
        .and_then(|u| non_empty(u.display_name.as_deref()))
        .unwrap_or("there");
    format!("Thanks for adding me, {name}! Mention me or send a direct message to get started.")
}

fn chat_type(space: &ChatSpace) -> ChatType {
    if space.is_direct() {
        ChatType::Direct
    } else {
        ChatType::Group
    }
}

/// `users/123` -> `123`. Blank results are rejected.
fn strip_resource_prefix(name: &str, prefix: &str) -> Option<String> {
    let name = name.trim();
    let bare = name.strip_prefix(prefix).unwrap_or(name).trim();
    (!bare.is_empty()).then(|| bare.to_string())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_timestamp_ms(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.timestamp_millis())
}
