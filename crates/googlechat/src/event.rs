//! Wire types for Google Chat interaction events and the Pub/Sub envelopes
//! that carry them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Event type of a posted message.
pub const EVENT_MESSAGE: &str = "MESSAGE";
/// Event type sent when the bot is added to a space or DM.
pub const EVENT_ADDED_TO_SPACE: &str = "ADDED_TO_SPACE";
pub const EVENT_REMOVED_FROM_SPACE: &str = "REMOVED_FROM_SPACE";

/// Sender type for app-authored messages.
pub const USER_TYPE_BOT: &str = "BOT";

/// Legacy `type` value for direct-message spaces.
pub const SPACE_TYPE_DM: &str = "DM";
/// Current `spaceType` value for direct-message spaces.
pub const SPACE_TYPE_DIRECT_MESSAGE: &str = "DIRECT_MESSAGE";

fn resource_name<'a>(name: &'a Option<String>, id: &'a Option<String>) -> Option<&'a str> {
    [name, id]
        .into_iter()
        .filter_map(|v| v.as_deref())
        .find(|v| !v.trim().is_empty())
}

/// An interaction event as delivered by Google Chat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default)]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub user: Option<ChatUser>,
    #[serde(default)]
    pub space: Option<ChatSpace>,
}

impl ChatEvent {
    /// Case-insensitive comparison against an event type constant.
    pub fn is_type(&self, expected: &str) -> bool {
        self.event_type
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(expected))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Resource name, e.g. `spaces/AAA/messages/BBB`.
    #[serde(default)]
    pub name: Option<String>,
    /// Older payloads carry the resource name here instead.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub sender: Option<ChatUser>,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Text with the bot mention stripped; set for slash commands and
    /// @-mentions in spaces.
    #[serde(default)]
    pub argument_text: Option<String>,
    #[serde(default)]
    pub space: Option<ChatSpace>,
    #[serde(default)]
    pub thread: Option<ChatThread>,
}

impl ChatMessage {
    /// `name`, falling back to `id`.
    pub fn resource_name(&self) -> Option<&str> {
        resource_name(&self.name, &self.id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUser {
    /// Resource name, e.g. `users/123`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// `HUMAN` or `BOT`.
    #[serde(rename = "type", default)]
    pub user_type: Option<String>,
}

impl ChatUser {
    pub fn resource_name(&self) -> Option<&str> {
        resource_name(&self.name, &self.id)
    }

    pub fn is_bot(&self) -> bool {
        self.user_type
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(USER_TYPE_BOT))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSpace {
    /// Resource name, e.g. `spaces/AAA`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    /// Legacy marker: `DM`, `ROOM`.
    #[serde(rename = "type", default)]
    pub space_type_legacy: Option<String>,
    /// Current marker: `DIRECT_MESSAGE`, `SPACE`, `GROUP_CHAT`.
    #[serde(default)]
    pub space_type: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl ChatSpace {
    pub fn resource_name(&self) -> Option<&str> {
        resource_name(&self.name, &self.id)
    }

    pub fn is_direct(&self) -> bool {
        let legacy = self
            .space_type_legacy
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(SPACE_TYPE_DM));
        let current = self
            .space_type
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(SPACE_TYPE_DIRECT_MESSAGE));
        legacy || current
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatThread {
    /// Resource name, e.g. `spaces/AAA/threads/CCC`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl ChatThread {
    pub fn resource_name(&self) -> Option<&str> {
        resource_name(&self.name, &self.id)
    }
}

/// A Pub/Sub message carrying a base64-encoded Chat event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, alias = "message_id")]
    pub message_id: Option<String>,
    #[serde(default, alias = "publish_time")]
    pub publish_time: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// One entry of a pull response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message: PubSubMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    #[serde(default)]
    pub received_messages: Vec<ReceivedMessage>,
}

/// Body of a Pub/Sub push delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PubSubMessage,
    pub subscription: String,
}
