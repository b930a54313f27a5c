use {
    chatrelay_common::ChatType,
    serde::{Deserialize, Serialize},
};

/// Who sent an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSender {
    /// Bare provider user ID (no resource-name prefix).
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// Conversation an inbound message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelChat {
    /// Bare provider chat ID (no resource-name prefix).
    pub id: String,
    pub display_name: String,
    pub chat_type: ChatType,
}

/// Provider-agnostic representation of one inbound chat event.
///
/// Built once by a provider's normalizer and never mutated afterwards. `raw`
/// keeps the original event for diagnostics only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub id: String,
    /// Creation time in milliseconds since the Unix epoch, when known.
    pub timestamp_ms: Option<i64>,
    pub sender: ChannelSender,
    pub chat: ChannelChat,
    /// Provider thread reference; `None` means the reply is not thread-scoped.
    pub thread_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl ChannelMessage {
    pub fn chat_type(&self) -> ChatType {
        self.chat.chat_type
    }

    pub fn is_direct(&self) -> bool {
        self.chat.chat_type.is_direct()
    }
}
