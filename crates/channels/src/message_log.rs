use async_trait::async_trait;

use crate::{Result, message::ChannelMessage};

/// A single logged inbound message.
#[derive(Debug, Clone)]
pub struct MessageLogEntry {
    pub account_id: String,
    pub channel_type: String,
    pub message_id: String,
    pub peer_id: String,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub chat_id: String,
    pub chat_type: String,
    pub thread_id: Option<String>,
    pub body: String,
    pub access_granted: bool,
    pub created_at: i64,
}

impl MessageLogEntry {
    pub fn from_message(
        channel_type: &str,
        account_id: &str,
        message: &ChannelMessage,
        access_granted: bool,
        created_at: i64,
    ) -> Self {
        Self {
            account_id: account_id.to_string(),
            channel_type: channel_type.to_string(),
            message_id: message.id.clone(),
            peer_id: message.sender.id.clone(),
            sender_name: message.sender.display_name.clone(),
            sender_email: message.sender.email.clone(),
            chat_id: message.chat.id.clone(),
            chat_type: message.chat.chat_type.to_string(),
            thread_id: message.thread_id.clone(),
            body: message.text.clone(),
            access_granted,
            created_at,
        }
    }
}

/// Persistent log of every inbound message, admitted or not, for forensics.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn log(&self, entry: MessageLogEntry) -> Result<()>;
}
