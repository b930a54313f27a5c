use {async_trait::async_trait, chatrelay_common::ReplyPayload};

use crate::message::ChannelMessage;

// ── Channel events (pub/sub) ────────────────────────────────────────────────

/// Events emitted by channel plugins for real-time status updates.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelEvent {
    InboundMessage {
        channel_type: String,
        account_id: String,
        peer_id: String,
        sender_name: Option<String>,
        chat_id: String,
        chat_type: String,
        access_granted: bool,
    },
    /// A long-lived listener for an account started receiving events.
    ListenerStarted {
        channel_type: String,
        account_id: String,
    },
    /// A long-lived listener for an account stopped.
    ListenerStopped {
        channel_type: String,
        account_id: String,
    },
}

/// Sink for channel events; the host provides the concrete implementation.
#[async_trait]
pub trait ChannelEventSink: Send + Sync {
    /// Broadcast a channel event for status displays.
    async fn emit(&self, event: ChannelEvent);

    /// Hand an admitted inbound message to the agent. Called only after
    /// access policy allowed the message.
    async fn dispatch_to_chat(
        &self,
        message: ChannelMessage,
        reply_to: ChannelReplyTarget,
        meta: ChannelMessageMeta,
    ) -> anyhow::Result<()>;
}

/// Per-account context passed along with a dispatched message.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ChannelMessageMeta {
    pub channel_type: String,
    /// How many prior messages of this conversation the agent should load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,
}

/// Where to send the agent's response back.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChannelReplyTarget {
    pub channel_type: String,
    pub account_id: String,
    /// Chat/peer ID to send the reply to.
    pub chat_id: String,
    /// Thread to reply into, when the inbound message was threaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Inbound message ID the reply answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Core channel plugin trait. Each messaging platform implements this.
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// Channel identifier (e.g. "googlechat").
    fn id(&self) -> &str;

    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start the long-lived listener for an account.
    async fn start_account(&self, account_id: &str) -> anyhow::Result<()>;

    /// Stop an account's listener. Stopping an account that is not running is
    /// not an error.
    async fn stop_account(&self, account_id: &str) -> anyhow::Result<()>;

    /// Get outbound adapter for sending messages.
    fn outbound(&self) -> Option<&dyn ChannelOutbound>;

    /// Get status adapter for health checks.
    fn status(&self) -> Option<&dyn ChannelStatus>;
}

/// Identifier of the last provider message created by a send call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SendReceipt {
    pub message_id: String,
    /// Destination the message was actually delivered to, after target
    /// normalization.
    pub chat_id: String,
}

/// Send messages to a channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_text(
        &self,
        account_id: &str,
        to: &str,
        text: &str,
        thread_id: Option<&str>,
    ) -> crate::Result<SendReceipt>;

    async fn send_media(
        &self,
        account_id: &str,
        to: &str,
        payload: &ReplyPayload,
        thread_id: Option<&str>,
    ) -> crate::Result<SendReceipt>;
}

/// Probe channel account health.
#[async_trait]
pub trait ChannelStatus: Send + Sync {
    async fn probe(&self, account_id: &str) -> crate::Result<ChannelHealthSnapshot>;
}

/// Channel health snapshot. Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ChannelHealthSnapshot {
    pub account_id: String,
    pub configured: bool,
    pub running: bool,
    pub last_start_at: Option<i64>,
    pub last_stop_at: Option<i64>,
    pub last_error: Option<String>,
    pub last_inbound_at: Option<i64>,
    pub last_outbound_at: Option<i64>,
    pub details: Option<String>,
}
