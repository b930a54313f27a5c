//! Shared inbound handling for both transports: policy, logging, events and
//! dispatch to the agent.

use std::sync::{Arc, RwLock};

use {
    chatrelay_channels::{
        ChannelEvent, ChannelEventSink, ChannelMessage, ChannelMessageMeta, ChannelReplyTarget,
        message_log::{MessageLog, MessageLogEntry},
        pairing::PairingLookup,
    },
    chatrelay_common::time::unix_now_ms,
    tracing::{debug, info, warn},
};

use crate::{
    CHANNEL_ID, Result,
    access::{AccessDenied, check_access},
    accounts::{ResolvedGoogleChatAccount, resolve_account},
    config::GoogleChatConfig,
    event::PubSubMessage,
    normalize::normalize_pubsub_message,
    state::AccountRuntime,
};

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Admitted and handed to the agent.
    Dispatched,
    /// Rejected by access policy.
    Denied(AccessDenied),
    /// Nothing to do: not a user message, empty text, or no agent attached.
    Dropped,
}

/// Per-account inbound pipeline. Cheap to build; the webhook creates one per
/// request and the pull listener keeps one for its lifetime.
pub struct InboundPipeline {
    pub(crate) account_id: String,
    pub(crate) config: Arc<RwLock<GoogleChatConfig>>,
    pub(crate) runtime: Arc<AccountRuntime>,
    pub(crate) event_sink: Option<Arc<dyn ChannelEventSink>>,
    pub(crate) message_log: Option<Arc<dyn MessageLog>>,
    pub(crate) pairing: Option<Arc<dyn PairingLookup>>,
}

impl InboundPipeline {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Freshly resolved account, so config updates apply to the next message.
    pub fn account(&self) -> ResolvedGoogleChatAccount {
        let config = self.config.read().unwrap_or_else(|e| e.into_inner());
        resolve_account(&config, Some(&self.account_id))
    }

    /// Pull entry point. Undecodable payloads are errors; events that are
    /// not user messages are dropped.
    pub async fn handle_pubsub(&self, message: &PubSubMessage) -> Result<InboundOutcome> {
        match normalize_pubsub_message(message)? {
            Some(normalized) => self.handle_message(normalized).await,
            None => {
                debug!(
                    account_id = %self.account_id,
                    pubsub_message_id = message.message_id.as_deref().unwrap_or_default(),
                    "ignoring non-message google chat event"
                );
                Ok(InboundOutcome::Dropped)
            },
        }
    }

    /// Run a normalized message through access control and, if admitted,
    /// hand it to the agent.
    pub async fn handle_message(&self, message: ChannelMessage) -> Result<InboundOutcome> {
        self.runtime.record_inbound();
        let account = self.account();
        let access = check_access(&account, &message, self.pairing.as_deref());
        let access_granted = access.is_ok();

        debug!(
            account_id = %account.account_id,
            message_id = %message.id,
            chat_id = %message.chat.id,
            chat_type = %message.chat_type(),
            sender = %message.sender.id,
            access_granted,
            "google chat inbound message"
        );

        if let Some(log) = &self.message_log {
            let entry = MessageLogEntry::from_message(
                CHANNEL_ID,
                &account.account_id,
                &message,
                access_granted,
                unix_now_ms() / 1000,
            );
            if let Err(e) = log.log(entry).await {
                warn!(account_id = %account.account_id, "failed to log google chat message: {e}");
            }
        }

        if let Some(sink) = &self.event_sink {
            sink.emit(ChannelEvent::InboundMessage {
                channel_type: CHANNEL_ID.to_string(),
                account_id: account.account_id.clone(),
                peer_id: message.sender.id.clone(),
                sender_name: message.sender.display_name.clone(),
                chat_id: message.chat.id.clone(),
                chat_type: message.chat_type().to_string(),
                access_granted,
            })
            .await;
        }

        if let Err(reason) = access {
            info!(
                account_id = %account.account_id,
                sender = %message.sender.id,
                %reason,
                "google chat message denied"
            );
            return Ok(InboundOutcome::Denied(reason));
        }

        if message.text.trim().is_empty() {
            debug!(account_id = %account.account_id, "google chat message has no text");
            return Ok(InboundOutcome::Dropped);
        }

        let Some(sink) = &self.event_sink else {
            warn!(account_id = %account.account_id, "no event sink attached; dropping admitted message");
            return Ok(InboundOutcome::Dropped);
        };

        let reply_to = ChannelReplyTarget {
            channel_type: CHANNEL_ID.to_string(),
            account_id: account.account_id.clone(),
            chat_id: format!("spaces/{}", message.chat.id),
            thread_id: message.thread_id.clone(),
            message_id: Some(message.id.clone()),
        };
        let meta = ChannelMessageMeta {
            channel_type: CHANNEL_ID.to_string(),
            history_limit: account.history_limit_for(message.is_direct()),
        };
        sink.dispatch_to_chat(message, reply_to, meta).await?;
        Ok(InboundOutcome::Dispatched)
    }
}
