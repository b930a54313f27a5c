//! Google Chat channel plugin for chatrelay.
//!
//! Receives Google Chat events either from a Cloud Pub/Sub subscription
//! (pull) or from HTTP push deliveries (webhook), normalizes them into
//! [`ChannelMessage`](chatrelay_channels::ChannelMessage), applies the
//! account's access policy and hands admitted messages to the host. Replies
//! go out through the Chat REST API.

pub mod access;
pub mod accounts;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod inbound;
pub mod normalize;
pub mod outbound;
pub mod plugin;
pub mod pubsub;
pub mod state;
pub mod webhook;

/// Channel identifier used in events, reply targets and logs.
pub const CHANNEL_ID: &str = "googlechat";

pub use {
    access::{AccessDenied, check_access},
    accounts::{
        ResolvedGoogleChatAccount, describe_account, is_configured, list_account_ids,
        list_enabled_accounts, resolve_account, resolve_default_account_id, resolve_dm_policy,
    },
    config::{GoogleChatAccountConfig, GoogleChatConfig},
    error::{Error, Result},
    inbound::{InboundOutcome, InboundPipeline},
    normalize::{WebhookEvent, normalize_pubsub_message, parse_webhook_body},
    outbound::{GoogleChatOutbound, chunk_text},
    plugin::GoogleChatPlugin,
    pubsub::{ListenerState, PullListener, Subscription, SubscriptionConnector},
    webhook::router,
};
