//! Channel plugin surface shared between provider adapters and their host.
//!
//! Each provider implements [`ChannelPlugin`] plus the outbound and status
//! traits. Inbound traffic is normalized into [`ChannelMessage`], gated by the
//! access policies in [`gating`], and handed to the host through
//! [`ChannelEventSink`].

pub mod error;
pub mod gating;
pub mod message;
pub mod message_log;
pub mod pairing;
pub mod plugin;

pub use {
    error::{Error, Result},
    message::{ChannelChat, ChannelMessage, ChannelSender},
    plugin::{
        ChannelEvent, ChannelEventSink, ChannelHealthSnapshot, ChannelMessageMeta,
        ChannelOutbound, ChannelPlugin, ChannelReplyTarget, ChannelStatus, SendReceipt,
    },
};
