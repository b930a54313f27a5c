//! Shared value types and small utilities used across all chatrelay crates.

pub mod time;
pub mod types;

pub use types::{ChatType, MediaAttachment, ReplyPayload};
