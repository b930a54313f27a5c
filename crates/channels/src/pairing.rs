use std::{collections::HashSet, sync::RwLock};

use crate::message::ChannelSender;

/// Read-only view of the host's pairing approvals.
///
/// The approval workflow itself lives in the host; channel adapters only ask
/// whether a sender has already been approved for an account.
pub trait PairingLookup: Send + Sync {
    fn is_approved(&self, channel_type: &str, account_id: &str, sender: &ChannelSender) -> bool;
}

/// In-memory approval set keyed by `(channel, account, identity)`.
///
/// A sender is approved when either its bare ID or its email (lower-cased)
/// has been recorded.
#[derive(Debug, Default)]
pub struct ApprovedSenders {
    entries: RwLock<HashSet<(String, String, String)>>,
}

impl ApprovedSenders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn approve(&self, channel_type: &str, account_id: &str, identity: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key(channel_type, account_id, identity));
    }

    pub fn revoke(&self, channel_type: &str, account_id: &str, identity: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&key(channel_type, account_id, identity))
    }
}

fn key(channel_type: &str, account_id: &str, identity: &str) -> (String, String, String) {
    (
        channel_type.to_string(),
        account_id.to_string(),
        identity.trim().to_lowercase(),
    )
}

impl PairingLookup for ApprovedSenders {
    fn is_approved(&self, channel_type: &str, account_id: &str, sender: &ChannelSender) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        std::iter::once(sender.id.as_str())
            .chain(sender.email.as_deref())
            .filter(|identity| !identity.trim().is_empty())
            .any(|identity| entries.contains(&key(channel_type, account_id, identity)))
    }
}
