use std::collections::BTreeMap;

use {
    chatrelay_channels::gating::AccessPolicy,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::accounts::{DEFAULT_ACCOUNT_ID, normalize_account_id};

/// Settings for one Google Chat bot account.
///
/// Every field is optional so the same shape serves as the provider-wide base
/// and as a per-account override. Use [`crate::accounts::resolve_account`] to
/// obtain concrete values.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleChatAccountConfig {
    /// On the base config this is the provider-level switch; on an account
    /// entry it toggles that account only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Display name shown in status output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Google Cloud project that owns the Pub/Sub subscription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Pub/Sub subscription ID, or a full `projects/*/subscriptions/*` path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,

    /// Path to a service-account JSON key. Falls back to
    /// `GOOGLE_APPLICATION_CREDENTIALS` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<String>,

    /// Direct-message access policy (default: pairing).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dm_policy: Option<AccessPolicy>,

    /// Sender emails or user IDs admitted under the allowlist DM policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_from: Option<Vec<String>>,

    /// Space access policy (default: disabled).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_policy: Option<AccessPolicy>,

    /// Space IDs admitted under the allowlist group policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_allow_from: Option<Vec<String>>,

    /// History window handed to the agent for space conversations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,

    /// History window handed to the agent for direct messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dm_history_limit: Option<usize>,

    /// Maximum length of one outbound message before it is chunked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_chunk_limit: Option<usize>,

    /// Text prepended to every outbound text reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_prefix: Option<String>,

    /// Messages requested per Pub/Sub pull call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_max_messages: Option<u32>,

    /// Shared secret expected as `?secret=...` on webhook deliveries.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_secret"
    )]
    pub webhook_secret: Option<Secret<String>>,
}

impl GoogleChatAccountConfig {
    /// Field-by-field merge: values set on `over` win, everything else comes
    /// from `self`. `enabled` is not merged here; resolution ANDs the two.
    pub fn merged_with(&self, over: &Self) -> Self {
        fn pick<T: Clone>(base: &Option<T>, over: &Option<T>) -> Option<T> {
            over.clone().or_else(|| base.clone())
        }

        Self {
            enabled: over.enabled,
            name: pick(&self.name, &over.name),
            project_id: pick(&self.project_id, &over.project_id),
            subscription: pick(&self.subscription, &over.subscription),
            credentials_path: pick(&self.credentials_path, &over.credentials_path),
            dm_policy: pick(&self.dm_policy, &over.dm_policy),
            allow_from: pick(&self.allow_from, &over.allow_from),
            group_policy: pick(&self.group_policy, &over.group_policy),
            group_allow_from: pick(&self.group_allow_from, &over.group_allow_from),
            history_limit: pick(&self.history_limit, &over.history_limit),
            dm_history_limit: pick(&self.dm_history_limit, &over.dm_history_limit),
            text_chunk_limit: pick(&self.text_chunk_limit, &over.text_chunk_limit),
            message_prefix: pick(&self.message_prefix, &over.message_prefix),
            pull_max_messages: pick(&self.pull_max_messages, &over.pull_max_messages),
            webhook_secret: pick(&self.webhook_secret, &over.webhook_secret),
        }
    }
}

impl std::fmt::Debug for GoogleChatAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleChatAccountConfig")
            .field("enabled", &self.enabled)
            .field("name", &self.name)
            .field("project_id", &self.project_id)
            .field("subscription", &self.subscription)
            .field("credentials_path", &self.credentials_path)
            .field("dm_policy", &self.dm_policy)
            .field("allow_from", &self.allow_from)
            .field("group_policy", &self.group_policy)
            .field("group_allow_from", &self.group_allow_from)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Provider-wide Google Chat configuration: base settings plus optional
/// per-account overrides keyed by account ID.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleChatConfig {
    #[serde(flatten)]
    pub base: GoogleChatAccountConfig,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub accounts: BTreeMap<String, GoogleChatAccountConfig>,
}

impl GoogleChatConfig {
    /// Enable or disable one account.
    ///
    /// The default account without a dedicated entry lives in the base
    /// settings, so toggling it flips the provider-level flag.
    pub fn set_account_enabled(&mut self, account_id: &str, enabled: bool) {
        let account_id = normalize_account_id(Some(account_id));
        if account_id == DEFAULT_ACCOUNT_ID && !self.accounts.contains_key(DEFAULT_ACCOUNT_ID) {
            self.base.enabled = Some(enabled);
            return;
        }
        self.accounts.entry(account_id).or_default().enabled = Some(enabled);
    }

    /// Remove an account. Returns whether anything was removed.
    ///
    /// Deleting the default account when it is backed by base settings
    /// clears the provider-specific base fields and keeps shared policy.
    pub fn delete_account(&mut self, account_id: &str) -> bool {
        let account_id = normalize_account_id(Some(account_id));
        if self.accounts.remove(&account_id).is_some() {
            return true;
        }
        if account_id != DEFAULT_ACCOUNT_ID {
            return false;
        }
        let base = &mut self.base;
        let had_fields = base.name.is_some()
            || base.project_id.is_some()
            || base.subscription.is_some()
            || base.credentials_path.is_some();
        base.name = None;
        base.project_id = None;
        base.subscription = None;
        base.credentials_path = None;
        had_fields
    }
}
