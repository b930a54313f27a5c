//! Account resolution: which settings apply to which account.
//!
//! Resolution is a pure function of the config value. Callers re-resolve on
//! every use instead of caching, so config reloads take effect immediately.

use {
    chatrelay_channels::gating::AccessPolicy,
    secrecy::Secret,
    serde::Serialize,
};

use crate::{
    access::normalize_allow_entry,
    config::{GoogleChatAccountConfig, GoogleChatConfig},
};

/// Synthetic account ID used when no per-account entries exist.
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// Google Chat rejects messages above 4096 characters; stay under it.
pub const DEFAULT_TEXT_CHUNK_LIMIT: usize = 4000;

pub const DEFAULT_PULL_MAX_MESSAGES: u32 = 10;

/// Environment variable consulted when an account has no credentials path.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Fully merged, ready-to-use settings for one account.
#[derive(Clone)]
pub struct ResolvedGoogleChatAccount {
    pub account_id: String,
    pub name: Option<String>,
    pub enabled: bool,
    pub project_id: String,
    pub subscription: String,
    pub credentials_path: Option<String>,
    pub dm_policy: AccessPolicy,
    pub allow_from: Vec<String>,
    pub group_policy: AccessPolicy,
    pub group_allow_from: Vec<String>,
    pub history_limit: Option<usize>,
    pub dm_history_limit: Option<usize>,
    pub text_chunk_limit: usize,
    pub message_prefix: Option<String>,
    pub pull_max_messages: u32,
    pub webhook_secret: Option<Secret<String>>,
}

impl std::fmt::Debug for ResolvedGoogleChatAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedGoogleChatAccount")
            .field("account_id", &self.account_id)
            .field("enabled", &self.enabled)
            .field("project_id", &self.project_id)
            .field("subscription", &self.subscription)
            .field("credentials_path", &self.credentials_path)
            .field("dm_policy", &self.dm_policy)
            .field("group_policy", &self.group_policy)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl ResolvedGoogleChatAccount {
    /// Both Pub/Sub identifiers are present.
    pub fn is_configured(&self) -> bool {
        !self.project_id.trim().is_empty() && !self.subscription.trim().is_empty()
    }

    /// Full subscription resource path. A subscription that is already a
    /// `projects/...` path is used verbatim.
    pub fn subscription_path(&self) -> String {
        let subscription = self.subscription.trim();
        if subscription.starts_with("projects/") {
            subscription.to_string()
        } else {
            format!(
                "projects/{}/subscriptions/{subscription}",
                self.project_id.trim()
            )
        }
    }

    /// Credentials reference used for authentication: the configured path,
    /// or the application-default environment variable.
    pub fn credentials_ref(&self) -> Option<String> {
        self.credentials_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .or_else(|| {
                std::env::var(CREDENTIALS_ENV)
                    .ok()
                    .filter(|p| !p.trim().is_empty())
            })
    }

    /// History window for a conversation of the given kind.
    pub fn history_limit_for(&self, direct: bool) -> Option<usize> {
        if direct {
            self.dm_history_limit.or(self.history_limit)
        } else {
            self.history_limit
        }
    }
}

/// Free-function form of [`ResolvedGoogleChatAccount::is_configured`] for
/// host code that works with plain function pointers.
pub fn is_configured(account: &ResolvedGoogleChatAccount) -> bool {
    account.is_configured()
}

/// Trimmed account ID, or the default ID when absent or blank.
pub fn normalize_account_id(account_id: Option<&str>) -> String {
    match account_id.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => DEFAULT_ACCOUNT_ID.to_string(),
    }
}

/// Every configured account ID in lexicographic order; the synthetic default
/// ID when none are configured.
pub fn list_account_ids(config: &GoogleChatConfig) -> Vec<String> {
    let ids: Vec<String> = config
        .accounts
        .keys()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        vec![DEFAULT_ACCOUNT_ID.to_string()]
    } else {
        // BTreeMap keys are sorted, but trimming can reorder them.
        let mut ids = ids;
        ids.sort();
        ids.dedup();
        ids
    }
}

pub fn resolve_default_account_id(config: &GoogleChatConfig) -> String {
    let ids = list_account_ids(config);
    if ids.iter().any(|id| id == DEFAULT_ACCOUNT_ID) {
        return DEFAULT_ACCOUNT_ID.to_string();
    }
    ids.into_iter()
        .next()
        .unwrap_or_else(|| DEFAULT_ACCOUNT_ID.to_string())
}

fn account_entry<'a>(
    config: &'a GoogleChatConfig,
    account_id: &str,
) -> Option<&'a GoogleChatAccountConfig> {
    config
        .accounts
        .get(account_id)
        .or_else(|| config.accounts.iter().find(|(k, _)| k.trim() == account_id).map(|(_, v)| v))
}

/// Merge base and account settings into a concrete account. Never fails: an
/// account without credentials resolves with empty identifiers.
pub fn resolve_account(
    config: &GoogleChatConfig,
    account_id: Option<&str>,
) -> ResolvedGoogleChatAccount {
    let account_id = match account_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => resolve_default_account_id(config),
    };
    let empty = GoogleChatAccountConfig::default();
    let entry = account_entry(config, &account_id).unwrap_or(&empty);
    let merged = config.base.merged_with(entry);

    let provider_enabled = config.base.enabled.unwrap_or(true);
    let account_enabled = entry.enabled.unwrap_or(true);

    ResolvedGoogleChatAccount {
        account_id,
        name: merged.name.filter(|n| !n.trim().is_empty()),
        enabled: provider_enabled && account_enabled,
        project_id: merged.project_id.unwrap_or_default().trim().to_string(),
        subscription: merged.subscription.unwrap_or_default().trim().to_string(),
        credentials_path: merged.credentials_path,
        dm_policy: merged.dm_policy.unwrap_or(AccessPolicy::Pairing),
        allow_from: merged.allow_from.unwrap_or_default(),
        group_policy: merged.group_policy.unwrap_or(AccessPolicy::Disabled),
        group_allow_from: merged.group_allow_from.unwrap_or_default(),
        history_limit: merged.history_limit,
        dm_history_limit: merged.dm_history_limit,
        text_chunk_limit: merged
            .text_chunk_limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_TEXT_CHUNK_LIMIT),
        message_prefix: merged.message_prefix.filter(|p| !p.is_empty()),
        pull_max_messages: merged
            .pull_max_messages
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PULL_MAX_MESSAGES),
        webhook_secret: merged.webhook_secret,
    }
}

/// All enabled accounts, in [`list_account_ids`] order.
pub fn list_enabled_accounts(config: &GoogleChatConfig) -> Vec<ResolvedGoogleChatAccount> {
    list_account_ids(config)
        .iter()
        .map(|id| resolve_account(config, Some(id)))
        .filter(|account| account.enabled)
        .collect()
}

/// Where an account's credentials come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsSource {
    Config,
    Environment,
    None,
}

/// Status-reporting view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountDescription {
    pub account_id: String,
    pub name: Option<String>,
    pub enabled: bool,
    pub configured: bool,
    pub credentials_source: CredentialsSource,
    pub subscription_path: Option<String>,
}

pub fn describe_account(account: &ResolvedGoogleChatAccount) -> AccountDescription {
    let has_config_path = account
        .credentials_path
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());
    let credentials_source = if has_config_path {
        CredentialsSource::Config
    } else if account.credentials_ref().is_some() {
        CredentialsSource::Environment
    } else {
        CredentialsSource::None
    };
    let configured = account.is_configured();
    AccountDescription {
        account_id: account.account_id.clone(),
        name: account.name.clone(),
        enabled: account.enabled,
        configured,
        credentials_source,
        subscription_path: configured.then(|| account.subscription_path()),
    }
}

/// DM policy details used by the host when prompting an unknown sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DmPolicySummary {
    pub policy: AccessPolicy,
    /// Normalized allowlist entries.
    pub allow_from: Vec<String>,
    /// Config key path (relative to the provider section) holding the policy.
    pub policy_path: String,
    /// Config key path holding the allowlist.
    pub allow_from_path: String,
    pub approve_hint: String,
}

pub fn resolve_dm_policy(config: &GoogleChatConfig, account_id: Option<&str>) -> DmPolicySummary {
    let account = resolve_account(config, account_id);
    let entry = account_entry(config, &account.account_id);
    let key_path = |field: &str, set_on_entry: bool| {
        if set_on_entry {
            format!("accounts.{}.{field}", account.account_id)
        } else {
            field.to_string()
        }
    };
    let policy_path = key_path("dm_policy", entry.is_some_and(|e| e.dm_policy.is_some()));
    let allow_from_path = key_path("allow_from", entry.is_some_and(|e| e.allow_from.is_some()));
    let approve_hint = match account.dm_policy {
        AccessPolicy::Pairing => {
            "Approve the sender's pairing request to let them message this bot.".to_string()
        },
        _ => format!("Add the sender's email to `{allow_from_path}` to let them message this bot."),
    };

    DmPolicySummary {
        policy: account.dm_policy,
        allow_from: account
            .allow_from
            .iter()
            .map(|entry| normalize_allow_entry(entry))
            .filter(|entry| !entry.is_empty())
            .collect(),
        policy_path,
        allow_from_path,
        approve_hint,
    }
}
