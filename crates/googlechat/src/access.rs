use chatrelay_channels::{
    ChannelMessage,
    gating::{AccessPolicy, matches_allowlist},
    pairing::PairingLookup,
};

use crate::{CHANNEL_ID, accounts::ResolvedGoogleChatAccount};

/// Determine if an inbound message should reach the agent.
///
/// Returns `Ok(())` if the message is allowed, or `Err(reason)` if it should
/// be silently dropped. Depends only on its arguments.
pub fn check_access(
    account: &ResolvedGoogleChatAccount,
    message: &ChannelMessage,
    pairing: Option<&dyn PairingLookup>,
) -> Result<(), AccessDenied> {
    if message.is_direct() {
        check_dm_access(account, message, pairing)
    } else {
        check_group_access(account, message)
    }
}

fn check_dm_access(
    account: &ResolvedGoogleChatAccount,
    message: &ChannelMessage,
    pairing: Option<&dyn PairingLookup>,
) -> Result<(), AccessDenied> {
    match account.dm_policy {
        AccessPolicy::Disabled => Err(AccessDenied::DmsDisabled),
        AccessPolicy::Open => Ok(()),
        AccessPolicy::Allowlist => {
            let allowlist = normalized(&account.allow_from);
            let sender = &message.sender;
            let email_allowed = sender
                .email
                .as_deref()
                .is_some_and(|email| matches_allowlist(email, &allowlist));
            if email_allowed || matches_allowlist(&sender.id, &allowlist) {
                Ok(())
            } else {
                Err(AccessDenied::NotOnAllowlist)
            }
        },
        // Without a pairing store there is nobody to approve the sender.
        AccessPolicy::Pairing => match pairing {
            Some(lookup) if lookup.is_approved(CHANNEL_ID, &account.account_id, &message.sender) => {
                Ok(())
            },
            _ => Err(AccessDenied::PairingRequired),
        },
    }
}

fn check_group_access(
    account: &ResolvedGoogleChatAccount,
    message: &ChannelMessage,
) -> Result<(), AccessDenied> {
    match account.group_policy {
        AccessPolicy::Disabled => Err(AccessDenied::GroupsDisabled),
        AccessPolicy::Open => Ok(()),
        AccessPolicy::Allowlist => {
            if matches_allowlist(&message.chat.id, &normalized(&account.group_allow_from)) {
                Ok(())
            } else {
                Err(AccessDenied::SpaceNotOnAllowlist)
            }
        },
        // Spaces have no pairing flow.
        AccessPolicy::Pairing => Err(AccessDenied::PairingRequired),
    }
}

fn normalized(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| normalize_allow_entry(entry))
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Canonical form of an allowlist entry: trimmed, lower-cased, without the
/// `googlechat:` scheme or `users/` / `spaces/` resource prefix.
pub fn normalize_allow_entry(entry: &str) -> String {
    let mut entry = entry.trim().to_lowercase();
    for prefix in ["googlechat:", "users:", "users/", "spaces/"] {
        if let Some(rest) = entry.strip_prefix(prefix) {
            entry = rest.trim().to_string();
        }
    }
    entry
}

/// Reason an inbound message was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    DmsDisabled,
    NotOnAllowlist,
    GroupsDisabled,
    SpaceNotOnAllowlist,
    PairingRequired,
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DmsDisabled => write!(f, "DMs are disabled"),
            Self::NotOnAllowlist => write!(f, "user not on allowlist"),
            Self::GroupsDisabled => write!(f, "spaces are disabled"),
            Self::SpaceNotOnAllowlist => write!(f, "space not on allowlist"),
            Self::PairingRequired => write!(f, "sender has not been approved"),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{accounts::resolve_account, config::GoogleChatConfig},
        chatrelay_channels::{ChannelChat, ChannelSender, pairing::ApprovedSenders},
        chatrelay_common::ChatType,
        rstest::rstest,
    };

    fn account() -> ResolvedGoogleChatAccount {
        resolve_account(&GoogleChatConfig::default(), None)
    }

    fn message(chat_type: ChatType, sender_id: &str, email: Option<&str>) -> ChannelMessage {
        ChannelMessage {
            id: "spaces/S/messages/M".into(),
            timestamp_ms: None,
            sender: ChannelSender {
                id: sender_id.into(),
                display_name: None,
                email: email.map(str::to_string),
            },
            chat: ChannelChat {
                id: "SPACE1".into(),
                display_name: "SPACE1".into(),
                chat_type,
            },
            thread_id: None,
            text: "hi".into(),
            raw: serde_json::Value::Null,
        }
    }

    fn dm(email: &str) -> ChannelMessage {
        message(ChatType::Direct, "1", Some(email))
    }

    #[test]
    fn dm_allowlist_example() {
        let mut acct = account();
        acct.dm_policy = AccessPolicy::Allowlist;
        acct.allow_from = vec!["a@x.com".into()];
        assert!(check_access(&acct, &dm("a@x.com"), None).is_ok());
        assert_eq!(
            check_access(&acct, &dm("b@x.com"), None),
            Err(AccessDenied::NotOnAllowlist)
        );
    }

    #[test]
    fn dm_allowlist_is_case_insensitive_and_trimmed() {
        let mut acct = account();
        acct.dm_policy = AccessPolicy::Allowlist;
        acct.allow_from = vec![" A@X.com ".into()];
        assert!(check_access(&acct, &dm("a@x.COM"), None).is_ok());
    }

    #[test]
    fn dm_allowlist_accepts_prefixed_user_ids() {
        let mut acct = account();
        acct.dm_policy = AccessPolicy::Allowlist;
        acct.allow_from = vec!["googlechat:users/123".into()];
        assert!(check_access(&acct, &message(ChatType::Direct, "123", None), None).is_ok());
    }

    #[test]
    fn empty_dm_allowlist_denies() {
        let mut acct = account();
        acct.dm_policy = AccessPolicy::Allowlist;
        assert_eq!(
            check_access(&acct, &dm("a@x.com"), None),
            Err(AccessDenied::NotOnAllowlist)
        );
    }

    #[rstest]
    #[case(ChatType::Direct, "1", Some("a@x.com"))]
    #[case(ChatType::Direct, "2", None)]
    #[case(ChatType::Group, "3", Some("c@x.com"))]
    fn disabled_denies_and_open_allows_everything(
        #[case] chat_type: ChatType,
        #[case] sender_id: &str,
        #[case] email: Option<&str>,
    ) {
        let msg = message(chat_type, sender_id, email);
        let mut acct = account();
        acct.dm_policy = AccessPolicy::Disabled;
        acct.group_policy = AccessPolicy::Disabled;
        assert!(check_access(&acct, &msg, None).is_err());

        acct.dm_policy = AccessPolicy::Open;
        acct.group_policy = AccessPolicy::Open;
        assert!(check_access(&acct, &msg, None).is_ok());
    }

    #[test]
    fn default_policies_deny() {
        let acct = account();
        assert_eq!(
            check_access(&acct, &dm("a@x.com"), None),
            Err(AccessDenied::PairingRequired)
        );
        assert_eq!(
            check_access(&acct, &message(ChatType::Group, "1", None), None),
            Err(AccessDenied::GroupsDisabled)
        );
    }

    #[test]
    fn pairing_without_store_denies_even_allowlisted_sender() {
        let mut acct = account();
        acct.allow_from = vec!["a@x.com".into()];
        assert_eq!(
            check_access(&acct, &dm("a@x.com"), None),
            Err(AccessDenied::PairingRequired)
        );
    }

    #[test]
    fn pairing_admits_approved_sender() {
        let approvals = ApprovedSenders::new();
        approvals.approve(CHANNEL_ID, "default", "a@x.com");
        let acct = account();
        assert!(check_access(&acct, &dm("a@x.com"), Some(&approvals)).is_ok());
        assert_eq!(
            check_access(&acct, &dm("b@x.com"), Some(&approvals)),
            Err(AccessDenied::PairingRequired)
        );
    }

    #[test]
    fn group_allowlist_matches_space_id() {
        let mut acct = account();
        acct.group_policy = AccessPolicy::Allowlist;
        acct.group_allow_from = vec!["spaces/SPACE1".into()];
        assert!(check_access(&acct, &message(ChatType::Group, "1", None), None).is_ok());

        acct.group_allow_from = vec!["spaces/OTHER".into()];
        assert_eq!(
            check_access(&acct, &message(ChatType::Group, "1", None), None),
            Err(AccessDenied::SpaceNotOnAllowlist)
        );
    }

    #[test]
    fn dm_policy_does_not_apply_to_spaces() {
        let mut acct = account();
        acct.dm_policy = AccessPolicy::Open;
        assert_eq!(
            check_access(&acct, &message(ChatType::Group, "1", None), None),
            Err(AccessDenied::GroupsDisabled)
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let mut acct = account();
        acct.dm_policy = AccessPolicy::Allowlist;
        acct.allow_from = vec!["a@x.com".into()];
        let msg = dm("a@x.com");
        let first = check_access(&acct, &msg, None);
        for _ in 0..10 {
            assert_eq!(check_access(&acct, &msg, None), first);
        }
    }

    #[rstest]
    #[case("  Users/ABC ", "abc")]
    #[case("googlechat:users/123", "123")]
    #[case("spaces/AAA", "aaa")]
    #[case("a@x.com", "a@x.com")]
    fn allow_entries_normalize(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_allow_entry(raw), expected);
    }
}
