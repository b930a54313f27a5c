use serde::{Deserialize, Serialize};

/// Access policy applied to one conversation scope (direct or group).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccessPolicy {
    /// Every message is denied.
    Disabled,
    /// Every message is admitted.
    Open,
    /// Only identities on the allowlist are admitted.
    Allowlist,
    /// Only senders approved through the pairing workflow are admitted.
    Pairing,
}

impl AccessPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Open => "open",
            Self::Allowlist => "allowlist",
            Self::Pairing => "pairing",
        }
    }
}

impl std::fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check whether `candidate` matches any allowlist entry.
///
/// Entries are compared case-insensitively after trimming and may use `*`
/// as a wildcard for any sequence of characters. An empty allowlist matches
/// nothing: an explicit allowlist policy with no entries denies everyone.
pub fn matches_allowlist(candidate: &str, allowlist: &[String]) -> bool {
    let candidate = candidate.trim().to_lowercase();
    if candidate.is_empty() {
        return false;
    }
    allowlist.iter().any(|entry| {
        let pat = entry.trim().to_lowercase();
        if pat.is_empty() {
            false
        } else if pat.contains('*') {
            glob_match(&pat, &candidate)
        } else {
            pat == candidate
        }
    })
}

/// Simple glob matching supporting `*` as a wildcard for any sequence of chars.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(idx) => {
                // First segment is anchored at the start.
                if i == 0 && idx != 0 {
                    return false;
                }
                pos += idx + part.len();
            },
            None => return false,
        }
    }
    // Last segment is anchored at the end unless the pattern ends with `*`.
    match parts.last() {
        Some(last) if !last.is_empty() => text.ends_with(last),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn empty_allowlist_denies_everyone() {
        assert!(!matches_allowlist("anyone", &[]));
    }

    #[test]
    fn blank_candidate_never_matches() {
        let list = vec!["*".to_string()];
        assert!(!matches_allowlist("  ", &list));
    }

    #[rstest]
    #[case("a@x.com", true)]
    #[case("A@X.com", true)]
    #[case(" a@x.com ", true)]
    #[case("b@x.com", false)]
    fn exact_match_is_case_insensitive(#[case] candidate: &str, #[case] expected: bool) {
        let list = vec!["a@x.com".to_string()];
        assert_eq!(matches_allowlist(candidate, &list), expected);
    }

    #[rstest]
    #[case("*@example.com", "user@example.com", true)]
    #[case("*@example.com", "user@other.com", false)]
    #[case("admin_*", "admin_alice", true)]
    #[case("admin_*", "user_bob", false)]
    #[case("user_*_admin", "user_123_admin", true)]
    #[case("user_*_admin", "user_123_mod", false)]
    fn glob_patterns(#[case] pattern: &str, #[case] candidate: &str, #[case] expected: bool) {
        let list = vec![pattern.to_string()];
        assert_eq!(matches_allowlist(candidate, &list), expected);
    }

    #[test]
    fn policy_round_trips_lowercase() {
        let parsed: AccessPolicy = serde_json::from_str("\"pairing\"").unwrap();
        assert_eq!(parsed, AccessPolicy::Pairing);
        assert_eq!(AccessPolicy::Allowlist.to_string(), "allowlist");
    }
}
