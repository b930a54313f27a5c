use std::error::Error as StdError;

/// Crate-wide result type for channel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed channel errors shared across channel traits.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid. Raised before any network call.
    #[error("invalid channel input: {message}")]
    InvalidInput { message: String },

    /// A requested account ID is not known to the provider.
    #[error("unknown channel account: {account_id}")]
    UnknownAccount { account_id: String },

    /// Operation is currently unavailable (not configured/ready).
    #[error("channel operation unavailable: {message}")]
    Unavailable { message: String },

    /// The provider backend rejected or failed a delivery.
    #[error("{provider} delivery failed: {source}")]
    Delivery {
        provider: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unknown_account(account_id: impl std::fmt::Display) -> Self {
        Self::UnknownAccount {
            account_id: account_id.to_string(),
        }
    }

    #[must_use]
    pub fn delivery(
        provider: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Delivery {
            provider: provider.into(),
            source: Box::new(source),
        }
    }

    /// True when the failure was caught by input validation, before any
    /// request left the process.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }

    /// Provider name attached to a delivery failure.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Delivery { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_error_carries_provider() {
        let err = Error::delivery("googlechat", std::io::Error::other("boom"));
        assert_eq!(err.provider(), Some("googlechat"));
        assert!(!err.is_invalid_input());
        assert_eq!(err.to_string(), "googlechat delivery failed: boom");
    }

    #[test]
    fn unknown_account_and_unavailable_render_their_context() {
        assert_eq!(
            Error::unknown_account("bogus").to_string(),
            "unknown channel account: bogus"
        );
        let err = Error::unavailable("account 'work' is disabled");
        assert!(matches!(err, Error::Unavailable { .. }));
        assert_eq!(err.provider(), None);
    }

    #[test]
    fn invalid_input_is_distinguishable() {
        let err = Error::invalid_input("target is required");
        assert!(err.is_invalid_input());
        assert_eq!(err.provider(), None);
    }
}
