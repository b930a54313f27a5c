use thiserror::Error;

use crate::CHANNEL_ID;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid pub/sub payload encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Channel(#[from] chatrelay_channels::Error),

    /// The host failed to accept an admitted message.
    #[error(transparent)]
    Dispatch(#[from] anyhow::Error),

    /// Account is missing the identifiers a transport needs.
    #[error("google chat account '{account_id}' is not configured: {reason}")]
    NotConfigured { account_id: String, reason: String },

    /// Outbound destination failed validation.
    #[error("invalid google chat target: {0}")]
    InvalidTarget(String),

    /// Google API answered with a non-success status.
    #[error("google api request failed ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn not_configured(account_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            account_id: account_id.into(),
            reason: reason.into(),
        }
    }
}

impl From<Error> for chatrelay_channels::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidTarget(message) => Self::invalid_input(message),
            Error::Channel(inner) => inner,
            other => Self::delivery(CHANNEL_ID, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_target_maps_to_invalid_input() {
        let err: chatrelay_channels::Error = Error::InvalidTarget("empty".into()).into();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn api_failure_maps_to_delivery_with_provider() {
        let err: chatrelay_channels::Error = Error::Api {
            status: 403,
            body: "forbidden".into(),
        }
        .into();
        assert_eq!(err.provider(), Some("googlechat"));
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn not_configured_names_account() {
        let err = Error::not_configured("work", "project id is empty");
        assert_eq!(
            err.to_string(),
            "google chat account 'work' is not configured: project id is empty"
        );
    }
}
