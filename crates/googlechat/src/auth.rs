//! OAuth access tokens for Google APIs.
//!
//! Service-account keys are exchanged for bearer tokens with the JWT bearer
//! grant. Tokens are cached until shortly before they expire.

use std::{
    path::Path,
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    jsonwebtoken::{Algorithm, EncodingKey, Header},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{Error, Result};

/// Scope for posting messages as the Chat app.
pub const CHAT_BOT_SCOPE: &str = "https://www.googleapis.com/auth/chat.bot";
/// Scope for pulling and acknowledging Pub/Sub messages.
pub const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_TTL_SECS: i64 = 3600;

/// Produces bearer tokens for Google API calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<Secret<String>>;
}

/// Fixed token, for emulators and tests.
pub struct StaticTokenSource {
    token: Secret<String>,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token.into()),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<Secret<String>> {
        Ok(self.token.clone())
    }
}

/// The fields of a service-account JSON key this crate uses.
#[derive(Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    private_key: Secret<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Clone)]
struct CachedAccessToken {
    token: Secret<String>,
    expires_at: Instant,
}

impl CachedAccessToken {
    fn is_valid(&self) -> bool {
        let refresh_skew = Duration::from_secs(60);
        self.expires_at > Instant::now() + refresh_skew
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Service-account token source with an in-memory token cache.
pub struct ServiceAccountTokenSource {
    http: reqwest::Client,
    client_email: String,
    token_uri: String,
    scopes: String,
    signing_key: EncodingKey,
    cache: tokio::sync::Mutex<Option<CachedAccessToken>>,
}

impl ServiceAccountTokenSource {
    pub fn from_file(http: reqwest::Client, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::external(
                format!("failed to read credentials file {}", path.display()),
                e,
            )
        })?;
        Self::from_json(http, &json)
    }

    pub fn from_json(http: reqwest::Client, json: &str) -> Result<Self> {
        let key: ServiceAccountKey = serde_json::from_str(json)?;
        Self::from_key(http, key)
    }

    pub fn from_key(http: reqwest::Client, key: ServiceAccountKey) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.expose_secret().as_bytes())?;
        Ok(Self {
            http,
            client_email: key.client_email,
            token_uri: key
                .token_uri
                .filter(|uri| !uri.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            scopes: [CHAT_BOT_SCOPE, PUBSUB_SCOPE].join(" "),
            signing_key,
            cache: tokio::sync::Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    fn signed_assertion(&self) -> Result<String> {
        let iat = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: &self.scopes,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_TTL_SECS,
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.signing_key,
        )?)
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<Secret<String>> {
        let mut guard = self.cache.lock().await;
        if let Some(token) = guard.as_ref()
            && token.is_valid()
        {
            return Ok(token.token.clone());
        }

        let assertion = self.signed_assertion()?;
        let form = [
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", assertion.as_str()),
        ];
        let resp = self.http.post(&self.token_uri).form(&form).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }

        let body: TokenResponse = resp.json().await?;
        let ttl = body.expires_in.unwrap_or(3600).max(120);
        debug!(client_email = %self.client_email, ttl, "refreshed google access token");
        let cached = CachedAccessToken {
            token: Secret::new(body.access_token),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        };
        let token = cached.token.clone();
        *guard = Some(cached);
        Ok(token)
    }
}
