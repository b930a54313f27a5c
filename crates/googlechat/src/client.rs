//! REST client for the Chat and Pub/Sub APIs, and the per-adapter cache of
//! authenticated clients.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    secrecy::ExposeSecret,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{
    Error, Result,
    accounts::ResolvedGoogleChatAccount,
    auth::{ServiceAccountTokenSource, TokenSource},
    event::{PullResponse, ReceivedMessage},
};

pub const DEFAULT_CHAT_BASE: &str = "https://chat.googleapis.com";
pub const DEFAULT_PUBSUB_BASE: &str = "https://pubsub.googleapis.com";

/// Reply into the given thread, or start a new one if it no longer exists.
const REPLY_OPTION: &str = "REPLY_MESSAGE_FALLBACK_TO_NEW_THREAD";

/// API base URLs. Overridable for emulators and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub chat_base: String,
    pub pubsub_base: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            chat_base: DEFAULT_CHAT_BASE.to_string(),
            pubsub_base: DEFAULT_PUBSUB_BASE.to_string(),
        }
    }
}

impl ApiEndpoints {
    /// Point both APIs at the same base URL.
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            chat_base: base.clone(),
            pubsub_base: base,
        }
    }
}

/// Resource returned by `spaces.messages.create`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatedMessage {
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeRequest<'a> {
    ack_ids: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyAckDeadlineRequest<'a> {
    ack_ids: &'a [String],
    ack_deadline_seconds: u32,
}

/// Authenticated handle for one account.
pub struct GoogleChatClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    endpoints: ApiEndpoints,
}

impl GoogleChatClient {
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenSource>, endpoints: ApiEndpoints) -> Self {
        Self {
            http,
            tokens,
            endpoints,
        }
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: String,
        body: &T,
    ) -> Result<reqwest::Response> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }
        Ok(resp)
    }

    /// Create a message in `space` (`spaces/...`). With a thread, the message
    /// replies into it.
    pub async fn create_message(
        &self,
        space: &str,
        body: serde_json::Value,
        thread: Option<&str>,
    ) -> Result<CreatedMessage> {
        let mut body = body;
        let mut url = format!(
            "{}/v1/{}/messages",
            self.endpoints.chat_base.trim_end_matches('/'),
            space
        );
        if let Some(thread) = thread
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert("thread".into(), serde_json::json!({ "name": thread }));
            url.push_str("?messageReplyOption=");
            url.push_str(REPLY_OPTION);
        }
        let resp = self.post_json(url, &body).await?;
        Ok(resp.json().await?)
    }

    pub async fn pull(&self, subscription: &str, max_messages: u32) -> Result<Vec<ReceivedMessage>> {
        let url = format!(
            "{}/v1/{}:pull",
            self.endpoints.pubsub_base.trim_end_matches('/'),
            subscription
        );
        let resp = self
            .post_json(url, &PullRequest { max_messages })
            .await?;
        let body: PullResponse = resp.json().await?;
        Ok(body.received_messages)
    }

    pub async fn acknowledge(&self, subscription: &str, ack_ids: &[String]) -> Result<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}/v1/{}:acknowledge",
            self.endpoints.pubsub_base.trim_end_matches('/'),
            subscription
        );
        self.post_json(url, &AcknowledgeRequest { ack_ids }).await?;
        Ok(())
    }

    /// A zero deadline makes Pub/Sub redeliver immediately (negative ack).
    pub async fn modify_ack_deadline(
        &self,
        subscription: &str,
        ack_ids: &[String],
        ack_deadline_seconds: u32,
    ) -> Result<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}/v1/{}:modifyAckDeadline",
            self.endpoints.pubsub_base.trim_end_matches('/'),
            subscription
        );
        self.post_json(url, &ModifyAckDeadlineRequest {
            ack_ids,
            ack_deadline_seconds,
        })
        .await?;
        Ok(())
    }
}

type ClientKey = (String, Option<String>);

/// Authenticated clients keyed by `(account id, credentials reference)`.
///
/// Insert-if-absent; entries live as long as the registry.
pub struct ClientRegistry {
    http: reqwest::Client,
    endpoints: ApiEndpoints,
    token_override: Option<Arc<dyn TokenSource>>,
    clients: Mutex<HashMap<ClientKey, Arc<GoogleChatClient>>>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(ApiEndpoints::default())
    }
}

impl ClientRegistry {
    pub fn new(endpoints: ApiEndpoints) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints,
            token_override: None,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Every client authenticates with `tokens` instead of loading
    /// service-account credentials.
    pub fn with_token_source(endpoints: ApiEndpoints, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            token_override: Some(tokens),
            ..Self::new(endpoints)
        }
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached client for the account, built on first use.
    pub fn client_for(&self, account: &ResolvedGoogleChatAccount) -> Result<Arc<GoogleChatClient>> {
        let credentials = account.credentials_ref();
        let key = (account.account_id.clone(), credentials.clone());
        {
            let clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(client) = clients.get(&key) {
                return Ok(Arc::clone(client));
            }
        }

        // Built outside the lock; a racing insert keeps the first client.
        let tokens: Arc<dyn TokenSource> = match (&self.token_override, credentials) {
            (Some(tokens), _) => Arc::clone(tokens),
            (None, Some(path)) => {
                Arc::new(ServiceAccountTokenSource::from_file(self.http.clone(), path)?)
            },
            (None, None) => {
                return Err(Error::not_configured(
                    &account.account_id,
                    "no credentials: set credentials_path or GOOGLE_APPLICATION_CREDENTIALS",
                ));
            },
        };
        debug!(account_id = %account.account_id, "created google chat client");
        let client = Arc::new(GoogleChatClient::new(
            self.http.clone(),
            tokens,
            self.endpoints.clone(),
        ));

        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(clients.entry(key).or_insert(client)))
    }
}
