//! HTTP push transport.
//!
//! `POST /webhook/googlechat` accepts Chat events (or Pub/Sub push envelopes
//! wrapping them) and answers inline; `GET /health` is a liveness probe.

use std::{sync::Arc, time::Duration};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::{Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    secrecy::ExposeSecret,
    serde::Deserialize,
    tracing::{error, warn},
};

use crate::{
    CHANNEL_ID, Result,
    normalize::{WebhookEvent, parse_webhook_body},
    plugin::GoogleChatPlugin,
};

/// Default budget per delivery. Google Chat gives up on synchronous replies
/// after 30 seconds.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

pub const WEBHOOK_PATH: &str = "/webhook/googlechat";

#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

/// Routes for the push transport.
pub fn router(plugin: Arc<GoogleChatPlugin>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(WEBHOOK_PATH, post(webhook_handler))
        .with_state(plugin)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true, "provider": CHANNEL_ID }))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn webhook_handler(
    State(plugin): State<Arc<GoogleChatPlugin>>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Response {
    let account = match plugin.resolve_known_account(query.account.as_deref()) {
        Ok(account) => account,
        Err(e) => {
            warn!(error = %e, "rejected google chat webhook");
            return error_response(StatusCode::NOT_FOUND, "not found");
        },
    };

    if let Some(expected) = account
        .webhook_secret
        .as_ref()
        .map(ExposeSecret::expose_secret)
        .filter(|s| !s.is_empty())
        && query.secret.as_deref() != Some(expected.as_str())
    {
        warn!(account_id = %account.account_id, "rejected google chat webhook: bad secret");
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    if !account.enabled {
        return error_response(StatusCode::FORBIDDEN, "account disabled");
    }

    let timeout = plugin.webhook_timeout();
    let work = handle_event(&plugin, &account.account_id, &body);
    match tokio::time::timeout(timeout, work).await {
        Ok(Ok(reply)) => Json(reply).into_response(),
        Ok(Err(e)) => {
            error!(account_id = %account.account_id, error = %e, "google chat webhook failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        },
        Err(_) => {
            error!(
                account_id = %account.account_id,
                ?timeout,
                "google chat webhook timed out"
            );
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        },
    }
}

/// Process one delivery and build the inline reply body.
async fn handle_event(
    plugin: &GoogleChatPlugin,
    account_id: &str,
    body: &[u8],
) -> Result<serde_json::Value> {
    match parse_webhook_body(body)? {
        WebhookEvent::AddedToSpace { welcome } => Ok(serde_json::json!({ "text": welcome })),
        WebhookEvent::Message(message) => {
            plugin.pipeline(account_id).handle_message(message).await?;
            Ok(serde_json::json!({}))
        },
        WebhookEvent::Ignored => Ok(serde_json::json!({})),
    }
}
