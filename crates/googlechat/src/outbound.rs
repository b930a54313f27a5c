use std::sync::{Arc, RwLock};

use {
    async_trait::async_trait,
    chatrelay_channels::{ChannelOutbound, SendReceipt},
    chatrelay_common::ReplyPayload,
    serde_json::json,
    tracing::debug,
};

use crate::{
    Error, Result,
    accounts::{ResolvedGoogleChatAccount, resolve_account},
    client::ClientRegistry,
    config::GoogleChatConfig,
    state::RuntimeRegistry,
};

const TARGET_SCHEME: &str = "googlechat:";
const SPACE_PREFIX: &str = "spaces/";
const MEDIA_CARD_ID: &str = "media";

/// Split `text` into chunks of at most `max_len` bytes.
///
/// Prefers the last newline in the window, then the last space, as long as
/// it lies past half the window; otherwise hard-splits at the window end.
/// Leading whitespace of each following chunk is dropped.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 {
        return Vec::new();
    }

    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut window_end = remaining.floor_char_boundary(max_len);
        if window_end == 0 {
            // A single character wider than the limit still has to go out.
            window_end = remaining
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(remaining.len());
        }

        let window = &remaining[..window_end];
        let half = max_len / 2;
        let split_at = window
            .rfind('\n')
            .filter(|&i| i > half)
            .or_else(|| window.rfind(' ').filter(|&i| i > half))
            .unwrap_or(window_end);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Normalize a caller-supplied destination to a `spaces/...` resource name.
pub fn resolve_target(to: &str) -> Result<String> {
    let trimmed = to.trim();
    let trimmed = trimmed.strip_prefix(TARGET_SCHEME).unwrap_or(trimmed).trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidTarget(
            "a destination space is required".into(),
        ));
    }
    if trimmed.starts_with(SPACE_PREFIX) {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{SPACE_PREFIX}{trimmed}"))
    }
}

fn normalize_thread(thread_id: Option<&str>) -> Option<&str> {
    thread_id.map(str::trim).filter(|t| !t.is_empty())
}

/// `cardsV2` body showing an image, with the caption as a paragraph above it.
pub fn media_card(image_url: &str, caption: Option<&str>) -> serde_json::Value {
    let mut widgets = Vec::new();
    if let Some(caption) = caption {
        widgets.push(json!({ "textParagraph": { "text": caption } }));
    }
    let mut image = json!({ "imageUrl": image_url });
    if let Some(caption) = caption {
        image["altText"] = json!(caption);
    }
    widgets.push(json!({ "image": image }));

    json!({
        "cardsV2": [{
            "cardId": MEDIA_CARD_ID,
            "card": { "sections": [{ "widgets": widgets }] },
        }]
    })
}

/// Outbound sender for Google Chat accounts.
pub struct GoogleChatOutbound {
    pub(crate) config: Arc<RwLock<GoogleChatConfig>>,
    pub(crate) clients: Arc<ClientRegistry>,
    pub(crate) runtime: RuntimeRegistry,
}

impl GoogleChatOutbound {
    fn account(&self, account_id: &str) -> ResolvedGoogleChatAccount {
        let config = self.config.read().unwrap_or_else(|e| e.into_inner());
        resolve_account(&config, Some(account_id))
    }

    async fn post(
        &self,
        account: &ResolvedGoogleChatAccount,
        space: &str,
        body: serde_json::Value,
        thread: Option<&str>,
    ) -> Result<SendReceipt> {
        let client = self.clients.client_for(account)?;
        let created = client.create_message(space, body, thread).await?;
        self.runtime
            .get_or_create(&account.account_id)
            .record_outbound();
        Ok(SendReceipt {
            message_id: created.name,
            chat_id: space.to_string(),
        })
    }

    async fn send_text_inner(
        &self,
        account_id: &str,
        to: &str,
        text: &str,
        thread_id: Option<&str>,
    ) -> Result<SendReceipt> {
        let space = resolve_target(to)?;
        let account = self.account(account_id);
        let thread = normalize_thread(thread_id);

        let mut full = account.message_prefix.clone().unwrap_or_default();
        full.push_str(text);
        if full.trim().is_empty() {
            return Err(chatrelay_channels::Error::invalid_input("message text is empty").into());
        }

        let chunks = chunk_text(&full, account.text_chunk_limit);
        let total = chunks.len();
        let mut receipt = None;
        for (index, chunk) in chunks.into_iter().enumerate() {
            debug!(
                account_id = %account.account_id,
                space = %space,
                chunk = index + 1,
                total,
                "sending google chat text"
            );
            receipt = Some(
                self.post(&account, &space, json!({ "text": chunk }), thread)
                    .await?,
            );
        }
        receipt.ok_or_else(|| Error::message("no chunks were produced"))
    }

    async fn send_media_inner(
        &self,
        account_id: &str,
        to: &str,
        payload: &ReplyPayload,
        thread_id: Option<&str>,
    ) -> Result<SendReceipt> {
        let Some(media) = payload.media.as_ref() else {
            return self
                .send_text_inner(account_id, to, &payload.text, thread_id)
                .await;
        };

        // Cards only reference hosted images; inline data cannot be shown.
        if media.url.starts_with("data:") {
            let mut text = payload.text.clone();
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str("[media omitted: Google Chat cards require a hosted image URL]");
            return self
                .send_text_inner(account_id, to, &text, thread_id)
                .await;
        }

        let space = resolve_target(to)?;
        let account = self.account(account_id);
        debug!(account_id = %account.account_id, space = %space, "sending google chat media card");
        self.post(
            &account,
            &space,
            media_card(&media.url, payload.caption()),
            normalize_thread(thread_id),
        )
        .await
    }
}

#[async_trait]
impl ChannelOutbound for GoogleChatOutbound {
    async fn send_text(
        &self,
        account_id: &str,
        to: &str,
        text: &str,
        thread_id: Option<&str>,
    ) -> chatrelay_channels::Result<SendReceipt> {
        Ok(self
            .send_text_inner(account_id, to, text, thread_id)
            .await?)
    }

    async fn send_media(
        &self,
        account_id: &str,
        to: &str,
        payload: &ReplyPayload,
        thread_id: Option<&str>,
    ) -> chatrelay_channels::Result<SendReceipt> {
        Ok(self
            .send_media_inner(account_id, to, payload, thread_id)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{auth::StaticTokenSource, client::ApiEndpoints},
        mockito::Matcher,
        rstest::rstest,
    };

    fn outbound(server_url: &str, config: GoogleChatConfig) -> GoogleChatOutbound {
        GoogleChatOutbound {
            config: Arc::new(RwLock::new(config)),
            clients: Arc::new(ClientRegistry::with_token_source(
                ApiEndpoints::single(server_url),
                Arc::new(StaticTokenSource::new("tok")),
            )),
            runtime: RuntimeRegistry::default(),
        }
    }

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(chunk_text("hello", 4000), vec!["hello"]);
        assert_eq!(chunk_text("", 4000), vec![""]);
        let exact = "x".repeat(4000);
        assert_eq!(chunk_text(&exact, 4000), vec![exact.clone()]);
    }

    #[test]
    fn zero_limit_yields_nothing() {
        assert!(chunk_text("hello", 0).is_empty());
    }

    #[test]
    fn leading_lines_stay_in_first_chunk() {
        let text = format!("line one\nline two\n{}", "x".repeat(5000));
        let chunks = chunk_text(&text, 4000);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("line one\nline two\n"));
        assert!(chunks.iter().all(|c| c.len() <= 4000));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn splits_at_last_newline_past_half() {
        let text = format!("{}\n{}", "a".repeat(30), "b".repeat(30));
        let chunks = chunk_text(&text, 40);
        assert_eq!(chunks, vec!["a".repeat(30), "b".repeat(30)]);
    }

    #[test]
    fn falls_back_to_space_when_newline_too_early() {
        let text = format!("ab\n{} {}", "c".repeat(30), "d".repeat(20));
        let chunks = chunk_text(&text, 40);
        assert_eq!(chunks[0], format!("ab\n{}", "c".repeat(30)));
        assert_eq!(chunks[1], "d".repeat(20));
    }

    #[test]
    fn hard_splits_without_separators() {
        let text = "x".repeat(95);
        let chunks = chunk_text(&text, 40);
        assert_eq!(
            chunks.iter().map(String::len).collect::<Vec<_>>(),
            vec![40, 40, 15]
        );
    }

    #[test]
    fn never_splits_inside_a_character() {
        let text = format!("{}лz", "a".repeat(39));
        let chunks = chunk_text(&text, 40);
        assert_eq!(chunks, vec!["a".repeat(39), "лz".to_string()]);
    }

    #[rstest]
    #[case(10)]
    #[case(37)]
    #[case(100)]
    fn every_chunk_respects_limit(#[case] limit: usize) {
        let text = "The quick brown fox\njumps over the lazy dog. ".repeat(20);
        let chunks = chunk_text(&text, limit);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= limit));
        let original: String = text.split_whitespace().collect();
        let rejoined: String = chunks.concat().split_whitespace().collect();
        assert_eq!(rejoined, original);
    }

    #[rstest]
    #[case("AAA", "spaces/AAA")]
    #[case("  spaces/AAA ", "spaces/AAA")]
    #[case("googlechat:spaces/AAA", "spaces/AAA")]
    #[case("googlechat:AAA", "spaces/AAA")]
    fn targets_normalize(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(resolve_target(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("googlechat:")]
    fn empty_target_is_invalid(#[case] raw: &str) {
        assert!(matches!(resolve_target(raw), Err(Error::InvalidTarget(_))));
    }

    #[test]
    fn media_card_puts_caption_above_image() {
        let card = media_card("https://img/x.png", Some("Look"));
        let widgets = &card["cardsV2"][0]["card"]["sections"][0]["widgets"];
        assert_eq!(widgets[0]["textParagraph"]["text"], "Look");
        assert_eq!(widgets[1]["image"]["imageUrl"], "https://img/x.png");

        let bare = media_card("https://img/x.png", None);
        let widgets = &bare["cardsV2"][0]["card"]["sections"][0]["widgets"];
        assert_eq!(widgets.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_target_fails_before_any_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let out = outbound(&server.url(), GoogleChatConfig::default());
        let err = out.send_text("default", "  ", "hi", None).await.unwrap_err();
        assert!(err.is_invalid_input());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_text_chunks_into_thread_with_prefix() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", "/v1/spaces/AAA/messages")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "text": format!("[bot] {}", "a".repeat(14)),
                "thread": {"name": "spaces/AAA/threads/T"}
            })))
            .with_status(200)
            .with_body(r#"{"name":"spaces/AAA/messages/1"}"#)
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/v1/spaces/AAA/messages")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({
                "text": "b".repeat(10),
                "thread": {"name": "spaces/AAA/threads/T"}
            })))
            .with_status(200)
            .with_body(r#"{"name":"spaces/AAA/messages/2"}"#)
            .expect(1)
            .create_async()
            .await;

        let mut config = GoogleChatConfig::default();
        config.base.credentials_path = Some("/unused.json".into());
        config.base.message_prefix = Some("[bot] ".into());
        config.base.text_chunk_limit = Some(20);
        let out = outbound(&server.url(), config);

        let text = format!("{}\n{}", "a".repeat(14), "b".repeat(10));
        let receipt = out
            .send_text("default", "AAA", &text, Some("spaces/AAA/threads/T"))
            .await
            .unwrap();
        assert_eq!(receipt.message_id, "spaces/AAA/messages/2");
        assert_eq!(receipt.chat_id, "spaces/AAA");
        first.assert_async().await;
        second.assert_async().await;

        let snapshot = out
            .runtime
            .get_or_create("default")
            .snapshot("default", true);
        assert!(snapshot.last_outbound_at.is_some());
    }

    #[tokio::test]
    async fn send_media_posts_card() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/spaces/AAA/messages")
            .match_body(Matcher::PartialJson(json!({
                "cardsV2": [{"cardId": "media"}]
            })))
            .with_status(200)
            .with_body(r#"{"name":"spaces/AAA/messages/9"}"#)
            .create_async()
            .await;

        let mut config = GoogleChatConfig::default();
        config.base.credentials_path = Some("/unused.json".into());
        let out = outbound(&server.url(), config);
        let payload = ReplyPayload::media("https://img/x.png", Some("Look".into()));
        let receipt = out
            .send_media("default", "spaces/AAA", &payload, None)
            .await
            .unwrap();
        assert_eq!(receipt.message_id, "spaces/AAA/messages/9");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn media_payload_without_media_is_sent_as_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/spaces/AAA/messages")
            .match_body(Matcher::Json(json!({"text": "just words"})))
            .with_status(200)
            .with_body(r#"{"name":"spaces/AAA/messages/3"}"#)
            .create_async()
            .await;

        let mut config = GoogleChatConfig::default();
        config.base.credentials_path = Some("/unused.json".into());
        let out = outbound(&server.url(), config);
        let receipt = out
            .send_media("default", "AAA", &ReplyPayload::text("just words"), None)
            .await
            .unwrap();
        assert_eq!(receipt.message_id, "spaces/AAA/messages/3");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_failure_names_provider() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/spaces/AAA/messages")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let mut config = GoogleChatConfig::default();
        config.base.credentials_path = Some("/unused.json".into());
        let out = outbound(&server.url(), config);
        let err = out.send_text("default", "AAA", "hi", None).await.unwrap_err();
        assert_eq!(err.provider(), Some("googlechat"));
        assert!(!err.is_invalid_input());
    }
}
