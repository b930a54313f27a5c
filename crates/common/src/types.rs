use serde::{Deserialize, Serialize};

/// Kind of conversation a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// One-to-one conversation between a user and the bot.
    Direct,
    /// Shared space with several members.
    Group,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct)
    }
}

impl std::fmt::Display for ChatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media reference attached to an outbound reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Body of an outbound reply: text, media, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPayload {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaAttachment>,
}

impl ReplyPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: None,
        }
    }

    pub fn media(url: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            text: caption.unwrap_or_default(),
            media: Some(MediaAttachment {
                url: url.into(),
                mime_type: None,
            }),
        }
    }

    /// Caption text, if any non-blank text accompanies the media.
    pub fn caption(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ChatType::Direct).unwrap(),
            "\"direct\""
        );
        let parsed: ChatType = serde_json::from_str("\"group\"").unwrap();
        assert_eq!(parsed, ChatType::Group);
    }

    #[test]
    fn blank_caption_is_none() {
        let payload = ReplyPayload::media("https://example.com/a.png", Some("   ".into()));
        assert_eq!(payload.caption(), None);
        let payload = ReplyPayload::media("https://example.com/a.png", Some(" hi ".into()));
        assert_eq!(payload.caption(), Some("hi"));
    }
}
