//! Output format adapters
//!
//! Each connected client picks a wire format; connections sharing a format
//! are grouped under one adapter instance. A transform maps a chat action to
//! that format's payload, or to `None` when the format has no representation
//! for the action (in which case nothing is sent to its connections).

use std::sync::Arc;

use serde_json::json;

use crate::models::{ChatAction, ChatItem, StreamKey};

/// A wire-format transform. `None` means "this format has no representation
/// for this action".
pub trait Transform: Send + Sync {
    fn transform(&self, action: &ChatAction) -> Option<String>;
}

/// Known output formats, keyed by the `adapter` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Json,
    Irc,
    Webhook,
    Highlight,
}

impl FormatKind {
    /// Parse a client-supplied format name. Unknown or missing names fall
    /// back to the default `json` passthrough.
    #[must_use]
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("irc") => Self::Irc,
            Some("webhook") => Self::Webhook,
            Some("highlight") => Self::Highlight,
            _ => Self::Json,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Irc => "irc",
            Self::Webhook => "webhook",
            Self::Highlight => "highlight",
        }
    }

    /// Build the transform for this format, scoped to one stream.
    #[must_use]
    pub fn build_transform(self, stream_key: &StreamKey) -> Arc<dyn Transform> {
        match self {
            Self::Json => Arc::new(JsonPassthrough),
            Self::Irc => Arc::new(IrcLines {
                channel: stream_key.as_str().to_string(),
            }),
            Self::Webhook => Arc::new(WebhookPayload),
            Self::Highlight => Arc::new(HighlightOnly),
        }
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw action forwarded verbatim as JSON
struct JsonPassthrough;

impl Transform for JsonPassthrough {
    fn transform(&self, action: &ChatAction) -> Option<String> {
        Some(action.raw().to_string())
    }
}

/// IRC-style PRIVMSG lines for text-bearing items
struct IrcLines {
    channel: String,
}

impl Transform for IrcLines {
    fn transform(&self, action: &ChatAction) -> Option<String> {
        let (author, text) = match action.item() {
            ChatItem::TextMessage { author, text, .. } => (author, text),
            ChatItem::PaidMessage {
                author,
                text,
                amount,
                ..
            } => (author, format!("[{amount}] {text}")),
            _ => return None,
        };
        Some(format!(
            ":{author}!{author}@chat PRIVMSG #{} :{text}",
            self.channel
        ))
    }
}

/// Third-party webhook shape: `{username, content}`
struct WebhookPayload;

impl Transform for WebhookPayload {
    fn transform(&self, action: &ChatAction) -> Option<String> {
        let (author, content) = match action.item() {
            ChatItem::TextMessage { author, text, .. } => (author, text),
            ChatItem::PaidMessage {
                author,
                text,
                amount,
                ..
            } => (author, format!("{amount}: {text}")),
            _ => return None,
        };
        Some(
            json!({
                "username": author,
                "content": content,
            })
            .to_string(),
        )
    }
}

/// Filtered format carrying only paid and membership items
struct HighlightOnly;

impl Transform for HighlightOnly {
    fn transform(&self, action: &ChatAction) -> Option<String> {
        match action.item() {
            ChatItem::PaidMessage {
                author,
                text,
                amount,
                ..
            } => Some(
                json!({
                    "kind": "paidMessage",
                    "author": author,
                    "amount": amount,
                    "text": text,
                })
                .to_string(),
            ),
            ChatItem::Membership { author, text, .. } => Some(
                json!({
                    "kind": "membership",
                    "author": author,
                    "text": text,
                })
                .to_string(),
            ),
            _ => None,
        }
    }
}
