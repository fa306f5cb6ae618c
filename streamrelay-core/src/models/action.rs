//! Chat action model
//!
//! Upstream actions arrive as JSON objects where the first non-tracking key
//! names the action variant, and the nested `item` object repeats the same
//! convention for the renderer kind. Unrecognized tags are valid: they decode
//! to `Unknown` and keep flowing instead of failing the round.

use serde_json::Value;

/// One raw upstream chat action plus typed views over it.
///
/// The raw tree is retained because the passthrough format re-emits it
/// verbatim and identity extraction walks it structurally.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatAction {
    raw: Value,
}

/// Action kind, named by the sole non-tracking top-level key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    AddChatItem,
    RemoveChatItem,
    ReplaceChat,
    AddTickerItem,
    Unknown,
}

impl ActionKind {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "addChatItemAction" => Self::AddChatItem,
            "removeChatItemAction" | "markChatItemAsDeletedAction" => Self::RemoveChatItem,
            "replaceChatItemAction" => Self::ReplaceChat,
            "addLiveChatTickerItemAction" => Self::AddTickerItem,
            _ => Self::Unknown,
        }
    }
}

/// Renderer kind carried in the action's `item`, typed for the adapters
#[derive(Debug, Clone, PartialEq)]
pub enum ChatItem {
    TextMessage {
        id: Option<String>,
        author: String,
        text: String,
    },
    PaidMessage {
        id: Option<String>,
        author: String,
        text: String,
        amount: String,
    },
    Membership {
        id: Option<String>,
        author: String,
        text: String,
    },
    Unknown,
}

/// Tracking metadata key stripped before the sole-key walk
const TRACKING_KEY: &str = "clickTrackingParams";

impl ChatAction {
    #[must_use]
    pub const fn new(raw: Value) -> Self {
        Self { raw }
    }

    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.raw
    }

    /// The sole non-tracking top-level key, if the action has that shape.
    fn tag(&self) -> Option<&str> {
        let obj = self.raw.as_object()?;
        let mut keys = obj.keys().filter(|k| k.as_str() != TRACKING_KEY);
        let tag = keys.next()?;
        if keys.next().is_some() {
            return None;
        }
        Some(tag)
    }

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.tag().map_or(ActionKind::Unknown, ActionKind::from_tag)
    }

    /// The renderer object inside the action's `item`, with its tag.
    fn renderer(&self) -> Option<(&str, &Value)> {
        let tag = self.tag()?;
        let item = self.raw.get(tag)?.get("item")?.as_object()?;
        let mut keys = item.keys();
        let renderer_tag = keys.next()?;
        if keys.next().is_some() {
            return None;
        }
        Some((renderer_tag.as_str(), &item[renderer_tag]))
    }

    /// Derive the message identity for dedup.
    ///
    /// Any structural miss yields `None`: such actions bypass the dedup cache
    /// and are always broadcast.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        let (_, renderer) = self.renderer()?;
        renderer.get("id")?.as_str().map(str::to_string)
    }

    /// Typed view of the renderer for format transforms.
    #[must_use]
    pub fn item(&self) -> ChatItem {
        let Some((tag, renderer)) = self.renderer() else {
            return ChatItem::Unknown;
        };

        let id = renderer
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);

        match tag {
            "liveChatTextMessageRenderer" => ChatItem::TextMessage {
                id,
                author: author_name(renderer),
                text: message_text(renderer),
            },
            "liveChatPaidMessageRenderer" | "liveChatPaidStickerRenderer" => {
                ChatItem::PaidMessage {
                    id,
                    author: author_name(renderer),
                    text: message_text(renderer),
                    amount: renderer
                        .get("purchaseAmountText")
                        .and_then(|t| t.get("simpleText"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                }
            }
            "liveChatMembershipItemRenderer" => ChatItem::Membership {
                id,
                author: author_name(renderer),
                text: header_or_message_text(renderer),
            },
            _ => ChatItem::Unknown,
        }
    }
}

impl From<Value> for ChatAction {
    fn from(raw: Value) -> Self {
        Self::new(raw)
    }
}

fn author_name(renderer: &Value) -> String {
    renderer
        .get("authorName")
        .and_then(|n| n.get("simpleText"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

/// Flatten a `message.runs` list to plain text; emoji runs render as their
/// first shortcut (falling back to the emoji id).
fn message_text(renderer: &Value) -> String {
    runs_text(renderer.get("message"))
}

fn header_or_message_text(renderer: &Value) -> String {
    let header = runs_text(renderer.get("headerSubtext"));
    if header.is_empty() {
        message_text(renderer)
    } else {
        header
    }
}

fn runs_text(message: Option<&Value>) -> String {
    let Some(runs) = message.and_then(|m| m.get("runs")).and_then(Value::as_array) else {
        return String::new();
    };

    let mut out = String::new();
    for run in runs {
        if let Some(text) = run.get("text").and_then(Value::as_str) {
            out.push_str(text);
        } else if let Some(emoji) = run.get("emoji") {
            let shortcut = emoji
                .get("shortcuts")
                .and_then(Value::as_array)
                .and_then(|s| s.first())
                .and_then(Value::as_str)
                .or_else(|| emoji.get("emojiId").and_then(Value::as_str));
            if let Some(shortcut) = shortcut {
                out.push_str(shortcut);
            }
        }
    }
    out
}
