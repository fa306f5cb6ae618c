//! Session context resolution
//!
//! The session resolver (external) scrapes the platform page and hands us a
//! JSON payload. Its exact shape varies by resolver generation, so resolution
//! is structural: the API key and client context are looked up under their
//! known spellings, and the initial continuation is found by deep-searching
//! the embedded UI tree for the "Live chat" panel node.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::ContinuationToken;

/// Sentinel channel id when the payload carries no channel navigation node
pub const UNKNOWN_CHANNEL: &str = "unknown";

/// Title of the panel node that carries the initial chat continuation
const LIVE_CHAT_TITLE: &str = "Live chat";

/// Credentials and client configuration for polling one stream's chat.
///
/// Immutable after init except `continuation`, which the relay actor
/// advances each round.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub channel_id: String,
    pub api_key: String,
    pub client_context: Value,
    pub continuation: ContinuationToken,
}

impl SessionContext {
    /// Resolve a session from a raw resolver payload.
    ///
    /// The payload may carry the key/context as separate fields or as one
    /// merged configuration object; all that matters is that an API key, a
    /// client context and a "Live chat" continuation marker are derivable.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let api_key = ["apiKey", "INNERTUBE_API_KEY", "innertubeApiKey"]
            .iter()
            .find_map(|k| find_key(payload, k))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput("session payload has no API key".to_string()))?
            .to_string();

        let client_context = ["clientContext", "INNERTUBE_CONTEXT", "context"]
            .iter()
            .find_map(|k| find_key(payload, k))
            .filter(|v| v.is_object())
            .cloned()
            .ok_or_else(|| {
                Error::InvalidInput("session payload has no client context".to_string())
            })?;

        let continuation = initial_continuation(payload)?;
        let channel_id = channel_id(payload);

        Ok(Self {
            channel_id,
            api_key,
            client_context,
            continuation,
        })
    }
}

/// Find the initial live-chat continuation token in a resolver payload.
///
/// Deep-searches for any node titled "Live chat", takes its `continuation`
/// descriptor and applies the single-key-unwrap rule to reach the token.
pub fn initial_continuation(tree: &Value) -> Result<ContinuationToken> {
    let descriptor = find_node(tree, &|node| {
        node.get("title").is_some_and(is_live_chat_title) && node.get("continuation").is_some()
    })
    .and_then(|node| node.get("continuation"))
    .ok_or(Error::NoContinuation)?;

    unwrap_continuation(descriptor)
        .map(ContinuationToken::from_string)
        .ok_or(Error::NoToken)
}

/// Extract the channel id from a `channelNavigationEndpoint` node.
/// Absence is non-fatal: the sentinel channel is used instead.
#[must_use]
pub fn channel_id(tree: &Value) -> String {
    find_key(tree, "channelNavigationEndpoint")
        .and_then(|ep| find_key(ep, "browseId"))
        .and_then(Value::as_str)
        .map_or_else(|| UNKNOWN_CHANNEL.to_string(), str::to_string)
}

/// Apply the single-key-unwrap rule to a continuation descriptor:
/// `{"<anyContinuationData>": {"continuation": "<token>", ...}}`.
pub(crate) fn unwrap_continuation(descriptor: &Value) -> Option<String> {
    let obj = descriptor.as_object()?;
    let first_key = obj.keys().next()?;
    obj[first_key]
        .get("continuation")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn is_live_chat_title(title: &Value) -> bool {
    match title {
        Value::String(s) => s == LIVE_CHAT_TITLE,
        Value::Object(_) => title
            .get("simpleText")
            .and_then(Value::as_str)
            .is_some_and(|s| s == LIVE_CHAT_TITLE),
        _ => false,
    }
}

/// Depth-first search for the first node satisfying the predicate
fn find_node<'a>(value: &'a Value, pred: &dyn Fn(&Value) -> bool) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            if pred(value) {
                return Some(value);
            }
            map.values().find_map(|v| find_node(v, pred))
        }
        Value::Array(items) => items.iter().find_map(|v| find_node(v, pred)),
        _ => None,
    }
}

/// Depth-first search for the first value stored under `key`
fn find_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|v| find_key(v, key))),
        Value::Array(items) => items.iter().find_map(|v| find_key(v, key)),
        _ => None,
    }
}
