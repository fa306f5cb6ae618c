//! Upstream live-chat HTTP client
//!
//! One POST per poll round against the platform's internal live-chat
//! endpoint, carrying the API key as a query parameter and browser-simulating
//! headers. Responses are kept as raw JSON; batch merging and next-token
//! extraction are structural walks over that tree.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::config::UpstreamConfig;
use crate::error::{Error, Result};
use crate::models::{ChatAction, ContinuationToken};
use crate::session::unwrap_continuation;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Maximum response body size for upstream calls (16 MB).
/// Prevents OOM from a malicious or misconfigured upstream.
pub const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Shared HTTP client for all upstream requests (connection pooling).
/// Redirects are disabled; the live-chat endpoint never legitimately
/// redirects.
static SHARED_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(10)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build shared upstream HTTP client")
});

/// Upstream live-chat client, one per process (cheap to clone)
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    origin: String,
}

impl UpstreamClient {
    #[must_use]
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            client: SHARED_CLIENT.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            origin: config.origin.clone(),
        }
    }

    /// Fetch one batch of live-chat actions for the given continuation.
    pub async fn fetch_live_chat(
        &self,
        api_key: &str,
        client_context: &Value,
        continuation: &ContinuationToken,
    ) -> Result<LiveChatResponse> {
        let url = format!("{}/live_chat/get_live_chat", self.base_url);
        let body = json!({
            "context": client_context,
            "continuation": continuation.as_str(),
            "currentPlayerState": {"playerOffsetMs": "0"},
        });

        let resp = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .header("Origin", &self.origin)
            .header("Referer", &self.origin)
            .header("Accept-Language", ACCEPT_LANGUAGE)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }

        let raw = json_with_limit(resp).await?;
        Ok(LiveChatResponse { raw })
    }
}

/// Read a response body with a size limit and deserialize as JSON.
async fn json_with_limit(response: reqwest::Response) -> Result<Value> {
    if let Some(cl) = response.content_length() {
        if cl as usize > MAX_RESPONSE_SIZE {
            return Err(Error::Parse(format!("response too large ({cl} bytes)")));
        }
    }
    let bytes = response.bytes().await?;
    if bytes.len() > MAX_RESPONSE_SIZE {
        return Err(Error::Parse(format!(
            "response too large ({} bytes)",
            bytes.len()
        )));
    }
    serde_json::from_slice(&bytes).map_err(Into::into)
}

/// One upstream poll response, held raw
#[derive(Debug, Clone)]
pub struct LiveChatResponse {
    raw: Value,
}

impl LiveChatResponse {
    #[must_use]
    pub const fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// Merge action batches from both known response shapes, preserving
    /// discovery order: the primary continuation-contents list first, then
    /// for each alternate endpoint entry its append batch, then its reload
    /// batch.
    #[must_use]
    pub fn merged_actions(&self) -> Vec<ChatAction> {
        let mut actions = Vec::new();

        if let Some(primary) = self
            .live_chat_continuation()
            .and_then(|c| c.get("actions"))
            .and_then(Value::as_array)
        {
            actions.extend(primary.iter().cloned().map(ChatAction::new));
        }

        if let Some(endpoints) = self
            .raw
            .get("onResponseReceivedEndpoints")
            .and_then(Value::as_array)
        {
            for endpoint in endpoints {
                for key in ["appendContinuationItemsAction", "reloadContinuationItemsAction"] {
                    if let Some(batch) = endpoint
                        .get(key)
                        .and_then(|a| a.get("continuationItems"))
                        .and_then(Value::as_array)
                    {
                        actions.extend(batch.iter().cloned().map(ChatAction::new));
                    }
                }
            }
        }

        actions
    }

    /// Next continuation token, if the response carries a descriptor.
    /// Absence means the caller retains its prior token.
    #[must_use]
    pub fn next_token(&self) -> Option<ContinuationToken> {
        self.live_chat_continuation()
            .and_then(|c| c.get("continuations"))
            .and_then(Value::as_array)
            .and_then(|descriptors| descriptors.first())
            .and_then(unwrap_continuation)
            .map(ContinuationToken::from_string)
    }

    fn live_chat_continuation(&self) -> Option<&Value> {
        self.raw
            .get("continuationContents")
            .and_then(|c| c.get("liveChatContinuation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tagged(tag: &str) -> Value {
        json!({tag: {"item": {}}})
    }

    #[test]
    fn test_merge_primary_then_endpoints() {
        let resp = LiveChatResponse::new(json!({
            "continuationContents": {
                "liveChatContinuation": {
                    "actions": [tagged("a"), tagged("b")]
                }
            },
            "onResponseReceivedEndpoints": [
                {"appendContinuationItemsAction": {"continuationItems": [tagged("c")]}}
            ]
        }));

        let tags: Vec<String> = resp
            .merged_actions()
            .iter()
            .map(|a| {
                a.raw()
                    .as_object()
                    .and_then(|o| o.keys().next().cloned())
                    .unwrap_or_default()
            })
            .collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merge_append_before_reload_per_entry() {
        let resp = LiveChatResponse::new(json!({
            "onResponseReceivedEndpoints": [
                {
                    "reloadContinuationItemsAction": {"continuationItems": [tagged("r1")]},
                    "appendContinuationItemsAction": {"continuationItems": [tagged("a1")]}
                },
                {"appendContinuationItemsAction": {"continuationItems": [tagged("a2")]}}
            ]
        }));

        let tags: Vec<String> = resp
            .merged_actions()
            .iter()
            .map(|a| {
                a.raw()
                    .as_object()
                    .and_then(|o| o.keys().next().cloned())
                    .unwrap_or_default()
            })
            .collect();
        assert_eq!(tags, vec!["a1", "r1", "a2"]);
    }

    #[test]
    fn test_next_token_unwrap() {
        let resp = LiveChatResponse::new(json!({
            "continuationContents": {
                "liveChatContinuation": {
                    "continuations": [
                        {"timedContinuationData": {"continuation": "next-tok", "timeoutMs": 2000}}
                    ],
                    "actions": []
                }
            }
        }));
        assert_eq!(resp.next_token().map(|t| t.0), Some("next-tok".to_string()));
    }

    #[test]
    fn test_next_token_absent() {
        let resp = LiveChatResponse::new(json!({"continuationContents": {}}));
        assert_eq!(resp.next_token(), None);
    }

    #[test]
    fn test_empty_response_yields_no_actions() {
        let resp = LiveChatResponse::new(json!({}));
        assert!(resp.merged_actions().is_empty());
    }
}
