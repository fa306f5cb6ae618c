//! Relay HTTP/WebSocket handlers
//!
//! `POST /{stream}/init` hands the resolver's session payload to the
//! stream's actor. `GET /{stream}/ws?adapter=<type>` upgrades the request
//! and registers the socket under the chosen output format.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    extract::ws::rejection::WebSocketUpgradeRejection,
    http::StatusCode,
    response::Response,
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use streamrelay_core::adapters::FormatKind;
use streamrelay_core::models::{generate_id, StreamKey};
use streamrelay_core::relay::Connection;

use crate::http::{AppError, AppResult, AppState};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Output format name; unknown or missing names fall back to `json`
    pub adapter: Option<String>,
}

/// Initialize the stream's relay actor from a session payload.
///
/// Succeeds with an empty 200. A payload with no live-chat continuation (or
/// a descriptor with no token) is a plain-text 404; the actor stays
/// uninitialized and a later init may retry.
pub async fn init_stream(
    State(state): State<AppState>,
    Path(stream): Path<String>,
    Json(payload): Json<Value>,
) -> AppResult<StatusCode> {
    let actor = state.registry.get_or_create(StreamKey::from_string(stream));
    actor.init(payload).await?;
    Ok(StatusCode::OK)
}

/// WebSocket endpoint for relayed chat.
///
/// Requires a protocol-upgrade request; plain GETs are rejected with 400.
pub async fn stream_ws(
    State(state): State<AppState>,
    Path(stream): Path<String>,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let ws = ws.map_err(|_| AppError::bad_request("WebSocket upgrade required"))?;
    let format = FormatKind::from_name(query.adapter.as_deref());

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, stream, format)))
}

async fn handle_socket(socket: WebSocket, state: AppState, stream: String, format: FormatKind) {
    let key = StreamKey::from_string(stream);
    let actor = state.registry.get_or_create(key.clone());

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let connection_id = generate_id();
    actor
        .connect(format, Connection::new(connection_id.clone(), tx))
        .await;

    info!(
        stream = %key,
        format = %format,
        connection_id = %connection_id,
        "WebSocket connection established"
    );

    let (mut sink, mut source) = socket.split();
    loop {
        tokio::select! {
            payload = rx.recv() => {
                match payload {
                    Some(payload) => {
                        if sink.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    // Actor side dropped the connection
                    None => break,
                }
            }
            inbound = source.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(other)) => {
                        // The relay is one-way; inbound frames are ignored
                        debug!(connection_id = %connection_id, ?other, "Ignoring inbound frame");
                    }
                }
            }
        }
    }

    actor.disconnect(&connection_id).await;
    info!(
        stream = %key,
        connection_id = %connection_id,
        "WebSocket connection closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::create_router;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use std::sync::Arc;
    use streamrelay_core::{Config, RelayRegistry};
    use tower::ServiceExt;

    fn test_router() -> axum::Router {
        create_router(Arc::new(RelayRegistry::new(&Config::default())))
    }

    fn session_payload() -> Value {
        json!({
            "apiKey": "k",
            "clientContext": {"client": {}},
            "tree": {
                "title": {"simpleText": "Live chat"},
                "continuation": {"reloadContinuationData": {"continuation": "tok"}}
            }
        })
    }

    #[tokio::test]
    async fn test_init_success_returns_empty_200() {
        let response = test_router()
            .oneshot(
                Request::post("/mystream/init")
                    .header("content-type", "application/json")
                    .body(Body::from(session_payload().to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_init_without_continuation_returns_404_text() {
        let payload = json!({"apiKey": "k", "clientContext": {}, "tree": {}});
        let response = test_router()
            .oneshot(
                Request::post("/mystream/init")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("body");
        let text = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(text.contains("continuation"));
    }

    #[tokio::test]
    async fn test_ws_without_upgrade_returns_400() {
        let response = test_router()
            .oneshot(
                Request::get("/mystream/ws?adapter=irc")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_router()
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
