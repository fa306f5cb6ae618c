//! Per-stream relay actor
//!
//! One actor per stream key. The actor owns its session context,
//! continuation token, dedup cache and adapter instances, and runs the
//! polling loop against the upstream chat API. All state-mutating
//! operations (init, poll round processing, connect, disconnect, sweep)
//! serialize on the actor's state mutex; the upstream HTTP call itself runs
//! outside the lock so connects and disconnects are never stalled behind a
//! slow upstream.

pub mod dedup;
pub mod fanout;
pub mod registry;

pub use dedup::DedupCache;
pub use fanout::{AdapterInstance, Connection, ConnectionId};
pub use registry::RelayRegistry;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::FormatKind;
use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::models::{ChatAction, StreamKey};
use crate::session::SessionContext;
use crate::singleflight::SingleFlight;
use crate::upstream::{LiveChatResponse, UpstreamClient};

/// Polling loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    /// No round scheduled
    Idle,
    /// A round is scheduled or running
    Polling,
}

/// State serialized under the actor's mutex
struct ActorState {
    session: Option<SessionContext>,
    adapters: HashMap<FormatKind, AdapterInstance>,
    loop_state: LoopState,
}

impl ActorState {
    fn connection_count(&self) -> usize {
        self.adapters.values().map(AdapterInstance::connection_count).sum()
    }
}

/// Recurring tasks owned by the actor, aborted on shutdown
#[derive(Default)]
struct Tasks {
    poll: Option<JoinHandle<()>>,
    sweep: Option<JoinHandle<()>>,
}

/// Stateful relay for exactly one stream's live chat
pub struct RelayActor {
    key: StreamKey,
    relay_config: RelayConfig,
    upstream: UpstreamClient,
    dedup: DedupCache,
    state: Mutex<ActorState>,
    initialized: AtomicBool,
    // The shared value is the init outcome itself, so a failed parse is
    // cloned to every queued waiter instead of electing the next waiter
    // as a fresh leader.
    init_guard: SingleFlight<StreamKey, Result<()>, Error>,
    tasks: parking_lot::Mutex<Tasks>,
    // Stats
    init_runs: AtomicU64,
    rounds: AtomicU64,
    delivered: AtomicU64,
    suppressed: AtomicU64,
}

impl RelayActor {
    #[must_use]
    pub fn new(key: StreamKey, relay_config: RelayConfig, upstream: UpstreamClient) -> Arc<Self> {
        Arc::new(Self {
            key,
            relay_config,
            upstream,
            dedup: DedupCache::new(),
            state: Mutex::new(ActorState {
                session: None,
                adapters: HashMap::new(),
                loop_state: LoopState::Idle,
            }),
            initialized: AtomicBool::new(false),
            init_guard: SingleFlight::new(),
            tasks: parking_lot::Mutex::new(Tasks::default()),
            init_runs: AtomicU64::new(0),
            rounds: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub const fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Initialize the actor from a raw session payload, at most once.
    ///
    /// Concurrent calls coalesce onto one parsing run and share its outcome,
    /// success or failure alike. A shared failure leaves the actor
    /// uninitialized, so a later call retries with a fresh payload.
    pub async fn init(self: &Arc<Self>, payload: Value) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let this = Arc::clone(self);
        self.init_guard
            .do_work_with_fallback(
                self.key.clone(),
                async move { Ok(this.init_inner(payload).await) },
                || Error::Internal("init worker failed".to_string()),
            )
            .await?
    }

    async fn init_inner(self: Arc<Self>, payload: Value) -> Result<()> {
        // Parsing runs under the state mutex like every other mutating op,
        // so callers racing the leader queue here rather than parse.
        let mut state = self.state.lock().await;

        // A waiter that queued behind a successful leader lands here after
        // the flag flipped; don't parse again.
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        self.init_runs.fetch_add(1, Ordering::Relaxed);
        let session = SessionContext::from_payload(&payload)?;

        info!(
            stream = %self.key,
            channel = %session.channel_id,
            "Relay session initialized"
        );

        state.session = Some(session);
        drop(state);
        self.initialized.store(true, Ordering::Release);

        self.start_sweep_task();
        self.ensure_polling().await;
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Number of times the session parsing actually executed
    #[must_use]
    pub fn init_runs(&self) -> u64 {
        self.init_runs.load(Ordering::Relaxed)
    }

    /// Register a connection under the given format.
    ///
    /// Lazily creates the adapter instance, greets the new connection with a
    /// one-time diagnostic (bypassing transforms), and resumes the polling
    /// loop if it was parked.
    pub async fn connect(self: &Arc<Self>, format: FormatKind, connection: Connection) {
        {
            let mut state = self.state.lock().await;
            let instance = state.adapters.entry(format).or_insert_with(|| {
                debug!(stream = %self.key, format = %format, "Creating adapter instance");
                AdapterInstance::new(format.build_transform(&self.key))
            });

            let connection_id = connection.id.clone();
            // One-time greeting goes only to the new connection;
            // instance-wide delivery starts with the next broadcast.
            let greeting = diagnostic(&format!("connected to {} as {format}", self.key));
            let _ = connection.send(&greeting);
            instance.add(connection);

            info!(
                stream = %self.key,
                format = %format,
                connection_id = %connection_id,
                connections = state.connection_count(),
                "Connection registered"
            );
        }

        self.ensure_polling().await;
    }

    /// Remove a connection. An instance emptied by this is discarded
    /// immediately; its transform state is not retained.
    pub async fn disconnect(&self, connection_id: &str) {
        let mut state = self.state.lock().await;
        let mut emptied = None;
        for (format, instance) in &mut state.adapters {
            if instance.remove(connection_id) {
                if instance.is_empty() {
                    emptied = Some(*format);
                }
                break;
            }
        }
        if let Some(format) = emptied {
            state.adapters.remove(&format);
            debug!(stream = %self.key, format = %format, "Adapter instance emptied, removed");
        }
        info!(
            stream = %self.key,
            connection_id = %connection_id,
            connections = state.connection_count(),
            "Connection unregistered"
        );
    }

    /// Total live connections across all adapter instances
    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connection_count()
    }

    /// The continuation token the next round would use
    pub async fn current_token(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.continuation.as_str().to_string())
    }

    /// Broadcast one action through every adapter instance's transform.
    pub async fn broadcast(&self, action: &ChatAction) {
        let mut state = self.state.lock().await;
        Self::broadcast_locked(&mut state, action);
    }

    fn broadcast_locked(state: &mut ActorState, action: &ChatAction) {
        // Instances emptied by dead-connection pruning are dropped, same as
        // an explicit disconnect of their last connection.
        state.adapters.retain(|_, instance| {
            instance.broadcast(action);
            !instance.is_empty()
        });
    }

    /// Send a diagnostic event to every connection, bypassing transforms.
    pub async fn broadcast_diagnostic(&self, message: &str) {
        let payload = diagnostic(message);
        let mut state = self.state.lock().await;
        state.adapters.retain(|_, instance| {
            instance.send_raw(&payload);
            !instance.is_empty()
        });
    }

    /// Resume the polling loop if it is parked and a session exists.
    pub async fn ensure_polling(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            if state.session.is_none() || state.loop_state == LoopState::Polling {
                return;
            }
            state.loop_state = LoopState::Polling;
        }

        debug!(stream = %self.key, "Polling loop starting");
        let weak = Arc::downgrade(self);
        let interval = self.relay_config.poll_interval();
        let handle = tokio::spawn(async move {
            loop {
                let started = tokio::time::Instant::now();
                // Holding only a weak handle between rounds lets the host
                // reclaim the actor while the loop sleeps.
                let Some(actor) = weak.upgrade() else { return };
                actor.poll_round().await;

                {
                    let mut state = actor.state.lock().await;
                    if state.connection_count() == 0 {
                        state.loop_state = LoopState::Idle;
                        debug!(stream = %actor.key, "No live connections, polling loop parked");
                        return;
                    }
                }
                drop(actor);
                tokio::time::sleep_until(started + interval).await;
            }
        });
        self.tasks.lock().poll = Some(handle);
    }

    /// Execute one poll round. Never fails: any processing error surfaces as
    /// a diagnostic broadcast and the loop keeps its schedule with the last
    /// good token.
    async fn poll_round(&self) {
        let snapshot = {
            let state = self.state.lock().await;
            state.session.as_ref().map(|s| {
                (
                    s.api_key.clone(),
                    s.client_context.clone(),
                    s.continuation.clone(),
                )
            })
        };
        let Some((api_key, client_context, token)) = snapshot else {
            return;
        };

        self.rounds.fetch_add(1, Ordering::Relaxed);
        match self
            .upstream
            .fetch_live_chat(&api_key, &client_context, &token)
            .await
        {
            Ok(response) => self.process_response(&response).await,
            Err(err) => {
                warn!(stream = %self.key, error = %err, "Poll round failed");
                self.broadcast_diagnostic(&format!("upstream poll failed: {err}"))
                    .await;
            }
        }
    }

    async fn process_response(&self, response: &LiveChatResponse) {
        let actions = response.merged_actions();
        let next_token = response.next_token();

        let mut state = self.state.lock().await;
        if let Some(next) = next_token {
            // Absent descriptor: prior token is retained unchanged
            if let Some(session) = state.session.as_mut() {
                session.continuation = next;
            }
        }

        for action in &actions {
            if let Some(id) = action.identity() {
                if !self.dedup.check_and_insert(&id) {
                    self.suppressed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            }
            Self::broadcast_locked(&mut state, action);
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn start_sweep_task(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let window = self.relay_config.dedup_window();
        let period = self.relay_config.sweep_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // first tick completes immediately
            loop {
                ticker.tick().await;
                // The sweep must not outlive its actor
                let Some(actor) = weak.upgrade() else { return };
                actor.dedup.sweep(window);
            }
        });
        self.tasks.lock().sweep = Some(handle);
    }

    /// Stop both recurring tasks. Called by the host when reclaiming the
    /// actor; safe to call more than once.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        if let Some(handle) = tasks.poll.take() {
            handle.abort();
        }
        if let Some(handle) = tasks.sweep.take() {
            handle.abort();
        }
        info!(stream = %self.key, "Relay actor shut down");
    }

    /// Stats counters (rounds, delivered, suppressed)
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            rounds: self.rounds.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            dedup_entries: self.dedup.len(),
        }
    }
}

/// Point-in-time actor counters
#[derive(Debug, Clone, Copy)]
pub struct RelayStats {
    pub rounds: u64,
    pub delivered: u64,
    pub suppressed: u64,
    pub dedup_entries: usize,
}

/// Built-in diagnostic envelope, sent directly and never transformed
fn diagnostic(message: &str) -> String {
    json!({"debug": true, "message": message}).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn test_actor() -> Arc<RelayActor> {
        let upstream = UpstreamClient::new(&UpstreamConfig::default());
        RelayActor::new(StreamKey::from("test-stream"), RelayConfig::default(), upstream)
    }

    fn session_payload(token: &str) -> Value {
        json!({
            "apiKey": "k",
            "clientContext": {"client": {}},
            "tree": {
                "title": {"simpleText": "Live chat"},
                "continuation": {"reloadContinuationData": {"continuation": token}}
            }
        })
    }

    fn connection(id: &str) -> (Connection, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(id.to_string(), tx), rx)
    }

    fn text_action(id: &str) -> ChatAction {
        ChatAction::new(json!({
            "addChatItemAction": {
                "item": {
                    "liveChatTextMessageRenderer": {
                        "id": id,
                        "authorName": {"simpleText": "alice"},
                        "message": {"runs": [{"text": "hi"}]}
                    }
                }
            }
        }))
    }

    #[tokio::test]
    async fn test_concurrent_init_parses_once() {
        let actor = test_actor();

        let mut handles = vec![];
        for _ in 0..8 {
            let actor = Arc::clone(&actor);
            handles.push(tokio::spawn(async move {
                actor.init(session_payload("tok")).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert!(actor.is_initialized());
        assert_eq!(actor.init_runs(), 1);
        assert_eq!(actor.current_token().await.as_deref(), Some("tok"));
        actor.shutdown();
    }

    #[tokio::test]
    async fn test_concurrent_failing_init_parses_once() {
        let actor = test_actor();
        let bad = json!({"apiKey": "k", "clientContext": {}, "tree": {}});

        // Hold the state lock so every caller queues behind one leader
        let guard = actor.state.lock().await;
        let mut handles = vec![];
        for _ in 0..8 {
            let actor = Arc::clone(&actor);
            let bad = bad.clone();
            handles.push(tokio::spawn(async move { actor.init(bad).await }));
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(guard);

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, Error::NoContinuation));
        }
        assert_eq!(actor.init_runs(), 1, "parsing must execute exactly once");
        assert!(!actor.is_initialized());
        actor.shutdown();
    }

    #[tokio::test]
    async fn test_failed_init_rolls_back_and_retries() {
        let actor = test_actor();

        let bad = json!({"apiKey": "k", "clientContext": {}, "tree": {}});
        let err = actor.init(bad).await.unwrap_err();
        assert!(matches!(err, Error::NoContinuation));
        assert!(!actor.is_initialized());

        // A later init with a good payload succeeds
        actor.init(session_payload("tok-2")).await.unwrap();
        assert!(actor.is_initialized());
        assert_eq!(actor.init_runs(), 2);
        actor.shutdown();
    }

    #[tokio::test]
    async fn test_init_after_success_is_noop() {
        let actor = test_actor();
        actor.init(session_payload("tok-a")).await.unwrap();
        actor.init(session_payload("tok-b")).await.unwrap();
        // Second call did not re-run parsing or replace the session
        assert_eq!(actor.init_runs(), 1);
        assert_eq!(actor.current_token().await.as_deref(), Some("tok-a"));
        actor.shutdown();
    }

    #[tokio::test]
    async fn test_duplicate_action_suppressed() {
        let actor = test_actor();
        let (conn, mut rx) = connection("c1");
        actor.connect(FormatKind::Json, conn).await;
        let _greeting = rx.recv().await.unwrap();

        let action = text_action("X");
        let response = LiveChatResponse::new(json!({
            "continuationContents": {"liveChatContinuation": {"actions": [action.raw()]}}
        }));
        actor.process_response(&response).await;
        actor.process_response(&response).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "duplicate must be suppressed");
        assert_eq!(actor.stats().suppressed, 1);
        actor.shutdown();
    }

    #[tokio::test]
    async fn test_idless_action_always_delivered() {
        let actor = test_actor();
        let (conn, mut rx) = connection("c1");
        actor.connect(FormatKind::Json, conn).await;
        let _greeting = rx.recv().await.unwrap();

        let response = LiveChatResponse::new(json!({
            "continuationContents": {"liveChatContinuation": {"actions": [
                {"someActionWithoutItem": {}}
            ]}}
        }));
        actor.process_response(&response).await;
        actor.process_response(&response).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok(), "id-less actions are never suppressed");
        actor.shutdown();
    }

    #[tokio::test]
    async fn test_missing_next_token_retains_prior() {
        let actor = test_actor();
        actor.init(session_payload("tok-keep")).await.unwrap();

        let response = LiveChatResponse::new(json!({
            "continuationContents": {"liveChatContinuation": {"actions": []}}
        }));
        actor.process_response(&response).await;
        assert_eq!(actor.current_token().await.as_deref(), Some("tok-keep"));

        let response = LiveChatResponse::new(json!({
            "continuationContents": {"liveChatContinuation": {
                "continuations": [{"timedContinuationData": {"continuation": "tok-next"}}],
                "actions": []
            }}
        }));
        actor.process_response(&response).await;
        assert_eq!(actor.current_token().await.as_deref(), Some("tok-next"));
        actor.shutdown();
    }

    #[tokio::test]
    async fn test_null_transform_skips_format() {
        let actor = test_actor();
        let (json_conn, mut json_rx) = connection("c-json");
        let (irc_conn, mut irc_rx) = connection("c-irc");
        actor.connect(FormatKind::Json, json_conn).await;
        actor.connect(FormatKind::Irc, irc_conn).await;
        let _ = json_rx.recv().await;
        let _ = irc_rx.recv().await;

        // IRC has no representation for a removal action
        let action = ChatAction::new(json!({"removeChatItemAction": {"targetItemId": "x"}}));
        actor.broadcast(&action).await;

        assert!(json_rx.try_recv().is_ok());
        assert!(irc_rx.try_recv().is_err());
        actor.shutdown();
    }

    #[tokio::test]
    async fn test_last_disconnect_discards_instance() {
        let actor = test_actor();
        let (conn, _rx) = connection("c1");
        actor.connect(FormatKind::Irc, conn).await;
        assert_eq!(actor.connection_count().await, 1);

        actor.disconnect("c1").await;
        assert_eq!(actor.connection_count().await, 0);
        assert!(actor.state.lock().await.adapters.is_empty());

        // Reconnect creates a fresh instance
        let (conn2, _rx2) = connection("c2");
        actor.connect(FormatKind::Irc, conn2).await;
        assert_eq!(actor.connection_count().await, 1);
        actor.shutdown();
    }

    #[tokio::test]
    async fn test_greeting_sent_on_connect() {
        let actor = test_actor();
        let (conn, mut rx) = connection("c1");
        actor.connect(FormatKind::Json, conn).await;

        let greeting = rx.recv().await.unwrap();
        let parsed: Value = serde_json::from_str(&greeting).unwrap();
        assert_eq!(parsed["debug"], true);
        assert!(parsed["message"].as_str().unwrap().contains("connected"));
        actor.shutdown();
    }

    #[tokio::test]
    async fn test_diagnostic_bypasses_transforms() {
        let actor = test_actor();
        let (conn, mut rx) = connection("c1");
        // Highlight drops nearly everything, but diagnostics still arrive
        actor.connect(FormatKind::Highlight, conn).await;
        let _greeting = rx.recv().await;

        actor.broadcast_diagnostic("upstream poll failed: 503").await;
        let payload = rx.try_recv().unwrap();
        let parsed: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["debug"], true);
        actor.shutdown();
    }
}
