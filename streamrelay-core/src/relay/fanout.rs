//! Adapter/connection fan-out
//!
//! Connections sharing one output format are grouped under an adapter
//! instance. The instance owns the format's transform and its connection
//! set; an instance with zero connections is discarded immediately rather
//! than retained for reuse.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::adapters::Transform;
use crate::error::{Error, Result};
use crate::models::ChatAction;

/// Unique id for one client connection
pub type ConnectionId = String;

/// Handle to one live duplex channel. The receiving half is drained into the
/// client's socket by the transport layer.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    sender: mpsc::UnboundedSender<String>,
}

impl Connection {
    #[must_use]
    pub const fn new(id: ConnectionId, sender: mpsc::UnboundedSender<String>) -> Self {
        Self { id, sender }
    }

    /// Queue a payload for this client. Fails only if the client side is
    /// gone; the caller drops the connection on failure.
    pub fn send(&self, payload: &str) -> Result<()> {
        self.sender
            .send(payload.to_string())
            .map_err(|_| Error::Transport(self.id.clone()))
    }
}

/// Connections sharing one output format, plus that format's transform
pub struct AdapterInstance {
    transform: Arc<dyn Transform>,
    connections: Vec<Connection>,
}

impl AdapterInstance {
    #[must_use]
    pub fn new(transform: Arc<dyn Transform>) -> Self {
        Self {
            transform,
            connections: Vec::new(),
        }
    }

    pub fn add(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    /// Remove a connection by id. Returns `true` if it was present.
    pub fn remove(&mut self, connection_id: &str) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c.id != connection_id);
        self.connections.len() != before
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Transform the action and send it to every connection in this
    /// instance. A `None` transform result means this format has no
    /// representation for the action; nothing is sent.
    ///
    /// Per-connection send failures never block delivery to the others; the
    /// dead connections are pruned and returned for bookkeeping.
    pub fn broadcast(&mut self, action: &ChatAction) -> Vec<ConnectionId> {
        let Some(payload) = self.transform.transform(action) else {
            return Vec::new();
        };
        self.send_raw(&payload)
    }

    /// Send an untransformed payload (diagnostics) to every connection.
    pub fn send_raw(&mut self, payload: &str) -> Vec<ConnectionId> {
        let mut failed = Vec::new();
        for conn in &self.connections {
            if conn.send(payload).is_err() {
                debug!(connection_id = %conn.id, "Dropping closed connection");
                failed.push(conn.id.clone());
            }
        }
        for id in &failed {
            self.remove(id);
        }
        failed
    }
}
