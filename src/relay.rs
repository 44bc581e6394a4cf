//! In-process message relay between live connections.
//!
//! Connections are keyed by the subject of their [`Principal`], which only the
//! connection gate can produce, so an unauthenticated socket can never be
//! registered here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::auth::Principal;

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established for this subject
    Connected { subject: String },
    /// A relayed chat message
    Message {
        sender: String,
        recipient: String,
        content: String,
        timestamp: u64,
    },
    /// Ping to keep connection alive
    Ping,
    /// Error message
    Error { message: String },
}

/// Messages sent from client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Send { recipient: String, content: String },
}

/// Identifies one registered connection of a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

type Connections = HashMap<String, HashMap<ConnectionId, mpsc::Sender<ServerMessage>>>;

#[derive(Clone, Default)]
pub struct Relay {
    connections: Arc<Mutex<Connections>>,
    next_id: Arc<AtomicU64>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection's outbound channel.
    pub fn register(
        &self,
        principal: &Principal,
        sender: mpsc::Sender<ServerMessage>,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(principal.subject().to_string())
            .or_default()
            .insert(id, sender);
        id
    }

    pub fn unregister(&self, principal: &Principal, id: ConnectionId) {
        let mut connections = self.lock();
        if let Some(subject_connections) = connections.get_mut(principal.subject()) {
            subject_connections.remove(&id);
            if subject_connections.is_empty() {
                connections.remove(principal.subject());
            }
        }
    }

    /// Send `message` to every live connection of `recipient`.
    /// Returns how many connections accepted it.
    pub fn deliver(&self, recipient: &str, message: ServerMessage) -> usize {
        let senders: Vec<_> = match self.lock().get(recipient) {
            Some(subject_connections) => subject_connections.values().cloned().collect(),
            None => return 0,
        };

        senders
            .iter()
            .filter(|sender| sender.try_send(message.clone()).is_ok())
            .count()
    }

    /// Number of live connections for a subject.
    pub fn connection_count(&self, subject: &str) -> usize {
        self.lock().get(subject).map_or(0, HashMap::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connections> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
