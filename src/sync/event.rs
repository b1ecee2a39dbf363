// sync/event.rs — Wire envelope and the outbound event broadcaster.
//
// Broadcast policy (per mutation handler):
//   Originator   — the dispatch reply, sent only on the emitting connection.
//   Owner(email) — refreshed board state for one owner, forwarded by every
//                  connection currently watching that owner.
//   Global       — every connected session; retained only for feeds that are
//                  explicitly not owner-partitioned.

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Inbound frame: `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Deserialize)]
pub struct ClientEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Serialize an outbound frame in the same envelope shape.
pub fn server_event(event: &str, data: Value) -> String {
    serde_json::json!({ "event": event, "data": data }).to_string()
}

/// Who should receive a broadcast frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Connections watching this owner's board.
    Owner(String),
    /// Every connected session.
    Global,
}

/// A broadcast frame: pre-serialized envelope plus its audience.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub audience: Audience,
    pub payload: String,
}

/// Fans outbound event frames out to all connection tasks; each connection
/// filters by audience before forwarding to its socket.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<Outbound>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Emit an event to every connection watching `owner`.
    pub fn emit_owner(&self, owner: &str, event: &str, data: Value) {
        // Ignore errors — no subscribers is fine
        let _ = self.tx.send(Outbound {
            audience: Audience::Owner(owner.to_string()),
            payload: server_event(event, data),
        });
    }

    /// Emit an event to every connected session.
    pub fn emit_all(&self, event: &str, data: Value) {
        let _ = self.tx.send(Outbound {
            audience: Audience::Global,
            payload: server_event(event, data),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.tx.subscribe()
    }
}
