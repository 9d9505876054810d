//! Broadcast hub for realtime subscribers.
//!
//! Events are serialized once and fanned out to every connected client.
//! Clients whose channel is gone are dropped during the send pass. Rooms
//! scope what a frontend chooses to render; delivery itself is broadcast.

use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
};

use {
    async_trait::async_trait,
    serde_json::json,
    tokio::sync::mpsc,
    tracing::{debug, warn},
};

use zapgate_common::Notifier;

struct HubClient {
    sender: mpsc::UnboundedSender<String>,
    rooms: HashSet<String>,
}

/// All connected realtime subscribers.
#[derive(Default)]
pub struct RealtimeHub {
    clients: RwLock<HashMap<String, HubClient>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel.
    pub fn register(&self, conn_id: &str, sender: mpsc::UnboundedSender<String>) {
        self.clients.write().unwrap().insert(
            conn_id.to_string(),
            HubClient {
                sender,
                rooms: HashSet::new(),
            },
        );
    }

    /// Scope a subscriber to a session room.
    pub fn join(&self, conn_id: &str, session_key: &str) {
        if let Some(client) = self.clients.write().unwrap().get_mut(conn_id) {
            client.rooms.insert(session_key.to_string());
            debug!(conn_id, session_key, "client joined session room");
        }
    }

    pub fn remove(&self, conn_id: &str) {
        self.clients.write().unwrap().remove(conn_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    /// Serialize once, send to everyone, dropping dead clients.
    pub fn broadcast(&self, event: &str, payload: &serde_json::Value) {
        let frame = json!({ "event": event, "payload": payload }).to_string();

        let mut dead = Vec::new();
        {
            let clients = self.clients.read().unwrap();
            debug!(event, clients = clients.len(), "broadcasting event");
            for (conn_id, client) in clients.iter() {
                if client.sender.send(frame.clone()).is_err() {
                    dead.push(conn_id.clone());
                }
            }
        }

        if !dead.is_empty() {
            let mut clients = self.clients.write().unwrap();
            for conn_id in dead {
                warn!(conn_id, "dropping dead realtime client");
                clients.remove(&conn_id);
            }
        }
    }
}

#[async_trait]
impl Notifier for RealtimeHub {
    async fn emit(&self, event: &str, payload: serde_json::Value) {
        self.broadcast(event, &payload);
    }
}
