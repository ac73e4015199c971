use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;
use warp::ws::Message;

use crate::messages::ServerEvent;

pub type ConnectionId = Uuid;

/// Sender half of a connection's outbound channel. The gateway's pump task
/// drains the receiver half into the websocket sink.
pub type OutboundSender = mpsc::UnboundedSender<Message>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection is already registered")]
    DuplicateConnection,
}

impl RegistryError {
    pub fn code(self) -> &'static str {
        match self {
            RegistryError::DuplicateConnection => "duplicate-connection",
        }
    }
}

/// Username and current room of a registered connection.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub username: String,
    pub room: String,
}

struct ConnectionEntry {
    username: String,
    room: String,
    sender: OutboundSender,
}

/// Tracks every joined connection: id -> {username, room, outbound sender}.
/// Connections that have not joined a room yet are not registered here.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<ConnectionId, ConnectionEntry>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        id: ConnectionId,
        username: String,
        room: String,
        sender: OutboundSender,
    ) -> Result<(), RegistryError> {
        let mut connections = self.inner.write().await;
        if connections.contains_key(&id) {
            return Err(RegistryError::DuplicateConnection);
        }
        connections.insert(id, ConnectionEntry { username, room, sender });
        Ok(())
    }

    /// Idempotent. Returns the session that was removed, if any, so the
    /// caller can coordinate the room-membership cleanup.
    pub async fn unregister(&self, id: ConnectionId) -> Option<SessionInfo> {
        let mut connections = self.inner.write().await;
        connections.remove(&id).map(|entry| SessionInfo {
            username: entry.username,
            room: entry.room,
        })
    }

    pub async fn lookup(&self, id: ConnectionId) -> Option<SessionInfo> {
        let connections = self.inner.read().await;
        connections.get(&id).map(|entry| SessionInfo {
            username: entry.username.clone(),
            room: entry.room.clone(),
        })
    }

    /// Repoint a registered connection at a new room (room switch).
    pub async fn set_room(&self, id: ConnectionId, room: &str) {
        let mut connections = self.inner.write().await;
        if let Some(entry) = connections.get_mut(&id) {
            entry.room = room.to_string();
        }
    }

    /// Deliver an event to a single connection. Unknown or already closed
    /// connections are skipped; there is no retry or queueing.
    pub async fn send_to(&self, id: ConnectionId, event: &ServerEvent) {
        if let Ok(text) = serde_json::to_string(event) {
            let connections = self.inner.read().await;
            if let Some(entry) = connections.get(&id) {
                let _ = entry.sender.send(Message::text(text));
            }
        }
    }

    /// Fan an event out to a set of connections, serializing it once.
    pub async fn broadcast(&self, ids: &HashSet<ConnectionId>, event: &ServerEvent) {
        if let Ok(text) = serde_json::to_string(event) {
            let connections = self.inner.read().await;
            for id in ids {
                if let Some(entry) = connections.get(id) {
                    let _ = entry.sender.send(Message::text(text.clone()));
                }
            }
        }
    }
}
