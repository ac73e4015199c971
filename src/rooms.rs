use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::SeedRoom;
use crate::connections::ConnectionId;
use crate::messages::RoomSummary;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    #[error("no such room")]
    RoomNotFound,
    #[error("wrong password")]
    WrongPassword,
}

impl RoomError {
    pub fn code(self) -> &'static str {
        match self {
            RoomError::RoomNotFound => "room-not-found",
            RoomError::WrongPassword => "wrong-password",
        }
    }
}

struct Room {
    password: Option<String>,
    members: HashSet<ConnectionId>,
}

impl Room {
    fn verify_password(&self, supplied: &str) -> bool {
        match &self.password {
            Some(password) => password == supplied,
            None => true,
        }
    }
}

struct Inner {
    rooms: HashMap<String, Room>,
    // Creation order, seed catalog first, so the lobby listing is stable.
    order: Vec<String>,
}

/// Room definitions and membership. Rooms come from the seed catalog or are
/// created on first join; once created they are retained for the lifetime of
/// the process, even with zero members.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl RoomRegistry {
    pub fn new(seed: &[SeedRoom]) -> Self {
        let mut inner = Inner {
            rooms: HashMap::new(),
            order: Vec::new(),
        };
        for room in seed {
            if inner.rooms.contains_key(&room.name) {
                continue;
            }
            inner.order.push(room.name.clone());
            inner.rooms.insert(
                room.name.clone(),
                Room {
                    password: room.password.clone(),
                    members: HashSet::new(),
                },
            );
        }
        RoomRegistry {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    pub async fn list_known_rooms(&self) -> Vec<RoomSummary> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|name| {
                inner.rooms.get(name).map(|room| RoomSummary {
                    name: name.clone(),
                    requires_password: room.password.is_some(),
                })
            })
            .collect()
    }

    /// Create-on-join authentication: an unknown room is created with the
    /// supplied password (empty means open), so the first joiner defines the
    /// room. A known room with a password requires exact equality.
    pub async fn authenticate(&self, name: &str, supplied: &str) -> Result<(), RoomError> {
        let mut inner = self.inner.write().await;
        match inner.rooms.get(name) {
            Some(room) => {
                if room.verify_password(supplied) {
                    Ok(())
                } else {
                    Err(RoomError::WrongPassword)
                }
            }
            None => {
                inner.order.push(name.to_string());
                inner.rooms.insert(
                    name.to_string(),
                    Room {
                        password: (!supplied.is_empty()).then(|| supplied.to_string()),
                        members: HashSet::new(),
                    },
                );
                Ok(())
            }
        }
    }

    /// Must only be called after a successful `authenticate`.
    pub async fn join(&self, name: &str, id: ConnectionId) -> Result<(), RoomError> {
        let mut inner = self.inner.write().await;
        let room = inner.rooms.get_mut(name).ok_or(RoomError::RoomNotFound)?;
        room.members.insert(id);
        Ok(())
    }

    /// Idempotent; unknown rooms and absent members are no-ops.
    pub async fn leave(&self, name: &str, id: ConnectionId) {
        let mut inner = self.inner.write().await;
        if let Some(room) = inner.rooms.get_mut(name) {
            room.members.remove(&id);
        }
    }

    /// Move a connection between rooms under a single lock, so it is never
    /// counted as a member of two rooms at once.
    pub async fn switch(
        &self,
        old_name: &str,
        new_name: &str,
        id: ConnectionId,
    ) -> Result<(), RoomError> {
        let mut inner = self.inner.write().await;
        if !inner.rooms.contains_key(new_name) {
            return Err(RoomError::RoomNotFound);
        }
        if let Some(old_room) = inner.rooms.get_mut(old_name) {
            old_room.members.remove(&id);
        }
        if let Some(new_room) = inner.rooms.get_mut(new_name) {
            new_room.members.insert(id);
        }
        Ok(())
    }

    /// Membership snapshot used by the router for fan-out.
    pub async fn members_of(&self, name: &str) -> Result<HashSet<ConnectionId>, RoomError> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(name)
            .map(|room| room.members.clone())
            .ok_or(RoomError::RoomNotFound)
    }
}
