use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::{Message, WebSocket};
use warp::Filter;

use crate::config::SeedRoom;
use crate::connections::{ConnectionId, ConnectionRegistry, OutboundSender};
use crate::messages::{ChatMessage, ClientEvent, RoomSummary, ServerEvent};
use crate::rooms::RoomRegistry;
use crate::router::MessageRouter;

// Upper bound on a single websocket frame. A 10 MiB attachment grows by
// roughly a third under base64, so 16 MiB leaves room for the JSON envelope
// while still refusing grossly oversized frames at the transport.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// The session gateway: owns the registries, runs the per-connection
/// websocket loop, and maps wire events onto registry and router calls.
#[derive(Clone)]
pub struct ChatServer {
    connections: ConnectionRegistry,
    rooms: RoomRegistry,
    router: Arc<MessageRouter>,
}

impl ChatServer {
    pub fn new(seed_rooms: &[SeedRoom]) -> Self {
        let connections = ConnectionRegistry::new();
        let rooms = RoomRegistry::new(seed_rooms);
        let router = Arc::new(MessageRouter::new(connections.clone(), rooms.clone()));
        ChatServer {
            connections,
            rooms,
            router,
        }
    }

    pub async fn room_catalog(&self) -> Vec<RoomSummary> {
        self.rooms.list_known_rooms().await
    }

    /// Drive one websocket session from accept to close.
    pub async fn handle_connection(&self, ws: WebSocket) {
        let id = Uuid::new_v4();
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel();

        info!("New connection: {}", id);

        // Outbound pump: everything addressed to this connection funnels
        // through one channel, which keeps per-recipient delivery ordered.
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_tx.send(message).await {
                    debug!("Outbound send failed, dropping pump: {}", e);
                    break;
                }
            }
        });

        // Greet with the room catalog so the lobby can render a live list.
        send_event(
            &tx,
            &ServerEvent::RoomList {
                rooms: self.rooms.list_known_rooms().await,
            },
        );

        while let Some(result) = ws_rx.next().await {
            match result {
                Ok(msg) => {
                    if msg.is_close() {
                        break;
                    }
                    let Ok(text) = msg.to_str() else {
                        continue;
                    };
                    match serde_json::from_str::<ClientEvent>(text) {
                        Ok(event) => self.handle_event(id, &tx, event).await,
                        Err(e) => {
                            warn!("Unparsable event from {}: {}", id, e);
                            send_error(&tx, "malformed-payload", "could not parse event");
                        }
                    }
                }
                Err(e) => {
                    error!("WebSocket error on {}: {}", id, e);
                    break;
                }
            }
        }

        self.handle_disconnect(id).await;
    }

    async fn handle_event(&self, id: ConnectionId, tx: &OutboundSender, event: ClientEvent) {
        match event {
            ClientEvent::Join { username, room, password } => {
                self.handle_join(id, tx, username, room, password).await;
            }
            ClientEvent::Chat(message) => self.handle_chat(id, tx, message).await,
            ClientEvent::Leave => self.handle_leave(id).await,
        }
    }

    async fn handle_join(
        &self,
        id: ConnectionId,
        tx: &OutboundSender,
        username: String,
        room: String,
        password: String,
    ) {
        let username = username.trim().to_string();
        let room = room.trim().to_string();
        if username.is_empty() || room.is_empty() {
            send_error(tx, "invalid-join", "username and room must be non-empty");
            return;
        }

        if let Err(e) = self.rooms.authenticate(&room, &password).await {
            warn!("Join rejected for {} on {}: {}", id, room, e);
            send_error(tx, e.code(), &e.to_string());
            return;
        }

        // A join from an already-joined connection is a room switch; the
        // username from the original join stays in force.
        if let Some(session) = self.connections.lookup(id).await {
            if let Err(e) = self.rooms.switch(&session.room, &room, id).await {
                send_error(tx, e.code(), &e.to_string());
                return;
            }
            self.connections.set_room(id, &room).await;
            info!("{} switched from {} to {}", session.username, session.room, room);

            self.broadcast_presence(
                &session.room,
                None,
                ServerEvent::UserLeft { username: session.username.clone() },
            )
            .await;
            send_event(
                tx,
                &ServerEvent::Joined { room: room.clone(), username: session.username.clone() },
            );
            self.broadcast_presence(
                &room,
                Some(id),
                ServerEvent::UserJoined { username: session.username },
            )
            .await;
            return;
        }

        if let Err(e) = self
            .connections
            .register(id, username.clone(), room.clone(), tx.clone())
            .await
        {
            send_error(tx, e.code(), &e.to_string());
            return;
        }
        if let Err(e) = self.rooms.join(&room, id).await {
            // Rooms are never deleted, so a vanished room here means the
            // registries disagree; roll the registration back.
            self.connections.unregister(id).await;
            send_error(tx, e.code(), &e.to_string());
            return;
        }

        info!("{} joined room {}", username, room);
        send_event(
            tx,
            &ServerEvent::Joined { room: room.clone(), username: username.clone() },
        );
        self.broadcast_presence(&room, Some(id), ServerEvent::UserJoined { username })
            .await;
    }

    async fn handle_chat(&self, id: ConnectionId, tx: &OutboundSender, message: ChatMessage) {
        if let Err(e) = self.router.submit(id, message).await {
            warn!("Message from {} rejected: {}", id, e);
            send_error(tx, e.code(), &e.to_string());
        }
    }

    async fn handle_leave(&self, id: ConnectionId) {
        if let Some(session) = self.connections.unregister(id).await {
            self.rooms.leave(&session.room, id).await;
            info!("{} left room {}", session.username, session.room);
            self.broadcast_presence(
                &session.room,
                None,
                ServerEvent::UserLeft { username: session.username },
            )
            .await;
        }
    }

    async fn handle_disconnect(&self, id: ConnectionId) {
        info!("Connection closed: {}", id);
        self.handle_leave(id).await;
    }

    /// Presence fan-out to a room, optionally excluding one connection
    /// (a joiner gets its ack instead of its own presence event).
    async fn broadcast_presence(
        &self,
        room: &str,
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) {
        let Ok(mut members) = self.rooms.members_of(room).await else {
            return;
        };
        if let Some(id) = except {
            members.remove(&id);
        }
        self.connections.broadcast(&members, &event).await;
    }
}

fn send_event(tx: &OutboundSender, event: &ServerEvent) {
    if let Ok(text) = serde_json::to_string(event) {
        let _ = tx.send(Message::text(text));
    }
}

fn send_error(tx: &OutboundSender, code: &str, message: &str) {
    send_event(
        tx,
        &ServerEvent::Error {
            code: code.to_string(),
            message: message.to_string(),
        },
    );
}

/// Assemble the warp routes: websocket endpoint, room catalog, and the
/// static presentation assets.
pub fn routes(
    server: ChatServer,
    public_dir: String,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let ws_server = server.clone();
    let ws_route = warp::path("ws").and(warp::ws()).map(move |ws: warp::ws::Ws| {
        let server = ws_server.clone();
        ws.max_message_size(MAX_FRAME_BYTES)
            .on_upgrade(move |socket| async move {
                server.handle_connection(socket).await;
            })
    });

    let rooms_route = warp::path("rooms").and(warp::get()).and_then(move || {
        let server = server.clone();
        async move {
            Ok::<_, warp::Rejection>(warp::reply::json(&server.room_catalog().await))
        }
    });

    ws_route
        .or(rooms_route)
        .or(warp::fs::dir(public_dir))
        .with(warp::cors().allow_any_origin())
}
