use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use thiserror::Error;

use crate::attachment::{self, AttachmentError};
use crate::connections::{ConnectionId, ConnectionRegistry};
use crate::messages::{ChatMessage, MessageKind, ServerEvent};
use crate::rooms::RoomRegistry;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    #[error("connection has not joined a room")]
    NotJoined,
    #[error("file message is missing its attachment")]
    MissingAttachment,
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
}

impl RouteError {
    pub fn code(self) -> &'static str {
        match self {
            RouteError::NotJoined => "not-joined",
            RouteError::MissingAttachment => "malformed-payload",
            RouteError::Attachment(err) => err.code(),
        }
    }
}

/// Validates inbound chat messages and fans them out to the members of the
/// sender's room. Fan-out always goes through the Room Registry's membership
/// snapshot; there is deliberately no "all connections" path.
pub struct MessageRouter {
    connections: ConnectionRegistry,
    rooms: RoomRegistry,
    next_id: AtomicU64,
}

impl MessageRouter {
    pub fn new(connections: ConnectionRegistry, rooms: RoomRegistry) -> Self {
        MessageRouter {
            connections,
            rooms,
            next_id: AtomicU64::new(1),
        }
    }

    /// Validate and broadcast one inbound message. Errors are returned to the
    /// caller so the gateway can report them to the sender alone; nothing
    /// invalid ever reaches the rest of the room.
    pub async fn submit(&self, id: ConnectionId, inbound: ChatMessage) -> Result<(), RouteError> {
        let session = self.connections.lookup(id).await.ok_or(RouteError::NotJoined)?;

        let file = match inbound.kind {
            MessageKind::File => {
                let payload = inbound.file.ok_or(RouteError::MissingAttachment)?;
                attachment::decode(&payload.data)?;
                Some(payload)
            }
            MessageKind::Text => None,
        };

        // The client-supplied id and user are advisory; the server assigns
        // its own id and stamps the sender from the authenticated session.
        let outbound = ChatMessage {
            id: self.next_id.fetch_add(1, Ordering::Relaxed).to_string(),
            user: session.username,
            content: inbound.content,
            kind: inbound.kind,
            file,
        };

        let members = self
            .rooms
            .members_of(&session.room)
            .await
            .map_err(|_| RouteError::NotJoined)?;

        debug!(
            "Routing message {} from {} to {} member(s) of {}",
            outbound.id,
            outbound.user,
            members.len(),
            session.room
        );
        self.connections.broadcast(&members, &ServerEvent::Chat(outbound)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::MAX_ATTACHMENT_BYTES;
    use crate::config::SeedRoom;
    use crate::messages::FilePayload;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use uuid::Uuid;
    use warp::ws::Message;

    struct Member {
        id: ConnectionId,
        rx: UnboundedReceiver<Message>,
    }

    async fn join_member(
        connections: &ConnectionRegistry,
        rooms: &RoomRegistry,
        username: &str,
        room: &str,
    ) -> Member {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        rooms.authenticate(room, "").await.expect("open room");
        connections
            .register(id, username.to_string(), room.to_string(), tx)
            .await
            .expect("fresh connection");
        rooms.join(room, id).await.expect("authenticated");
        Member { id, rx }
    }

    fn setup() -> (ConnectionRegistry, RoomRegistry, MessageRouter) {
        let connections = ConnectionRegistry::new();
        let rooms = RoomRegistry::new(&[
            SeedRoom { name: "General".to_string(), password: None },
            SeedRoom { name: "Tech".to_string(), password: None },
        ]);
        let router = MessageRouter::new(connections.clone(), rooms.clone());
        (connections, rooms, router)
    }

    fn text_message(content: &str) -> ChatMessage {
        ChatMessage {
            id: "client-id".to_string(),
            user: "client-claimed-name".to_string(),
            content: content.to_string(),
            kind: MessageKind::Text,
            file: None,
        }
    }

    fn recv_chat(member: &mut Member) -> ChatMessage {
        let msg = member.rx.try_recv().expect("a delivery was pending");
        let event: ServerEvent =
            serde_json::from_str(msg.to_str().expect("text frame")).expect("server event");
        match event {
            ServerEvent::Chat(chat) => chat,
            other => panic!("expected a chat event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sender_receives_its_own_message() {
        let (connections, rooms, router) = setup();
        let mut ada = join_member(&connections, &rooms, "ada", "General").await;

        router.submit(ada.id, text_message("hello")).await.expect("routable");

        let delivered = recv_chat(&mut ada);
        assert_eq!(delivered.content, "hello");
        assert_eq!(delivered.user, "ada");
    }

    #[tokio::test]
    async fn messages_stay_inside_the_room() {
        let (connections, rooms, router) = setup();
        let mut ada = join_member(&connections, &rooms, "ada", "General").await;
        let mut grace = join_member(&connections, &rooms, "grace", "General").await;
        let mut linus = join_member(&connections, &rooms, "linus", "Tech").await;

        router.submit(ada.id, text_message("general only")).await.expect("routable");

        assert_eq!(recv_chat(&mut ada).content, "general only");
        assert_eq!(recv_chat(&mut grace).content, "general only");
        assert!(linus.rx.try_recv().is_err(), "other rooms must see nothing");
    }

    #[tokio::test]
    async fn sender_identity_is_stamped_by_the_server() {
        let (connections, rooms, router) = setup();
        let mut ada = join_member(&connections, &rooms, "ada", "General").await;

        router
            .submit(ada.id, text_message("spoof attempt"))
            .await
            .expect("routable");

        let delivered = recv_chat(&mut ada);
        assert_eq!(delivered.user, "ada", "client-claimed identity must be ignored");
        assert_ne!(delivered.id, "client-id");
    }

    #[tokio::test]
    async fn per_sender_order_is_preserved() {
        let (connections, rooms, router) = setup();
        let mut ada = join_member(&connections, &rooms, "ada", "General").await;
        let mut grace = join_member(&connections, &rooms, "grace", "General").await;

        router.submit(ada.id, text_message("first")).await.expect("routable");
        router.submit(ada.id, text_message("second")).await.expect("routable");

        for member in [&mut ada, &mut grace] {
            assert_eq!(recv_chat(member).content, "first");
            assert_eq!(recv_chat(member).content, "second");
        }
    }

    #[tokio::test]
    async fn unjoined_connections_cannot_submit() {
        let (_connections, _rooms, router) = setup();
        assert_eq!(
            router.submit(Uuid::new_v4(), text_message("hi")).await,
            Err(RouteError::NotJoined)
        );
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_and_never_broadcast() {
        let (connections, rooms, router) = setup();
        let mut ada = join_member(&connections, &rooms, "ada", "General").await;
        let mut grace = join_member(&connections, &rooms, "grace", "General").await;

        let over = vec![0u8; MAX_ATTACHMENT_BYTES + 1];
        let mut message = text_message("huge.bin");
        message.kind = MessageKind::File;
        message.file = Some(FilePayload {
            name: "huge.bin".to_string(),
            media_type: "application/octet-stream".to_string(),
            data: format!("data:application/octet-stream;base64,{}", BASE64.encode(&over)),
        });

        assert_eq!(
            router.submit(ada.id, message).await,
            Err(RouteError::Attachment(AttachmentError::PayloadTooLarge))
        );
        assert!(ada.rx.try_recv().is_err());
        assert!(grace.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn file_message_without_attachment_is_rejected() {
        let (connections, rooms, router) = setup();
        let ada = join_member(&connections, &rooms, "ada", "General").await;

        let mut message = text_message("ghost.bin");
        message.kind = MessageKind::File;

        assert_eq!(
            router.submit(ada.id, message).await,
            Err(RouteError::MissingAttachment)
        );
    }

    #[tokio::test]
    async fn valid_file_message_reaches_the_room() {
        let (connections, rooms, router) = setup();
        let mut ada = join_member(&connections, &rooms, "ada", "General").await;

        let data = attachment::encode(b"tiny", "text/plain").expect("within bounds");
        let mut message = text_message("tiny.txt");
        message.kind = MessageKind::File;
        message.file = Some(FilePayload {
            name: "tiny.txt".to_string(),
            media_type: "text/plain".to_string(),
            data,
        });

        router.submit(ada.id, message).await.expect("routable");
        let delivered = recv_chat(&mut ada);
        assert_eq!(delivered.kind, MessageKind::File);
        let file = delivered.file.expect("attachment travels with the message");
        assert_eq!(file.name, "tiny.txt");
    }
}
