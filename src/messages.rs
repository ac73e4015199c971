use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FilePayload {
    pub name: String,
    #[serde(rename = "type")]
    pub media_type: String,
    /// Data URI: `data:<mediaType>;base64,<payload>`.
    pub data: String,
}

/// The chat-message shape shared by both directions of the wire: clients
/// submit one and the server rebroadcasts one. `id` and `user` supplied by
/// the client are advisory; the router reassigns both before fan-out.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatMessage {
    pub id: String,
    pub user: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FilePayload>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RoomSummary {
    pub name: String,
    #[serde(rename = "requiresPassword")]
    pub requires_password: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "event")]
pub enum ClientEvent {
    #[serde(rename = "join")]
    Join {
        username: String,
        room: String,
        #[serde(default)]
        password: String,
    },
    #[serde(rename = "chat message")]
    Chat(ChatMessage),
    #[serde(rename = "leave")]
    Leave,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "event")]
pub enum ServerEvent {
    #[serde(rename = "room list")]
    RoomList { rooms: Vec<RoomSummary> },
    #[serde(rename = "joined")]
    Joined { room: String, username: String },
    #[serde(rename = "chat message")]
    Chat(ChatMessage),
    #[serde(rename = "user joined")]
    UserJoined { username: String },
    #[serde(rename = "user left")]
    UserLeft { username: String },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}
