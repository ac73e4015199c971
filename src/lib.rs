pub mod attachment;
pub mod config;
pub mod connections;
pub mod messages;
pub mod rooms;
pub mod router;
pub mod server;
