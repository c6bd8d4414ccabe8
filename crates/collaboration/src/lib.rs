/// Real-time multi-user editing of a shared text-mode canvas.
///
/// A relay server holds the authoritative document and fans actions out to
/// every peer; clients gate traffic until they hold a snapshot, replicate
/// each other's cursors and keep a local undo history whose writes travel
/// as ordinary draws.
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod protocol;
pub use protocol::*;

mod presence;
pub use presence::*;

mod cursor;
pub use cursor::*;

mod config;
pub use config::*;

mod relay;
pub use relay::*;

mod connection;
pub use connection::*;

mod session;
pub use session::*;

mod client;
pub use client::*;

#[derive(Debug, Error)]
pub enum CollaborationError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("connection refused by server")]
    Refused,

    #[error("document error: {0}")]
    Document(#[from] textmode::TextmodeError),
}

pub type Result<T> = std::result::Result<T, CollaborationError>;

/// Server-assigned peer identifier, unique among connected peers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-level identifier of one socket on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
