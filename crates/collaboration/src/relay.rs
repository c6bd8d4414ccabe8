/// Server-side relay: one authoritative document, every peer's actions fanned
/// out to the others in the order they were accepted.
///
/// The relay is transport-agnostic. Callers feed it the text of each inbound
/// frame and carry out the returned deliveries.
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use textmode::{compress, Document};
use tracing::{debug, info, warn};

use crate::{
    ChatEntry, ConnectedData, ConnectionId, Handshake, Message, PeerId, PeerInfo, PeerRef, Status,
    Welcome,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Send { to: ConnectionId, text: Arc<str> },
    /// The connection broke protocol and must be closed.
    Close { to: ConnectionId },
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Empty or `None` accepts everyone.
    pub pass: Option<String>,
    /// Chat lines replayed to late joiners.
    pub chat_history: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pass: None,
            chat_history: 100,
        }
    }
}

struct RegisteredPeer {
    info: PeerInfo,
    connection: ConnectionId,
}

pub struct Relay {
    document: Document,
    config: RelayConfig,
    next_id: u64,
    peers: BTreeMap<PeerId, RegisteredPeer>,
    connections: HashMap<ConnectionId, PeerId>,
    chat_history: VecDeque<ChatEntry>,
    modified: bool,
}

impl Relay {
    pub fn new(document: Document, config: RelayConfig) -> Self {
        Self {
            document,
            config,
            next_id: 0,
            peers: BTreeMap::new(),
            connections: HashMap::new(),
            chat_history: VecDeque::new(),
            modified: false,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerInfo> {
        self.peers.values().map(|peer| &peer.info)
    }

    pub fn peer_for(&self, connection: ConnectionId) -> Option<PeerId> {
        self.connections.get(&connection).copied()
    }

    /// True when the document changed since the last [`Relay::take_modified`].
    pub fn take_modified(&mut self) -> bool {
        std::mem::take(&mut self.modified)
    }

    /// Flags the document as unsaved again, e.g. after a failed write.
    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    /// Handles one inbound text frame from `connection`.
    pub fn handle_text(&mut self, connection: ConnectionId, text: &str) -> Vec<Delivery> {
        let message = match Message::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Malformed frame from {}: {}", connection, e);
                return self.close(connection);
            }
        };

        match message {
            Message::Connected(ConnectedData::Handshake(handshake)) => {
                self.join(connection, handshake)
            }
            Message::Connected(ConnectedData::Welcome(_)) | Message::Refused => {
                warn!("Server-only message from {}", connection);
                self.close(connection)
            }
            message => self.relay(connection, message, text),
        }
    }

    /// Unregisters `connection` and announces its departure.
    pub fn leave(&mut self, connection: ConnectionId) -> Vec<Delivery> {
        let Some(id) = self.connections.remove(&connection) else {
            return Vec::new();
        };
        self.peers.remove(&id);
        info!("Peer {} left ({} connected)", id, self.peers.len());
        self.broadcast(&Message::Leave(PeerRef { id }), None)
    }

    fn close(&mut self, connection: ConnectionId) -> Vec<Delivery> {
        let mut deliveries = self.leave(connection);
        deliveries.push(Delivery::Close { to: connection });
        deliveries
    }

    fn join(&mut self, connection: ConnectionId, handshake: Handshake) -> Vec<Delivery> {
        if self.connections.contains_key(&connection) {
            warn!("Duplicate handshake from {}", connection);
            return self.close(connection);
        }

        if let Some(pass) = self.config.pass.as_deref().filter(|pass| !pass.is_empty()) {
            if handshake.pass.as_deref() != Some(pass) {
                info!("Refused {}: bad password", connection);
                return encode(&Message::Refused)
                    .map(|text| vec![Delivery::Send { to: connection, text }])
                    .unwrap_or_default();
            }
        }

        let id = PeerId(self.next_id);
        self.next_id += 1;
        let status = if handshake.web {
            Status::Web
        } else {
            Status::Active
        };
        let info = PeerInfo {
            id,
            nick: handshake.nick,
            group: handshake.group,
            status,
        };

        let welcome = Message::Connected(ConnectedData::Welcome(Welcome {
            id,
            status,
            doc: compress(&self.document),
            chat_history: self.chat_history.iter().cloned().collect(),
            users: self.peers().cloned().collect(),
        }));

        let mut deliveries = Vec::new();
        if let Some(text) = encode(&welcome) {
            deliveries.push(Delivery::Send {
                to: connection,
                text,
            });
        }
        deliveries.extend(self.broadcast(&Message::Join(info.clone()), None));

        info!(
            "Peer {} joined as {:?} via {} ({} connected)",
            id,
            info.nick,
            connection,
            self.peers.len() + 1
        );
        self.connections.insert(connection, id);
        self.peers.insert(id, RegisteredPeer { info, connection });
        deliveries
    }

    fn relay(&mut self, connection: ConnectionId, message: Message, text: &str) -> Vec<Delivery> {
        let Some(id) = self.connections.get(&connection).copied() else {
            debug!(
                "Dropping {} from unregistered connection {}",
                message.kind(),
                connection
            );
            return Vec::new();
        };

        match &message {
            Message::Draw(draw) => {
                if let Err(e) = self.document.set(draw.x, draw.y, draw.block) {
                    warn!("Dropping draw from peer {}: {}", id, e);
                    return Vec::new();
                }
                self.modified = true;
            }
            Message::SetCanvasSize(size) => {
                if let Err(e) = self.document.resize(size.columns, size.rows) {
                    warn!("Bad canvas size from peer {}: {}", id, e);
                    return self.close(connection);
                }
                self.modified = true;
            }
            Message::Sauce(sauce) => {
                self.document.title = sauce.title.clone();
                self.document.author = sauce.author.clone();
                self.document.group = sauce.group.clone();
                self.document.comments = sauce.comments.clone();
                self.modified = true;
            }
            Message::IceColors(flag) => {
                self.document.ice_colors = flag.value;
                self.modified = true;
            }
            Message::Use9pxFont(flag) => {
                self.document.use_9px_font = flag.value;
                self.modified = true;
            }
            Message::ChangeFont(font) => {
                self.document.font_name = font.font_name.clone();
                self.modified = true;
            }
            Message::Chat(chat) => {
                self.chat_history.push_back(ChatEntry {
                    chat: chat.clone(),
                    time: Utc::now(),
                });
                while self.chat_history.len() > self.config.chat_history {
                    self.chat_history.pop_front();
                }
            }
            Message::Status(status) => {
                if let Some(peer) = self.peers.get_mut(&id) {
                    peer.info.status = status.status;
                }
            }
            Message::Join(_) | Message::Leave(_) => {
                warn!("Peer {} sent server-only {}", id, message.kind());
                return self.close(connection);
            }
            _ => {}
        }

        self.broadcast_text(Arc::from(text), Some(connection))
    }

    fn broadcast(&self, message: &Message, exclude: Option<ConnectionId>) -> Vec<Delivery> {
        match encode(message) {
            Some(text) => self.broadcast_text(text, exclude),
            None => Vec::new(),
        }
    }

    fn broadcast_text(&self, text: Arc<str>, exclude: Option<ConnectionId>) -> Vec<Delivery> {
        self.peers
            .values()
            .filter(|peer| exclude != Some(peer.connection))
            .map(|peer| Delivery::Send {
                to: peer.connection,
                text: text.clone(),
            })
            .collect()
    }
}

fn encode(message: &Message) -> Option<Arc<str>> {
    match message.encode() {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            warn!("Failed to encode {}: {}", message.kind(), e);
            None
        }
    }
}
