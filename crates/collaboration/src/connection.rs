/// Client side of a collaboration link: readiness gating, the peer registry
/// with replicated cursors, and outgoing stamping with presence updates.
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;
use textmode::{uncompress, Cell, Document};
use tracing::{debug, info, warn};

use crate::{
    ChatData, ChatEntry, ClientConfig, CollaborationError, ConnectedData, Message, PeerId,
    PeerInfo, PresenceTimer, RemoteCursor, Result, SauceData, Status, StatusData, Welcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake sent; inbound actions are queued.
    Connecting,
    Ready,
    Refused,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub id: PeerId,
    pub nick: Option<String>,
    pub group: Option<String>,
    pub status: Status,
    /// Anonymous peers have no cursor.
    pub cursor: Option<RemoteCursor>,
}

impl From<PeerInfo> for Peer {
    fn from(info: PeerInfo) -> Self {
        let cursor = info.nick.is_some().then(RemoteCursor::new);
        Self {
            id: info.id,
            nick: info.nick,
            group: info.group,
            status: info.status,
            cursor,
        }
    }
}

/// Receives the effects of dispatched actions. Document-changing actions
/// must be applied; notifications default to no-ops.
pub trait ActionHandler {
    fn document(&self) -> &Document;

    /// The snapshot arrived. Replaces the local document wholesale.
    fn connected(&mut self, document: Document, chat_history: &[ChatEntry]);

    fn draw(&mut self, x: usize, y: usize, cell: Cell);

    fn sauce(&mut self, sauce: &SauceData);

    fn ice_colors(&mut self, id: PeerId, value: bool);

    fn use_9px_font(&mut self, id: PeerId, value: bool);

    fn change_font(&mut self, id: PeerId, font_name: &str);

    fn set_canvas_size(&mut self, id: PeerId, columns: usize, rows: usize);

    fn refused(&mut self) {}

    /// `announce` is false for peers already present when we connected.
    fn joined(&mut self, _peer: &Peer, _announce: bool) {}

    fn left(&mut self, _peer: &Peer) {}

    fn cursor_changed(&mut self, _peer: &Peer) {}

    fn chat(&mut self, _chat: &ChatData) {}

    fn status(&mut self, _id: PeerId, _status: Status) {}
}

pub struct PeerConnection {
    config: ClientConfig,
    state: ConnectionState,
    id: Option<PeerId>,
    queued: VecDeque<Message>,
    peers: BTreeMap<PeerId, Peer>,
    presence: Option<PresenceTimer>,
}

impl PeerConnection {
    pub fn new(config: ClientConfig) -> Self {
        let presence = (!config.web).then(|| PresenceTimer::new(config.presence));
        Self {
            config,
            state: ConnectionState::Connecting,
            id: None,
            queued: VecDeque::new(),
            peers: BTreeMap::new(),
            presence,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Our server-assigned id, once the snapshot has arrived.
    pub fn id(&self) -> Option<PeerId> {
        self.id
    }

    pub fn status(&self) -> Status {
        match &self.presence {
            Some(timer) => timer.status(),
            None => Status::Web,
        }
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    /// Builds the handshake for a freshly opened socket and starts the idle countdown.
    pub fn open(&mut self, now: Instant) -> Message {
        self.state = ConnectionState::Connecting;
        self.id = None;
        self.queued.clear();
        self.peers.clear();
        if let Some(timer) = self.presence.as_mut() {
            timer.arm(now);
        }
        Message::Connected(ConnectedData::Handshake(self.config.handshake()))
    }

    pub fn disconnected(&mut self) {
        if self.state != ConnectionState::Disconnected {
            info!("Disconnected");
        }
        self.state = ConnectionState::Disconnected;
        self.queued.clear();
    }

    /// Dispatches one inbound message, or queues it until the snapshot arrives.
    pub fn receive(&mut self, message: Message, handler: &mut dyn ActionHandler) -> Result<()> {
        match self.state {
            ConnectionState::Refused | ConnectionState::Disconnected => {
                debug!("Ignoring {} after close", message.kind());
                Ok(())
            }
            ConnectionState::Connecting => match message {
                Message::Connected(ConnectedData::Welcome(welcome)) => {
                    self.welcome(welcome, handler)
                }
                Message::Connected(ConnectedData::Handshake(_)) => Err(
                    CollaborationError::ProtocolViolation("server sent a handshake".to_string()),
                ),
                Message::Refused => {
                    info!("Server refused the connection");
                    self.state = ConnectionState::Refused;
                    handler.refused();
                    Ok(())
                }
                message => {
                    self.queued.push_back(message);
                    Ok(())
                }
            },
            ConnectionState::Ready => self.dispatch(message, handler),
        }
    }

    fn welcome(&mut self, welcome: Welcome, handler: &mut dyn ActionHandler) -> Result<()> {
        let document = uncompress(welcome.doc)?;
        self.id = Some(welcome.id);

        handler.connected(document, &welcome.chat_history);

        self.peers.clear();
        for info in welcome.users {
            if info.id == welcome.id {
                continue;
            }
            let peer = Peer::from(info);
            handler.joined(&peer, false);
            self.peers.insert(peer.id, peer);
        }

        self.state = ConnectionState::Ready;
        info!(
            "Connected as peer {} with {} others",
            welcome.id,
            self.peers.len()
        );

        while let Some(message) = self.queued.pop_front() {
            self.dispatch(message, handler)?;
        }

        let me = Peer {
            id: welcome.id,
            nick: self.config.nick.clone(),
            group: self.config.group.clone(),
            status: welcome.status,
            cursor: None,
        };
        handler.joined(&me, true);
        Ok(())
    }

    fn dispatch(&mut self, message: Message, handler: &mut dyn ActionHandler) -> Result<()> {
        match message {
            Message::Connected(_) | Message::Refused => {
                warn!("Unexpected {} while connected", message.kind());
            }
            Message::Join(info) => {
                let peer = Peer::from(info);
                handler.joined(&peer, true);
                self.peers.insert(peer.id, peer);
            }
            Message::Leave(data) => {
                if let Some(peer) = self.peers.remove(&data.id) {
                    handler.left(&peer);
                }
            }
            Message::Cursor(data) => self.update_cursor(data.id, handler, |cursor, _| {
                cursor.cursor(data.x, data.y)
            }),
            Message::Selection(data) => self.update_cursor(data.id, handler, |cursor, _| {
                cursor.selection(data.x, data.y)
            }),
            Message::ResizeSelection(data) => self.update_cursor(data.id, handler, |cursor, _| {
                cursor.resize_selection(data.x, data.y)
            }),
            Message::Operation(data) => self.update_cursor(data.id, handler, |cursor, doc| {
                cursor.operation(data.x, data.y, doc)
            }),
            Message::HideCursor(data) => {
                self.update_cursor(data.id, handler, |cursor, _| cursor.hide())
            }
            Message::PasteAsSelection(data) => {
                if data.blocks.is_valid() {
                    let blocks = data.blocks;
                    self.update_cursor(data.id, handler, move |cursor, _| {
                        cursor.paste_as_selection(blocks)
                    });
                } else {
                    warn!("Dropping malformed paste from peer {}", data.id);
                }
            }
            Message::Rotate(data) => self.update_cursor(data.id, handler, |cursor, _| {
                cursor.rotate();
            }),
            Message::FlipX(data) => self.update_cursor(data.id, handler, |cursor, _| {
                cursor.flip_x();
            }),
            Message::FlipY(data) => self.update_cursor(data.id, handler, |cursor, _| {
                cursor.flip_y();
            }),
            Message::Draw(data) => handler.draw(data.x, data.y, data.block),
            Message::Chat(data) => {
                if self.peers.contains_key(&data.id) {
                    handler.chat(&data);
                }
            }
            Message::Status(data) => {
                if let Some(peer) = self.peers.get_mut(&data.id) {
                    peer.status = data.status;
                    handler.status(data.id, data.status);
                }
            }
            Message::Sauce(data) => handler.sauce(&data),
            Message::IceColors(data) => handler.ice_colors(data.id, data.value),
            Message::Use9pxFont(data) => handler.use_9px_font(data.id, data.value),
            Message::ChangeFont(data) => handler.change_font(data.id, &data.font_name),
            Message::SetCanvasSize(data) => {
                handler.set_canvas_size(data.id, data.columns, data.rows)
            }
        }
        Ok(())
    }

    /// Applies `update` to a peer's cursor. Unknown and anonymous peers are ignored.
    fn update_cursor<F>(&mut self, id: PeerId, handler: &mut dyn ActionHandler, update: F)
    where
        F: FnOnce(&mut RemoteCursor, &Document),
    {
        let Some(peer) = self.peers.get_mut(&id) else {
            debug!("Cursor update for unknown peer {}", id);
            return;
        };
        let Some(cursor) = peer.cursor.as_mut() else {
            return;
        };
        update(cursor, handler.document());
        handler.cursor_changed(peer);
    }

    /// Stamps a local action with our id. Returns the frames to send: the
    /// action, then a status change if activity made us active again.
    /// Nothing is sent before the snapshot arrives.
    pub fn outgoing(&mut self, mut message: Message, now: Instant) -> Vec<Message> {
        let Some(id) = self.id.filter(|_| self.is_ready()) else {
            debug!("Not connected; dropping {}", message.kind());
            return Vec::new();
        };
        message.set_sender(id);

        let mut frames = vec![message];
        if let Some(status) = self.presence.as_mut().and_then(|timer| timer.on_activity(now)) {
            frames.push(Message::Status(StatusData { id, status }));
        }
        frames
    }

    /// Status changes whose deadline has passed.
    pub fn poll_presence(&mut self, now: Instant) -> Vec<Message> {
        let Some(id) = self.id.filter(|_| self.is_ready()) else {
            return Vec::new();
        };
        let Some(timer) = self.presence.as_mut() else {
            return Vec::new();
        };
        let mut frames = Vec::new();
        while let Some(status) = timer.poll(now) {
            debug!("Presence now {:?}", status);
            frames.push(Message::Status(StatusData { id, status }));
        }
        frames
    }

    pub fn next_presence_deadline(&self) -> Option<Instant> {
        self.presence.as_ref().and_then(PresenceTimer::next_deadline)
    }
}
