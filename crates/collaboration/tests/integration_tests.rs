/// Multi-peer scenarios: a relay and several client sessions wired together in memory,
/// plus one run over a real socket.
use collaboration::*;
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use textmode::{Cell, Document};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_test::assert_ok;
use tokio_tungstenite::tungstenite::Message as WsMessage;

#[derive(Default)]
struct Log {
    rendered_cells: usize,
    full_renders: usize,
    chat: Vec<String>,
    joins: Vec<(PeerId, bool)>,
    leaves: Vec<PeerId>,
    statuses: Vec<(PeerId, Status)>,
    refused: bool,
    disconnected: bool,
}

#[derive(Clone, Default)]
struct Tap {
    log: Arc<Mutex<Log>>,
    ready: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl Tap {
    fn log(&self) -> std::sync::MutexGuard<'_, Log> {
        self.log.lock().unwrap()
    }
}

impl Renderer for Tap {
    fn render_cell(&mut self, _x: usize, _y: usize, _cell: Cell) {
        self.log().rendered_cells += 1;
    }

    fn render_document(&mut self, _document: &Document) {
        self.log().full_renders += 1;
    }
}

impl Notifier for Tap {
    fn connected(&mut self, _comments: &[String], _chat_history: &[ChatEntry]) {
        if let Some(ready) = self.ready.lock().unwrap().take() {
            let _ = ready.send(());
        }
    }

    fn refused(&mut self) {
        self.log().refused = true;
    }

    fn disconnected(&mut self) {
        self.log().disconnected = true;
    }

    fn join(&mut self, peer: &Peer, announce: bool) {
        self.log().joins.push((peer.id, announce));
    }

    fn leave(&mut self, id: PeerId) {
        self.log().leaves.push(id);
    }

    fn chat(&mut self, chat: &ChatData) {
        self.log().chat.push(chat.text.clone());
    }

    fn status(&mut self, id: PeerId, status: Status) {
        self.log().statuses.push((id, status));
    }
}

struct Client {
    connection: ConnectionId,
    session: ClientSession,
    tap: Tap,
    open: bool,
}

/// Relay plus clients, exchanging frames synchronously.
struct Network {
    relay: Relay,
    clients: Vec<Client>,
    next_connection: u64,
}

impl Network {
    fn new(document: Document, config: RelayConfig) -> Self {
        Self {
            relay: Relay::new(document, config),
            clients: Vec::new(),
            next_connection: 1,
        }
    }

    fn connect(&mut self, config: ClientConfig) -> usize {
        let tap = Tap::default();
        let mut session = ClientSession::new(config, Box::new(tap.clone()), Box::new(tap.clone()));
        session.open(Instant::now());
        self.clients.push(Client {
            connection: ConnectionId(self.next_connection),
            session,
            tap,
            open: true,
        });
        self.next_connection += 1;
        self.pump();
        self.clients.len() - 1
    }

    fn disconnect(&mut self, index: usize) {
        let connection = self.clients[index].connection;
        self.clients[index].open = false;
        self.clients[index].session.disconnected();
        let deliveries = self.relay.leave(connection);
        self.deliver(deliveries);
        self.pump();
    }

    /// Moves frames until every outbox is empty.
    fn pump(&mut self) {
        loop {
            let mut moved = false;
            for index in 0..self.clients.len() {
                if !self.clients[index].open {
                    continue;
                }
                let connection = self.clients[index].connection;
                for message in self.clients[index].session.take_outgoing() {
                    moved = true;
                    let text = message.encode().unwrap();
                    let deliveries = self.relay.handle_text(connection, &text);
                    self.deliver(deliveries);
                }
            }
            if !moved {
                break;
            }
        }
        for client in &mut self.clients {
            client.session.run_pending_renders();
        }
    }

    fn deliver(&mut self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            match delivery {
                Delivery::Send { to, text } => {
                    if let Some(client) = self
                        .clients
                        .iter_mut()
                        .find(|client| client.connection == to && client.open)
                    {
                        client.session.receive_text(&text).unwrap();
                    }
                }
                Delivery::Close { to } => {
                    if let Some(client) = self.clients.iter_mut().find(|client| client.connection == to) {
                        client.open = false;
                        client.session.disconnected();
                    }
                }
            }
        }
    }

    fn session(&mut self, index: usize) -> &mut ClientSession {
        &mut self.clients[index].session
    }

    fn id(&self, index: usize) -> PeerId {
        self.clients[index].session.connection().id().unwrap()
    }
}

fn paint(session: &mut ClientSession, x: usize, y: usize, code: u8) {
    assert_ok!(session.edit(|editor, observer| {
        editor.change_data(x, y, Cell::new(code, 7, 0), None, observer)
    }));
}

#[test]
fn test_actions_before_snapshot_apply_in_order() {
    let tap = Tap::default();
    let mut session = ClientSession::new(
        ClientConfig::new("me"),
        Box::new(tap.clone()),
        Box::new(tap.clone()),
    );
    session.open(Instant::now());

    let join = Message::Join(PeerInfo {
        id: PeerId(2),
        nick: Some("p2".to_string()),
        group: None,
        status: Status::Active,
    });
    let welcome = Message::Connected(ConnectedData::Welcome(Welcome {
        id: PeerId(1),
        status: Status::Active,
        doc: textmode::compress(&Document::default()),
        chat_history: Vec::new(),
        users: Vec::new(),
    }));
    let cursor = Message::Cursor(PointData {
        id: PeerId(2),
        x: 3,
        y: 4,
    });

    assert_ok!(session.receive(join));
    assert!(session.connection().peer(PeerId(2)).is_none());
    assert_ok!(session.receive(welcome));
    assert_ok!(session.receive(cursor));

    let peer = session.connection().peer(PeerId(2)).unwrap();
    let remote = peer.cursor.as_ref().unwrap();
    assert_eq!((remote.x, remote.y), (3, 4));
    assert!(!remote.hidden);
    assert_eq!(tap.log().joins, vec![(PeerId(2), true), (PeerId(1), true)]);
}

#[test]
fn test_draws_converge_on_every_peer() {
    let mut network = Network::new(Document::new(16, 8).unwrap(), RelayConfig::default());
    let a = network.connect(ClientConfig::new("a"));
    let b = network.connect(ClientConfig::new("b"));

    paint(network.session(a), 1, 1, 65);
    network.pump();
    paint(network.session(b), 1, 1, 66);
    paint(network.session(a), 2, 1, 67);
    network.pump();

    let expected = network.relay.document().cells().to_vec();
    assert_eq!(network.session(a).document().cells(), expected.as_slice());
    assert_eq!(network.session(b).document().cells(), expected.as_slice());
    assert_eq!(network.relay.document().at(1, 1).unwrap().code, 66);
}

#[test]
fn test_observer_follows_relay_order_for_concurrent_draws() {
    let mut network = Network::new(Document::new(16, 8).unwrap(), RelayConfig::default());
    let a = network.connect(ClientConfig::new("a"));
    let b = network.connect(ClientConfig::new("b"));
    let c = network.connect(ClientConfig::new("c"));

    // Both writes are in flight before either reaches the relay.
    paint(network.session(a), 3, 2, 65);
    paint(network.session(b), 3, 2, 66);
    paint(network.session(a), 4, 2, 67);
    network.pump();

    let final_value = network.relay.document().at(3, 2).unwrap();
    assert_eq!(final_value.code, 66);
    assert_eq!(network.session(c).document().at(3, 2).unwrap(), final_value);
    let relay_cells = network.relay.document().cells().to_vec();
    assert_eq!(
        network.session(c).document().cells(),
        relay_cells.as_slice()
    );
}

#[test]
fn test_undo_travels_as_draws() {
    let mut network = Network::new(Document::new(8, 4).unwrap(), RelayConfig::default());
    let a = network.connect(ClientConfig::new("a"));
    let b = network.connect(ClientConfig::new("b"));

    assert_ok!(network.session(a).edit(|editor, observer| {
        editor.start_undo(observer);
        editor.change_data(0, 0, Cell::new(66, 7, 0), None, observer)?;
        editor.change_data(0, 0, Cell::new(67, 7, 0), None, observer)
    }));
    network.pump();
    assert_eq!(network.session(b).document().at(0, 0).unwrap().code, 67);

    assert!(network.session(a).undo().unwrap());
    network.pump();
    assert_eq!(network.session(b).document().at(0, 0).unwrap(), Cell::BLANK);
    assert_eq!(network.relay.document().at(0, 0).unwrap(), Cell::BLANK);

    assert!(network.session(a).redo().unwrap());
    network.pump();
    assert_eq!(network.session(b).document().at(0, 0).unwrap().code, 67);
}

#[test]
fn test_late_joiner_sees_current_canvas() {
    let mut network = Network::new(Document::new(8, 4).unwrap(), RelayConfig::default());
    let a = network.connect(ClientConfig::new("a"));

    assert_ok!(network.session(a).resize(12, 6));
    paint(network.session(a), 11, 5, 70);
    network.session(a).set_font_name("Topaz");
    network.session(a).chat("hello");
    network.pump();

    let b = network.connect(ClientConfig::new("b"));
    let document = network.session(b).document();
    assert_eq!((document.columns(), document.rows()), (12, 6));
    assert_eq!(document.at(11, 5).unwrap().code, 70);
    assert_eq!(document.font_name, "Topaz");
    assert!(network.clients[b].tap.log().full_renders >= 1);
}

#[test]
fn test_remote_selection_is_normalized() {
    let mut network = Network::new(Document::new(8, 8).unwrap(), RelayConfig::default());
    let a = network.connect(ClientConfig::new("a"));
    let b = network.connect(ClientConfig::new("b"));
    let a_id = network.id(a);

    network.session(a).cursor(5, 5);
    network.session(a).selection(2, 1);
    network.pump();

    let peer = network.session(b).connection().peer(a_id).unwrap();
    let rect = peer.cursor.as_ref().unwrap().selection_rect();
    assert_eq!((rect.sx, rect.sy, rect.dx, rect.dy), (2, 1, 5, 5));
}

#[test]
fn test_remote_operation_carries_selected_cells() {
    let mut network = Network::new(Document::new(8, 8).unwrap(), RelayConfig::default());
    let a = network.connect(ClientConfig::new("a"));
    let b = network.connect(ClientConfig::new("b"));
    let a_id = network.id(a);

    paint(network.session(a), 0, 0, 65);
    paint(network.session(a), 1, 0, 66);
    network.session(a).cursor(0, 0);
    network.session(a).selection(1, 0);
    network.session(a).operation(4, 4);
    network.session(a).flip_x();
    network.pump();

    let peer = network.session(b).connection().peer(a_id).unwrap();
    let cursor = peer.cursor.as_ref().unwrap();
    assert_eq!(cursor.mode, CursorMode::Operation);
    let buffer = cursor.operation_buffer.as_ref().unwrap();
    assert_eq!(buffer.at(0, 0).unwrap().code, 66);
    assert_eq!(buffer.at(1, 0).unwrap().code, 65);
}

#[test]
fn test_wrong_password_is_refused() {
    let config = RelayConfig {
        pass: Some("secret".to_string()),
        ..RelayConfig::default()
    };
    let mut network = Network::new(Document::default(), config);
    let intruder = network.connect(ClientConfig::new("x").with_pass("guess"));
    let member = network.connect(ClientConfig::new("y").with_pass("secret"));

    assert_eq!(network.session(intruder).state(), ConnectionState::Refused);
    assert!(network.clients[intruder].tap.log().refused);
    assert_eq!(network.session(member).state(), ConnectionState::Ready);
    assert_eq!(network.relay.peer_count(), 1);
}

#[test]
fn test_leave_removes_remote_peer() {
    let mut network = Network::new(Document::default(), RelayConfig::default());
    let a = network.connect(ClientConfig::new("a"));
    let b = network.connect(ClientConfig::new("b"));
    let b_id = network.id(b);

    assert!(network.session(a).connection().peer(b_id).is_some());
    network.disconnect(b);

    assert!(network.session(a).connection().peer(b_id).is_none());
    assert_eq!(network.clients[a].tap.log().leaves, vec![b_id]);
}

#[test]
fn test_chat_reaches_others_and_echoes_locally() {
    let mut network = Network::new(Document::default(), RelayConfig::default());
    let a = network.connect(ClientConfig::new("a"));
    let b = network.connect(ClientConfig::new("b"));

    network.session(a).chat("hi there");
    network.pump();

    assert_eq!(network.clients[a].tap.log().chat, vec!["hi there"]);
    assert_eq!(network.clients[b].tap.log().chat, vec!["hi there"]);
}

#[test]
fn test_idle_status_reaches_peers() {
    let mut network = Network::new(Document::default(), RelayConfig::default());
    let a = network.connect(ClientConfig::new("a"));
    let b = network.connect(ClientConfig::new("b"));
    let a_id = network.id(a);

    network
        .session(a)
        .poll_presence(Instant::now() + Duration::from_secs(61));
    network.pump();

    assert_eq!(
        network.session(b).connection().peer(a_id).unwrap().status,
        Status::Idle
    );
    assert_eq!(
        network.clients[b].tap.log().statuses,
        vec![(a_id, Status::Idle)]
    );

    network.session(a).cursor(0, 0);
    network.pump();
    assert_eq!(
        network.session(b).connection().peer(a_id).unwrap().status,
        Status::Active
    );
}

#[tokio::test]
async fn test_client_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut relay = Relay::new(Document::new(8, 4).unwrap(), RelayConfig::default());
        let connection = ConnectionId(1);

        while let Some(Ok(frame)) = ws.next().await {
            let WsMessage::Text(text) = frame else {
                continue;
            };
            for delivery in relay.handle_text(connection, &text) {
                if let Delivery::Send { to, text } = delivery {
                    if to == connection {
                        ws.send(WsMessage::Text(text.to_string())).await.unwrap();
                    }
                }
            }
        }
        relay.document().clone()
    });

    let (ready_tx, ready_rx) = oneshot::channel();
    let tap = Tap {
        ready: Arc::new(Mutex::new(Some(ready_tx))),
        ..Tap::default()
    };
    let mut session = ClientSession::new(
        ClientConfig::new("socket"),
        Box::new(tap.clone()),
        Box::new(tap.clone()),
    );

    let (commands, commands_rx) = mpsc::unbounded_channel::<SessionCommand>();
    let driver = tokio::spawn(async move {
        ready_rx.await.unwrap();
        commands
            .send(Box::new(|session: &mut ClientSession| {
                paint(session, 3, 2, 88);
            }))
            .unwrap();
    });

    let url = format!("ws://{}", addr);
    assert_ok!(run(&url, &mut session, commands_rx).await);
    driver.await.unwrap();

    let document = server.await.unwrap();
    assert_eq!(document.at(3, 2).unwrap().code, 88);
    assert_eq!(session.document().at(3, 2).unwrap().code, 88);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(tap.log().disconnected);
}

#[tokio::test]
async fn test_refused_handshake_ends_run() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let config = RelayConfig {
            pass: Some("secret".to_string()),
            ..RelayConfig::default()
        };
        let mut relay = Relay::new(Document::new(8, 4).unwrap(), config);

        while let Some(Ok(frame)) = ws.next().await {
            let WsMessage::Text(text) = frame else {
                continue;
            };
            for delivery in relay.handle_text(ConnectionId(1), &text) {
                if let Delivery::Send { text, .. } = delivery {
                    ws.send(WsMessage::Text(text.to_string())).await.unwrap();
                }
            }
        }
        relay.peer_count()
    });

    let tap = Tap::default();
    let mut session = ClientSession::new(
        ClientConfig::new("intruder"),
        Box::new(tap.clone()),
        Box::new(tap.clone()),
    );
    let (_commands, commands_rx) = mpsc::unbounded_channel::<SessionCommand>();

    let url = format!("ws://{}", addr);
    let result = run(&url, &mut session, commands_rx).await;
    assert!(matches!(result, Err(CollaborationError::Refused)));
    assert!(tap.log().refused);
    assert_eq!(server.await.unwrap(), 0);
}
