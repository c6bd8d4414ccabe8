/// Client session: the connection, the local editor and the UI sinks it
/// drives, owned together and passed around explicitly.
use std::collections::VecDeque;
use std::time::Instant;
use textmode::{BlockRegion, Cell, Document, DocumentObserver, Editor};
use tracing::warn;

use crate::{
    ActionHandler, CanvasSizeData, ChatData, ChatEntry, ClientConfig, ConnectionState, DrawData,
    FlagData, FontData, Message, PasteData, Peer, PeerConnection, PeerId, PeerRef, PointData, Result,
    SauceData, Status,
};

/// Draws the canvas and remote cursors.
pub trait Renderer: Send {
    fn render_cell(&mut self, x: usize, y: usize, cell: Cell);

    /// Full redraw, e.g. after a new snapshot, a resize or a font change.
    fn render_document(&mut self, document: &Document);

    fn render_cursor(&mut self, _peer: &Peer) {}

    fn remove_cursor(&mut self, _id: PeerId) {}
}

/// Chat pane, status bar and menu state.
pub trait Notifier: Send {
    fn connected(&mut self, _comments: &[String], _chat_history: &[ChatEntry]) {}
    fn refused(&mut self) {}
    fn disconnected(&mut self) {}
    fn join(&mut self, _peer: &Peer, _announce: bool) {}
    fn leave(&mut self, _id: PeerId) {}
    fn chat(&mut self, _chat: &ChatData) {}
    fn status(&mut self, _id: PeerId, _status: Status) {}
    fn sauce(&mut self, _sauce: &SauceData) {}
    fn ice_colors(&mut self, _id: PeerId, _value: bool) {}
    fn use_9px_font(&mut self, _id: PeerId, _value: bool) {}
    fn change_font(&mut self, _id: PeerId, _font_name: &str) {}
    fn set_canvas_size(&mut self, _id: PeerId, _columns: usize, _rows: usize) {}
    /// The local caret should move, e.g. after an undo.
    fn cursor_moved(&mut self, _x: usize, _y: usize) {}
    fn history_changed(&mut self, _can_undo: bool, _can_redo: bool) {}
    fn document_modified(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderJob {
    Document,
    Cursors,
}

/// Deferred bulk redraws. Repeated requests for the same job coalesce.
#[derive(Debug, Default)]
pub struct RenderQueue {
    jobs: VecDeque<RenderJob>,
}

impl RenderQueue {
    pub fn push(&mut self, job: RenderJob) {
        if !self.jobs.contains(&job) {
            self.jobs.push_back(job);
        }
    }

    pub fn pop(&mut self) -> Option<RenderJob> {
        self.jobs.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

pub struct ClientSession {
    connection: PeerConnection,
    editor: Editor,
    renderer: Box<dyn Renderer>,
    notifier: Box<dyn Notifier>,
    renders: RenderQueue,
    outbox: VecDeque<Message>,
}

impl ClientSession {
    pub fn new(config: ClientConfig, renderer: Box<dyn Renderer>, notifier: Box<dyn Notifier>) -> Self {
        let mut editor = Editor::new(Document::default());
        editor.set_collaborative(true);
        Self {
            connection: PeerConnection::new(config),
            editor,
            renderer,
            notifier,
            renders: RenderQueue::default(),
            outbox: VecDeque::new(),
        }
    }

    pub fn connection(&self) -> &PeerConnection {
        &self.connection
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn document(&self) -> &Document {
        self.editor.document()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Queues the handshake for a newly opened socket.
    pub fn open(&mut self, now: Instant) {
        let handshake = self.connection.open(now);
        self.outbox.push_back(handshake);
    }

    pub fn disconnected(&mut self) {
        self.connection.disconnected();
        self.outbox.clear();
        self.notifier.disconnected();
    }

    pub fn receive_text(&mut self, text: &str) -> Result<()> {
        let message = Message::decode(text)?;
        self.receive(message)
    }

    pub fn receive(&mut self, message: Message) -> Result<()> {
        let mut dispatch = Dispatch {
            editor: &mut self.editor,
            sinks: Sinks {
                renderer: self.renderer.as_mut(),
                notifier: self.notifier.as_mut(),
            },
            renders: &mut self.renders,
        };
        self.connection.receive(message, &mut dispatch)
    }

    /// Frames waiting to go out, in order.
    pub fn take_outgoing(&mut self) -> Vec<Message> {
        self.outbox.drain(..).collect()
    }

    pub fn poll_presence(&mut self, now: Instant) {
        let frames = self.connection.poll_presence(now);
        self.outbox.extend(frames);
    }

    pub fn next_presence_deadline(&self) -> Option<Instant> {
        self.connection.next_presence_deadline()
    }

    pub fn has_pending_renders(&self) -> bool {
        !self.renders.is_empty()
    }

    /// Performs queued bulk redraws. Returns whether anything was drawn.
    pub fn run_pending_renders(&mut self) -> bool {
        let mut ran = false;
        while let Some(job) = self.renders.pop() {
            match job {
                RenderJob::Document => self.renderer.render_document(self.editor.document()),
                RenderJob::Cursors => {
                    for peer in self.connection.peers() {
                        self.renderer.render_cursor(peer);
                    }
                }
            }
            ran = true;
        }
        ran
    }

    fn send(&mut self, message: Message) {
        self.send_at(message, Instant::now());
    }

    fn send_at(&mut self, message: Message, now: Instant) {
        let frames = self.connection.outgoing(message, now);
        self.outbox.extend(frames);
    }

    pub fn cursor(&mut self, x: usize, y: usize) {
        self.send(Message::Cursor(PointData { id: PeerId::default(), x, y }));
    }

    pub fn selection(&mut self, x: usize, y: usize) {
        self.send(Message::Selection(PointData { id: PeerId::default(), x, y }));
    }

    pub fn resize_selection(&mut self, x: usize, y: usize) {
        self.send(Message::ResizeSelection(PointData { id: PeerId::default(), x, y }));
    }

    pub fn operation(&mut self, x: usize, y: usize) {
        self.send(Message::Operation(PointData { id: PeerId::default(), x, y }));
    }

    pub fn hide_cursor(&mut self) {
        self.send(Message::HideCursor(PeerRef::default()));
    }

    pub fn paste_as_selection(&mut self, blocks: BlockRegion) {
        self.send(Message::PasteAsSelection(PasteData {
            id: PeerId::default(),
            blocks,
        }));
    }

    pub fn rotate(&mut self) {
        self.send(Message::Rotate(PeerRef::default()));
    }

    pub fn flip_x(&mut self) {
        self.send(Message::FlipX(PeerRef::default()));
    }

    pub fn flip_y(&mut self) {
        self.send(Message::FlipY(PeerRef::default()));
    }

    /// Sends a chat line and echoes it locally; the server does not echo.
    pub fn chat(&mut self, text: impl Into<String>) {
        let config = self.connection.config();
        let mut chat = ChatData {
            id: PeerId::default(),
            nick: config.nick.clone(),
            group: config.group.clone(),
            text: text.into(),
        };
        if let Some(id) = self.connection.id() {
            chat.id = id;
            self.notifier.chat(&chat);
        }
        self.send(Message::Chat(chat));
    }

    pub fn set_sauce(&mut self, title: String, author: String, group: String, comments: Vec<String>) {
        self.editor
            .set_sauce(title.clone(), author.clone(), group.clone(), comments.clone());
        let sauce = SauceData {
            id: PeerId::default(),
            title,
            author,
            group,
            comments,
        };
        self.notifier.sauce(&sauce);
        self.send(Message::Sauce(sauce));
    }

    pub fn set_ice_colors(&mut self, value: bool) {
        self.editor.set_ice_colors(value);
        self.send(Message::IceColors(FlagData { id: PeerId::default(), value }));
    }

    pub fn set_use_9px_font(&mut self, value: bool) {
        self.editor.set_use_9px_font(value);
        self.renders.push(RenderJob::Document);
        self.renders.push(RenderJob::Cursors);
        self.send(Message::Use9pxFont(FlagData { id: PeerId::default(), value }));
    }

    pub fn set_font_name(&mut self, font_name: impl Into<String>) {
        let font_name = font_name.into();
        self.editor.set_font_name(font_name.clone());
        self.renders.push(RenderJob::Document);
        self.renders.push(RenderJob::Cursors);
        self.send(Message::ChangeFont(FontData {
            id: PeerId::default(),
            font_name,
        }));
    }

    pub fn resize(&mut self, columns: usize, rows: usize) -> Result<()> {
        let mut sinks = Sinks {
            renderer: self.renderer.as_mut(),
            notifier: self.notifier.as_mut(),
        };
        self.editor.resize(columns, rows, &mut sinks)?;
        self.renders.push(RenderJob::Document);
        self.send(Message::SetCanvasSize(CanvasSizeData {
            id: PeerId::default(),
            columns,
            rows,
        }));
        Ok(())
    }

    /// Runs a document mutation. Every written cell is rendered and sent as a draw.
    pub fn edit<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Editor, &mut dyn DocumentObserver) -> textmode::Result<T>,
    {
        let mut local = LocalEdit {
            sinks: Sinks {
                renderer: self.renderer.as_mut(),
                notifier: self.notifier.as_mut(),
            },
            connection: &mut self.connection,
            outbox: &mut self.outbox,
            now: Instant::now(),
        };
        Ok(f(&mut self.editor, &mut local)?)
    }

    pub fn undo(&mut self) -> Result<bool> {
        self.edit(|editor, observer| editor.undo(observer))
    }

    pub fn redo(&mut self) -> Result<bool> {
        self.edit(|editor, observer| editor.redo(observer))
    }
}

/// Renders and notifies, never broadcasts.
struct Sinks<'a> {
    renderer: &'a mut dyn Renderer,
    notifier: &'a mut dyn Notifier,
}

impl DocumentObserver for Sinks<'_> {
    fn render_cell(&mut self, x: usize, y: usize, cell: Cell) {
        self.renderer.render_cell(x, y, cell);
    }

    fn cursor_moved(&mut self, x: usize, y: usize) {
        self.notifier.cursor_moved(x, y);
    }

    fn history_changed(&mut self, can_undo: bool, can_redo: bool) {
        self.notifier.history_changed(can_undo, can_redo);
    }

    fn document_modified(&mut self) {
        self.notifier.document_modified();
    }
}

/// Observer for local edits: writes also leave as draws.
struct LocalEdit<'a> {
    sinks: Sinks<'a>,
    connection: &'a mut PeerConnection,
    outbox: &'a mut VecDeque<Message>,
    now: Instant,
}

impl DocumentObserver for LocalEdit<'_> {
    fn render_cell(&mut self, x: usize, y: usize, cell: Cell) {
        self.sinks.render_cell(x, y, cell);
    }

    fn broadcast_cell(&mut self, x: usize, y: usize, block: Cell) {
        let draw = Message::Draw(DrawData {
            id: PeerId::default(),
            x,
            y,
            block,
        });
        let frames = self.connection.outgoing(draw, self.now);
        self.outbox.extend(frames);
    }

    fn cursor_moved(&mut self, x: usize, y: usize) {
        self.sinks.cursor_moved(x, y);
    }

    fn history_changed(&mut self, can_undo: bool, can_redo: bool) {
        self.sinks.history_changed(can_undo, can_redo);
    }

    fn document_modified(&mut self) {
        self.sinks.document_modified();
    }
}

/// Applies dispatched remote actions to the session.
struct Dispatch<'a> {
    editor: &'a mut Editor,
    sinks: Sinks<'a>,
    renders: &'a mut RenderQueue,
}

impl ActionHandler for Dispatch<'_> {
    fn document(&self) -> &Document {
        self.editor.document()
    }

    fn connected(&mut self, document: Document, chat_history: &[ChatEntry]) {
        self.sinks.notifier.connected(&document.comments, chat_history);
        self.editor.load(document, &mut self.sinks);
        self.renders.push(RenderJob::Document);
        self.renders.push(RenderJob::Cursors);
    }

    fn draw(&mut self, x: usize, y: usize, cell: Cell) {
        if let Err(e) = self.editor.apply_remote_draw(x, y, cell, &mut self.sinks) {
            warn!("Dropping remote draw: {}", e);
        }
    }

    fn sauce(&mut self, sauce: &SauceData) {
        self.editor.set_sauce(
            sauce.title.clone(),
            sauce.author.clone(),
            sauce.group.clone(),
            sauce.comments.clone(),
        );
        self.sinks.notifier.sauce(sauce);
    }

    fn ice_colors(&mut self, id: PeerId, value: bool) {
        self.editor.set_ice_colors(value);
        self.sinks.notifier.ice_colors(id, value);
    }

    fn use_9px_font(&mut self, id: PeerId, value: bool) {
        self.editor.set_use_9px_font(value);
        self.renders.push(RenderJob::Document);
        self.renders.push(RenderJob::Cursors);
        self.sinks.notifier.use_9px_font(id, value);
    }

    fn change_font(&mut self, id: PeerId, font_name: &str) {
        self.editor.set_font_name(font_name.to_string());
        self.renders.push(RenderJob::Document);
        self.renders.push(RenderJob::Cursors);
        self.sinks.notifier.change_font(id, font_name);
    }

    fn set_canvas_size(&mut self, id: PeerId, columns: usize, rows: usize) {
        if let Err(e) = self.editor.resize(columns, rows, &mut self.sinks) {
            warn!("Ignoring canvas size from peer {}: {}", id, e);
            return;
        }
        self.renders.push(RenderJob::Document);
        self.sinks.notifier.set_canvas_size(id, columns, rows);
    }

    fn refused(&mut self) {
        self.sinks.notifier.refused();
    }

    fn joined(&mut self, peer: &Peer, announce: bool) {
        self.sinks.notifier.join(peer, announce);
    }

    fn left(&mut self, peer: &Peer) {
        self.sinks.renderer.remove_cursor(peer.id);
        self.sinks.notifier.leave(peer.id);
    }

    fn cursor_changed(&mut self, peer: &Peer) {
        self.sinks.renderer.render_cursor(peer);
    }

    fn chat(&mut self, chat: &ChatData) {
        self.sinks.notifier.chat(chat);
    }

    fn status(&mut self, id: PeerId, status: Status) {
        self.sinks.notifier.status(id, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_queue_coalesces() {
        let mut queue = RenderQueue::default();
        queue.push(RenderJob::Document);
        queue.push(RenderJob::Cursors);
        queue.push(RenderJob::Document);
        assert_eq!(queue.pop(), Some(RenderJob::Document));
        assert_eq!(queue.pop(), Some(RenderJob::Cursors));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }
}
