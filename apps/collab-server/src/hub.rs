use collaboration::{ConnectionId, Delivery, Relay};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use textmode::Document;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub type Outbound = mpsc::Sender<Arc<str>>;

#[derive(Debug)]
pub enum HubEvent {
    Opened {
        connection: ConnectionId,
        outbound: Outbound,
    },
    Text {
        connection: ConnectionId,
        text: String,
    },
    Closed {
        connection: ConnectionId,
    },
    Shutdown,
}

/// Owns the relay. Every inbound frame from every connection goes through
/// this one task, which fixes the order of writes to the document.
pub struct Hub {
    relay: Relay,
    connections: HashMap<ConnectionId, Outbound>,
    path: PathBuf,
    save_interval: Duration,
    /// At most one save is in flight; they share the temporary file.
    saving: Option<JoinHandle<anyhow::Result<()>>>,
}

impl Hub {
    pub fn new(relay: Relay, path: PathBuf, save_interval: Duration) -> Self {
        Self {
            relay,
            connections: HashMap::new(),
            path,
            save_interval,
            saving: None,
        }
    }

    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<HubEvent>) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.save_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(HubEvent::Shutdown) | None => break,
                    Some(event) => self.handle(event),
                },
                _ = ticker.tick() => self.save_in_background().await,
            }
        }

        info!("Shutting down; saving {}", self.path.display());
        self.connections.clear();
        if let Some(handle) = self.saving.take() {
            self.settle(handle).await;
        }
        save(self.relay.document().clone(), self.path.clone()).await
    }

    fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Opened {
                connection,
                outbound,
            } => {
                debug!("Connection {} opened", connection);
                self.connections.insert(connection, outbound);
            }
            HubEvent::Text { connection, text } => {
                let deliveries = self.relay.handle_text(connection, &text);
                self.deliver(deliveries);
            }
            HubEvent::Closed { connection } => {
                debug!("Connection {} closed", connection);
                self.connections.remove(&connection);
                let deliveries = self.relay.leave(connection);
                self.deliver(deliveries);
            }
            HubEvent::Shutdown => {}
        }
    }

    /// Hands frames to writer tasks without waiting. A connection whose queue
    /// is full or gone is dropped, which may produce further deliveries.
    fn deliver(&mut self, deliveries: Vec<Delivery>) {
        let mut pending: VecDeque<Delivery> = deliveries.into();
        while let Some(delivery) = pending.pop_front() {
            let dropped = match delivery {
                Delivery::Send { to, text } => match self.connections.get(&to) {
                    Some(outbound) => match outbound.try_send(text) {
                        Ok(()) => None,
                        Err(TrySendError::Full(_)) => {
                            warn!("Outbound queue full for {}; dropping peer", to);
                            Some(to)
                        }
                        Err(TrySendError::Closed(_)) => Some(to),
                    },
                    None => None,
                },
                Delivery::Close { to } => Some(to),
            };

            if let Some(connection) = dropped {
                // Dropping the sender ends the writer task, which closes the socket.
                if self.connections.remove(&connection).is_some() {
                    pending.extend(self.relay.leave(connection));
                }
            }
        }
    }

    async fn save_in_background(&mut self) {
        if let Some(handle) = self.saving.take() {
            if !handle.is_finished() {
                debug!("Previous save still running; skipping this one");
                self.saving = Some(handle);
                return;
            }
            self.settle(handle).await;
        }
        if !self.relay.take_modified() {
            return;
        }
        let document = self.relay.document().clone();
        let path = self.path.clone();
        self.saving = Some(tokio::spawn(save(document, path)));
    }

    /// Waits for a background save. A failed one leaves the document dirty
    /// so the next tick writes it again.
    async fn settle(&mut self, handle: JoinHandle<anyhow::Result<()>>) {
        let failed = match handle.await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                error!("Periodic save failed: {}", e);
                true
            }
            Err(e) => {
                error!("Periodic save task failed: {}", e);
                true
            }
        };
        if failed {
            self.relay.mark_modified();
        }
    }
}

async fn save(document: Document, path: PathBuf) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || textmode::write_file(&document, &path)).await??;
    info!("Saved document");
    Ok(())
}

/// Reads the document at `path`, or creates a blank one if there is none.
pub fn load_or_create(path: &std::path::Path) -> anyhow::Result<Document> {
    if path.exists() {
        let document = textmode::read_file(path)?;
        info!(
            "Loaded {}x{} document from {}",
            document.columns(),
            document.rows(),
            path.display()
        );
        Ok(document)
    } else {
        info!("No document at {}; starting blank", path.display());
        let document = Document::default();
        textmode::write_file(&document, path)?;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collaboration::{ConnectedData, Handshake, Message, RelayConfig};

    fn handshake(nick: &str) -> String {
        Message::Connected(ConnectedData::Handshake(Handshake {
            nick: Some(nick.to_string()),
            ..Handshake::default()
        }))
        .encode()
        .unwrap()
    }

    fn hub(path: PathBuf) -> Hub {
        Hub::new(
            Relay::new(Document::new(4, 4).unwrap(), RelayConfig::default()),
            path,
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn test_welcome_reaches_joining_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = hub(dir.path().join("doc.json"));
        let (tx, mut rx) = mpsc::channel(8);
        hub.handle(HubEvent::Opened {
            connection: ConnectionId(1),
            outbound: tx,
        });
        hub.handle(HubEvent::Text {
            connection: ConnectionId(1),
            text: handshake("a"),
        });

        let frame = rx.recv().await.unwrap();
        assert!(matches!(
            Message::decode(&frame).unwrap(),
            Message::Connected(ConnectedData::Welcome(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_peer_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = hub(dir.path().join("doc.json"));
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        let (slow_tx, mut slow_rx) = mpsc::channel(1);

        hub.handle(HubEvent::Opened {
            connection: ConnectionId(1),
            outbound: fast_tx,
        });
        hub.handle(HubEvent::Text {
            connection: ConnectionId(1),
            text: handshake("fast"),
        });
        hub.handle(HubEvent::Opened {
            connection: ConnectionId(2),
            outbound: slow_tx,
        });
        // The welcome fills the slow queue.
        hub.handle(HubEvent::Text {
            connection: ConnectionId(2),
            text: handshake("slow"),
        });
        hub.handle(HubEvent::Text {
            connection: ConnectionId(1),
            text: r#"{"type":"hide_cursor","data":{"id":0}}"#.to_string(),
        });

        assert_eq!(hub.relay.peer_count(), 1);
        assert!(!hub.connections.contains_key(&ConnectionId(2)));

        let mut kinds = Vec::new();
        while let Ok(frame) = fast_rx.try_recv() {
            kinds.push(Message::decode(&frame).unwrap().kind());
        }
        assert_eq!(kinds, vec!["connected", "join", "leave"]);

        // The welcome is still delivered, then the queue ends.
        assert!(slow_rx.recv().await.is_some());
        assert!(slow_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_saves_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let hub = hub(path.clone());
        let (events, rx) = mpsc::unbounded_channel();
        events.send(HubEvent::Shutdown).unwrap();

        hub.run(rx).await.unwrap();
        let saved = textmode::read_file(&path).unwrap();
        assert_eq!((saved.columns(), saved.rows()), (4, 4));
    }

    #[test]
    fn test_load_or_create_writes_blank_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.json");
        let document = load_or_create(&path).unwrap();
        assert_eq!((document.columns(), document.rows()), (80, 25));
        assert!(path.exists());
        assert_eq!(load_or_create(&path).unwrap(), document);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_document_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let mut hub = hub(dir.path().join("missing").join("doc.json"));
        hub.relay.mark_modified();

        hub.save_in_background().await;
        let handle = hub.saving.take().unwrap();
        hub.settle(handle).await;
        assert!(hub.relay.take_modified());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_running_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let mut hub = hub(path.clone());
        hub.relay.mark_modified();

        hub.save_in_background().await;
        assert!(hub.saving.is_some());
        // Nothing changed since, so no second save starts.
        hub.save_in_background().await;

        let (events, rx) = mpsc::unbounded_channel();
        events.send(HubEvent::Shutdown).unwrap();
        hub.run(rx).await.unwrap();
        assert!(textmode::read_file(&path).is_ok());
    }
}
