/// WebSocket transport for a [`ClientSession`].
use futures::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::{ClientSession, CollaborationError, ConnectionState, Result};

/// A local action to run against the session from the UI side.
pub type SessionCommand = Box<dyn FnOnce(&mut ClientSession) + Send>;

/// Drives one connection until the socket closes. Inbound frames are handled
/// strictly in arrival order; queued redraws only run when nothing else is ready.
/// There is no reconnect: the session is marked disconnected on return.
/// A refused handshake ends the run with [`CollaborationError::Refused`].
pub async fn run(
    url: &str,
    session: &mut ClientSession,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
) -> Result<()> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| CollaborationError::NetworkError(e.to_string()))?;
    info!("Connected to {}", url);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    session.open(Instant::now());

    let result = 'session: loop {
        for message in session.take_outgoing() {
            let text = match message.encode() {
                Ok(text) => text,
                Err(e) => break 'session Err(e),
            };
            if let Err(e) = ws_sender.send(WsMessage::Text(text)).await {
                break 'session Err(CollaborationError::NetworkError(e.to_string()));
            }
        }

        let wake = session
            .next_presence_deadline()
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            biased;

            frame = ws_receiver.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Err(e) = session.receive_text(&text) {
                        error!("Protocol error: {}", e);
                        break 'session Err(e);
                    }
                    if session.state() == ConnectionState::Refused {
                        break 'session Err(CollaborationError::Refused);
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Server closed the connection");
                    break 'session Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Connection error: {}", e);
                    break 'session Err(CollaborationError::NetworkError(e.to_string()));
                }
            },

            command = commands.recv() => match command {
                Some(command) => command(session),
                None => {
                    debug!("Command channel closed");
                    break 'session Ok(());
                }
            },

            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(wake)) => {
                session.poll_presence(Instant::now());
            }

            _ = std::future::ready(()), if session.has_pending_renders() => {
                session.run_pending_renders();
            }
        }
    };

    let _ = ws_sender.close().await;
    session.disconnected();
    result
}
