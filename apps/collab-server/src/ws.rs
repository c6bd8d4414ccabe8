use collaboration::ConnectionId;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::hub::HubEvent;

/// Accepts sockets until `shutdown` resolves, numbering each connection.
pub async fn accept_loop<F>(
    listener: TcpListener,
    events: mpsc::UnboundedSender<HubEvent>,
    outbound_capacity: usize,
    shutdown: F,
) where
    F: Future,
{
    tokio::pin!(shutdown);
    let mut next_connection = 0u64;
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    next_connection += 1;
                    tokio::spawn(handle_connection(
                        stream,
                        addr,
                        ConnectionId(next_connection),
                        events.clone(),
                        outbound_capacity,
                    ));
                }
                Err(e) => error!("Accept failed: {}", e),
            },
            _ = &mut shutdown => break,
        }
    }
}

/// Runs one socket: a reader feeding the hub and a writer draining this
/// connection's bounded outbound queue.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection: ConnectionId,
    events: mpsc::UnboundedSender<HubEvent>,
    outbound_capacity: usize,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    info!("Connection {} established from {}", connection, addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<Arc<str>>(outbound_capacity.max(1));

    if events
        .send(HubEvent::Opened {
            connection,
            outbound: tx,
        })
        .is_err()
    {
        return;
    }

    // Ends when the hub drops our sender; the socket is closed after the
    // queued frames are flushed.
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = ws_sender.send(Message::Text(text.to_string())).await {
                debug!("Failed to send to {}: {}", connection, e);
                return;
            }
        }
        let _ = ws_sender.close().await;
    });

    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        warn!("Error receiving from {}: {}", connection, e);
                        break;
                    }
                    None => break,
                };
                match frame {
                    Message::Text(text) => {
                        if events.send(HubEvent::Text { connection, text }).is_err() {
                            break;
                        }
                    }
                    Message::Binary(_) => {
                        warn!("Binary frame from {}; closing", connection);
                        break;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            _ = &mut send_task => break,
        }
    }

    let _ = events.send(HubEvent::Closed { connection });
    send_task.abort();
    info!("Connection {} closed", connection);
}
