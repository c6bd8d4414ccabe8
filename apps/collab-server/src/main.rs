//! Collaboration relay server for shared text-mode canvases.
//! One authoritative document, relayed to every connected peer over WebSockets.

mod config;
mod hub;
mod ws;

use clap::Parser;
use collaboration::Relay;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::hub::{Hub, HubEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let document = hub::load_or_create(&config.file)?;
    let relay = Relay::new(document, config.relay_config());

    let listener = TcpListener::bind((config.bind.as_str(), config.port)).await?;
    info!(
        "Collaboration server listening on {}:{}",
        config.bind, config.port
    );

    let (events, events_rx) = mpsc::unbounded_channel();
    let hub = Hub::new(relay, config.file.clone(), config.save_interval());
    let hub_task = tokio::spawn(hub.run(events_rx));

    ws::accept_loop(
        listener,
        events.clone(),
        config.outbound_capacity,
        tokio::signal::ctrl_c(),
    )
    .await;
    info!("Interrupt received");

    let _ = events.send(HubEvent::Shutdown);
    hub_task.await??;
    Ok(())
}
