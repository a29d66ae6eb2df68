mod config;
mod keepalive;
mod network;
mod player;
mod state;
mod streamer;
mod visibility;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chisel_protocol_core::InternalPacket;
use chisel_world::{FlatGenerator, World};
use config::ServerConfig;
use state::ServerState;
use tokio::net::TcpListener;
use tracing::{error, info};

/// One server tick.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Chisel server...");

    let config = ServerConfig::load(Path::new("config/server.toml"))?;
    info!(
        "Config loaded: bind={}:{}, max_players={}, view_distance={}",
        config.bind, config.port, config.max_players, config.view_distance
    );

    let world = Arc::new(World::new(Arc::new(FlatGenerator::new())));
    let state = Arc::new(ServerState::new(config.clone(), world));

    // Bind failure propagates through anyhow and exits non-zero.
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let ctrlc_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal");
        let _ = ctrlc_tx.send(true);
    });

    let ticker_state = state.clone();
    let mut ticker_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        run_tick_loop(ticker_state, &mut ticker_shutdown).await;
    });

    tokio::select! {
        _ = accept_loop(listener, state) => {
            error!("Accept loop exited unexpectedly");
        }
        _ = shutdown_rx.changed() => {
            info!("Server shut down cleanly");
        }
    }

    Ok(())
}

async fn accept_loop(listener: TcpListener, state: Arc<ServerState>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                info!("New connection from {}", peer);
                if let Err(e) = socket.set_nodelay(true) {
                    error!("Could not set TCP_NODELAY for {}: {}", peer, e);
                }
                let state = state.clone();
                tokio::spawn(async move {
                    network::handle_connection(socket, state).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Advance world time once per tick and publish Update Time to every
/// connection in PLAY.
async fn run_tick_loop(
    state: Arc<ServerState>,
    shutdown_rx: &mut tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                let (world_age, time_of_day) = state.world.tick_time();
                state.broadcast(&InternalPacket::UpdateTime {
                    world_age,
                    time_of_day,
                    time_advances: true,
                });
            }
        }
    }
}
