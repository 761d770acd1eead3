use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use trivia_persistence::{GameRepository, connection::connect_and_migrate};
use trivia_relay::{
    channels::ChannelRegistry, config::Config, create_routes, websocket::ConnectionManager,
};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    info!("Starting trivia relay...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let db = match connect_and_migrate(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to connect to database and run migrations: {}", e);
            std::process::exit(1);
        }
    };
    let repository = Arc::new(GameRepository::new(db));
    let connection_manager = Arc::new(ConnectionManager::new());
    let channels = Arc::new(ChannelRegistry::new(config.echo_to_sender));
    if config.echo_to_sender {
        info!("Echoing published events back to their sender");
    }

    let routes = create_routes(
        connection_manager.clone(),
        channels.clone(),
        repository,
        &config,
    );

    // Reap idle connections
    let connection_timeout = Duration::from_secs(config.connection_timeout_seconds);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            for connection in connection_manager
                .cleanup_inactive_connections(connection_timeout)
                .await
            {
                channels.remove_connection(connection);
            }
        }
    });

    let ip = match config.host.parse::<std::net::IpAddr>() {
        Ok(ip) => ip,
        Err(e) => {
            error!("Invalid HOST '{}': {}", config.host, e);
            std::process::exit(1);
        }
    };
    info!("Relay starting on {}:{}", ip, config.port);

    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown((ip, config.port), async {
        shutdown_signal().await;
    });

    info!("Relay started successfully on {}. Press Ctrl+C to stop.", addr);
    server.await;
    info!("Relay shutdown complete.");
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal};
        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                _ => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C");
                    let _ = signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
        }
        info!("Received Ctrl+C, shutting down gracefully...");
    }
}
