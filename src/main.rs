use log::*;
use service::{config::Config, logging::Logger, AppState};
use std::time::Duration;
use tokio::signal;
use ws::Hub;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
    }

    info!(
        "Starting up post_feed in {} mode",
        config.runtime_env()
    );

    let hub = service::init_hub(&config);
    let shutdown_timeout = config.shutdown_timeout();
    let app_state = AppState::new(config, &hub);

    // Live connections get a close frame as soon as the signal arrives.
    let shutdown = {
        let hub = hub.clone();
        async move {
            shutdown_signal().await;
            teardown(&hub, shutdown_timeout).await;
        }
    };

    if let Err(e) = web::init_server(app_state, shutdown).await {
        error!("Server error: {e}");
        teardown(&hub, shutdown_timeout).await;
        std::process::exit(1);
    }

    // No-op when the signal path already ran.
    teardown(&hub, shutdown_timeout).await;
    info!("Shut down cleanly");
}

async fn teardown(hub: &Hub, limit: Duration) {
    if tokio::time::timeout(limit, hub.shutdown()).await.is_err() {
        warn!("Gave up waiting for connections to drain after {limit:?}");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
