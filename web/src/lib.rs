use log::*;
use std::future::Future;
use tokio::net::TcpListener;

pub use service::AppState;

mod controller;
pub mod error;
pub mod router;
mod websocket;

/// Binds the configured interface and port and serves the router until
/// `shutdown` resolves.
pub async fn init_server<F>(app_state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server_url = format!(
        "{}:{}",
        app_state.config.interface(),
        app_state.config.port
    );
    let listener = TcpListener::bind(&server_url).await?;

    info!("Server starting... listening for connections on http://{server_url}");

    axum::serve(listener, router::define_routes(app_state))
        .with_graceful_shutdown(shutdown)
        .await
}
