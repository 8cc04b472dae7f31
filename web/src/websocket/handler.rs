use crate::error::{Error, Result};
use crate::AppState;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use futures::StreamExt;
use log::*;
use ws::{Connection, Hub};

/// Upgrade entry point for the live post feed.
///
/// Checks the origin policy before the handshake. A non-UTF-8 `Origin` is
/// refused even when any origin is allowed.
///
/// Ordering: axum sends the `101 Switching Protocols` response before the
/// upgrade callback runs, and `Hub::register` runs inside that callback. A
/// peer can therefore observe the handshake as complete slightly before it is
/// a broadcast target; broadcasts issued in that window do not reach it. Every
/// broadcast issued after `register` returns does, and nothing is written to
/// the socket before registration.
pub(crate) async fn ws_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    upgrade: core::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response> {
    let origin = match headers.get(header::ORIGIN).map(|value| value.to_str()).transpose() {
        Ok(origin) => origin,
        Err(_) => {
            warn!("Rejecting WebSocket upgrade with a non-UTF-8 origin");
            return Err(Error::forbidden_origin("<non-UTF-8>"));
        }
    };
    if !app_state.config.is_ws_origin_allowed(origin) {
        let origin = origin.unwrap_or_default();
        warn!("Rejecting WebSocket upgrade from origin {origin:?}");
        return Err(Error::forbidden_origin(origin));
    }

    if app_state.hub.is_shutting_down() {
        return Err(ws::Error::new(ws::ErrorKind::ShutdownInProgress).into());
    }

    let upgrade = upgrade.map_err(|rejection| {
        warn!("Could not upgrade request to a WebSocket: {rejection}");
        Error::from(rejection)
    })?;

    let hub = app_state.hub.clone();
    Ok(upgrade
        .on_failed_upgrade(|e| warn!("WebSocket handshake failed: {e}"))
        .on_upgrade(move |socket| serve_connection(socket, hub)))
}

async fn serve_connection(socket: WebSocket, hub: Hub) {
    let (sink, mut stream) = socket.split();
    let connection = Connection::new(&hub, sink);
    let mut status = connection.status();

    let id = match hub.register(connection) {
        Ok(id) => id,
        Err(rejected) => {
            warn!("{rejected}");
            if let Err(e) = rejected.into_connection().close().await {
                warn!("Drain task for rejected connection ended abnormally: {e}");
            }
            return;
        }
    };

    // Inbound frames carry nothing the hub acts on; reading only detects the
    // peer going away and lets the socket answer pings.
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Connection {id} closed by peer");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Read error on connection {id}: {e}");
                    break;
                }
            },
            _ = status.closed() => break,
        }
    }

    hub.unregister(&id);
}
