use config::Config;
use events::EventPublisher;
use log::info;
use std::sync::Arc;
use ws::domain_event_handler::WsDomainEventHandler;
use ws::Hub;

pub mod config;
pub mod logging;

/// Builds the process-wide hub from configuration.
pub fn init_hub(config: &Config) -> Hub {
    info!(
        "WebSocket origin policy: {}",
        if config.ws_allow_any_origin {
            "any origin (explicitly enabled)".to_string()
        } else {
            format!("allow-list {:?}", config.allowed_origins)
        }
    );
    Hub::new(config.hub_options())
}

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub hub: Hub,
    pub event_publisher: EventPublisher,
}

impl AppState {
    /// Wires the hub into the event publisher so that published domain events
    /// reach live connections.
    pub fn new(app_config: Config, hub: &Hub) -> Self {
        let event_publisher = EventPublisher::new()
            .with_handler(Arc::new(WsDomainEventHandler::new(hub.clone())));

        Self {
            config: app_config,
            hub: hub.clone(),
            event_publisher,
        }
    }
}
