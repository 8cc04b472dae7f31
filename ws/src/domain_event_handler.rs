use crate::connection::ConnectionId;
use crate::message::{kind, Envelope};
use crate::Hub;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler};
use log::*;
use serde::Serialize;
use serde_json::json;

/// Handles domain events by turning them into envelopes and broadcasting them
/// to every live connection.
///
/// Collaborators that change posts publish a `DomainEvent`; they never talk to
/// the hub directly and nothing comes back to them.
pub struct WsDomainEventHandler {
    hub: Hub,
}

impl WsDomainEventHandler {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    fn broadcast<T: Serialize>(&self, envelope: Envelope<T>, exclude: Option<ConnectionId>) {
        match self.hub.broadcast(&envelope, exclude.as_ref()) {
            Ok(()) => debug!("Broadcast {} envelope", envelope.kind),
            Err(e) => warn!("Dropped {} envelope: {e}", envelope.kind),
        }
    }
}

#[async_trait]
impl EventHandler for WsDomainEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        let exclude = event.exclude_connection().map(ConnectionId::from);

        match event {
            DomainEvent::PostCreated { post, .. } => {
                self.broadcast(Envelope::new(kind::POST_CREATED, post), exclude);
            }
            DomainEvent::PostUpdated { post, .. } => {
                self.broadcast(Envelope::new(kind::POST_UPDATED, post), exclude);
            }
            DomainEvent::PostDeleted { post_id, .. } => {
                self.broadcast(
                    Envelope::new(kind::POST_DELETED, json!({ "id": post_id })),
                    exclude,
                );
            }
        }
    }
}
