//! Event system infrastructure for the post feed.
//!
//! This crate provides the event system that decouples the components that
//! change posts (REST handlers, background jobs) from the infrastructure that
//! tells live clients about those changes (the WebSocket hub).
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all business events in the system
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies. Post data is carried as serialized JSON values.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier type used for posts and live connections.
pub type Id = Uuid;

/// Domain events that represent business-level changes in the system.
/// These events are emitted after a post operation completes successfully.
///
/// `exclude_connection` lets the originator of a change opt out of receiving
/// its own notification when it is itself connected to the hub. Peers are
/// never told their connection id, so the value must come from a server-side
/// binding between the originating session and its live connection (for
/// example the id returned by `Hub::register` stored on that session), never
/// from request input.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// Emitted when a new post is stored.
    PostCreated {
        /// Complete serialized post (id, content, author).
        post: Value,
        exclude_connection: Option<Id>,
    },
    /// Emitted when a post's content is replaced.
    PostUpdated {
        post: Value,
        exclude_connection: Option<Id>,
    },
    /// Emitted when a post is permanently removed.
    PostDeleted {
        /// Full post is not included since it no longer exists.
        post_id: String,
        exclude_connection: Option<Id>,
    },
}

impl DomainEvent {
    pub fn exclude_connection(&self) -> Option<Id> {
        match self {
            DomainEvent::PostCreated {
                exclude_connection, ..
            }
            | DomainEvent::PostUpdated {
                exclude_connection, ..
            }
            | DomainEvent::PostDeleted {
                exclude_connection, ..
            } => *exclude_connection,
        }
    }
}

/// Trait for handling domain events.
/// Implementations can perform side effects like notifying live connections,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Publish an event to all registered handlers, sequentially.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &DomainEvent) {
            let label = match event {
                DomainEvent::PostCreated { .. } => "created",
                DomainEvent::PostUpdated { .. } => "updated",
                DomainEvent::PostDeleted { .. } => "deleted",
            };
            self.seen.lock().unwrap().push(label.to_string());
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_every_handler_in_order() {
        let first = Arc::new(RecordingHandler::default());
        let second = Arc::new(RecordingHandler::default());
        let publisher = EventPublisher::new()
            .with_handler(first.clone())
            .with_handler(second.clone());

        assert_eq!(publisher.handler_count(), 2);

        publisher
            .publish(DomainEvent::PostCreated {
                post: json!({"id": "p1"}),
                exclude_connection: None,
            })
            .await;
        publisher
            .publish(DomainEvent::PostDeleted {
                post_id: "p1".to_string(),
                exclude_connection: None,
            })
            .await;

        assert_eq!(*first.seen.lock().unwrap(), vec!["created", "deleted"]);
        assert_eq!(*second.seen.lock().unwrap(), vec!["created", "deleted"]);
    }

    #[tokio::test]
    async fn test_publish_without_handlers_is_a_no_op() {
        EventPublisher::default()
            .publish(DomainEvent::PostUpdated {
                post: json!({"id": "p1"}),
                exclude_connection: None,
            })
            .await;
    }

    #[test]
    fn test_exclude_connection_is_exposed_for_every_variant() {
        let id = Uuid::new_v4();
        let event = DomainEvent::PostUpdated {
            post: json!({}),
            exclude_connection: Some(id),
        };
        assert_eq!(event.exclude_connection(), Some(id));
    }
}
