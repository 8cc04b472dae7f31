//! Real-time connection hub.
//!
//! Tracks which WebSocket connections are open and fans application events
//! out to all of them.
//!
//! # Architecture
//!
//! - **Single lock**: `Hub` keeps its live set behind one mutex that every
//!   register, unregister and broadcast takes, so a broadcast always works on
//!   a consistent snapshot.
//! - **Worker per connection**: each `Connection` owns a bounded queue and a
//!   drain task that is the only writer to its socket. The hub never does I/O.
//! - **Bounded backpressure**: a full queue either drops the new message or
//!   disconnects the peer (`BackpressurePolicy`); a broadcast never waits.
//! - **Ephemeral messages**: best-effort, at-most-once. A peer that is offline
//!   misses the event and reloads fresh data on reconnect.
//!
//! # Message Flow
//!
//! 1. Client opens `/ws`; the web layer upgrades it, wraps the write half in a
//!    `Connection` and calls `Hub::register`.
//! 2. A collaborator changes a post and publishes a `DomainEvent`.
//! 3. `WsDomainEventHandler` turns it into an `Envelope` and calls
//!    `Hub::broadcast`, which serializes once and enqueues the bytes on every
//!    connection.
//! 4. Each drain task writes its queue to its socket.
//!
//! # Example: broadcasting directly
//!
//! ```rust,ignore
//! use ws::message::{kind, Envelope};
//!
//! app_state.hub.broadcast(&Envelope::new(kind::POST_CREATED, &post), None)?;
//! ```
//!
//! # Modules
//!
//! - `connection`: `Connection` adapter, drain task, `ConnectionId`, state machine
//! - `hub`: `Hub` registry and broadcast coordinator
//! - `message`: wire `Envelope`
//! - `domain_event_handler`: bridge from `events::DomainEvent` to broadcasts

pub mod connection;
pub mod domain_event_handler;
pub mod error;
pub mod hub;
pub mod message;

pub use connection::{BackpressurePolicy, Connection, ConnectionId, ConnectionState, ConnectionStatus};
pub use error::{Error, ErrorKind, RegisterError};
pub use hub::{Hub, HubOptions};
pub use message::Envelope;
