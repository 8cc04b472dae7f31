use bytes::Bytes;
use log::*;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::connection::{BackpressurePolicy, Connection, ConnectionId, Enqueue};
use crate::error::{Error, ErrorKind, RegisterError};
use crate::message::Envelope;

/// Settings applied to every connection the hub accepts.
#[derive(Clone, Debug)]
pub struct HubOptions {
    /// Messages buffered per connection before the backpressure policy applies.
    pub queue_capacity: usize,
    pub backpressure: BackpressurePolicy,
    /// Upper bound on a single socket write; exceeding it disconnects the peer.
    pub write_timeout: Duration,
    /// Keepalive ping period, `None` to disable.
    pub ping_interval: Option<Duration>,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            backpressure: BackpressurePolicy::Disconnect,
            write_timeout: Duration::from_secs(10),
            ping_interval: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    shutting_down: bool,
}

struct Inner {
    options: HubOptions,
    registry: Mutex<Registry>,
}

/// Process-wide coordinator owning the live set of connections.
///
/// Cheap to clone; every clone refers to the same live set. Registration,
/// unregistration and the enumeration done by a broadcast all take the same
/// lock, so a broadcast never observes a half-mutated set. The lock is never
/// held across an await or a socket write.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<Inner>,
}

impl Hub {
    pub fn new(options: HubOptions) -> Self {
        info!(
            "Starting hub: queue_capacity={}, backpressure={}, write_timeout={:?}, ping_interval={:?}",
            options.queue_capacity, options.backpressure, options.write_timeout, options.ping_interval
        );
        Self {
            inner: Arc::new(Inner {
                options,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    pub fn options(&self) -> &HubOptions {
        &self.inner.options
    }

    pub(crate) fn downgrade(&self) -> WeakHub {
        WeakHub {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Makes `connection` a broadcast target.
    ///
    /// On rejection the connection is returned inside the error and the caller
    /// is responsible for closing it.
    pub fn register(&self, connection: Connection) -> Result<ConnectionId, RegisterError> {
        let id = connection.id();
        let mut registry = self.inner.registry.lock();

        if registry.shutting_down {
            warn!("Rejecting connection {id}: hub is shutting down");
            return Err(RegisterError {
                error_kind: ErrorKind::ShutdownInProgress,
                connection,
            });
        }
        if registry.connections.contains_key(&id) {
            error!("Rejecting connection {id}: already registered");
            return Err(RegisterError {
                error_kind: ErrorKind::RegistrationConflict,
                connection,
            });
        }

        connection.mark_registered();
        registry.connections.insert(id, connection);
        let live = registry.connections.len();
        drop(registry);

        info!("Registered connection {id} ({live} live)");
        Ok(id)
    }

    /// Removes the connection if it is live and closes it. Returns whether this
    /// call did the removal; unregistering an absent connection is a no-op.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = self.inner.registry.lock().connections.remove(id);

        match removed {
            Some(connection) => {
                info!("Unregistered connection {id}");
                // The drain task finishes on its own; nobody waits for it here
                // because this may run on the drain task itself.
                drop(connection.close());
                true
            }
            None => false,
        }
    }

    /// Serializes `envelope` once and offers it to every live connection except
    /// `exclude`. Does not wait for delivery.
    pub fn broadcast<T: Serialize>(
        &self,
        envelope: &Envelope<T>,
        exclude: Option<&ConnectionId>,
    ) -> Result<(), Error> {
        let payload = envelope.to_bytes().inspect_err(|e| {
            error!("Failed to serialize {} envelope: {e}", envelope.kind);
        })?;
        self.broadcast_bytes(payload, exclude)
    }

    /// Fans already-serialized bytes out to every live connection except
    /// `exclude`.
    pub fn broadcast_bytes(&self, payload: Bytes, exclude: Option<&ConnectionId>) -> Result<(), Error> {
        let evicted = {
            let mut registry = self.inner.registry.lock();
            if registry.shutting_down {
                return Err(Error::new(ErrorKind::ShutdownInProgress));
            }

            let mut evicted_ids = Vec::new();
            for (id, connection) in registry.connections.iter() {
                if exclude == Some(id) {
                    continue;
                }
                match connection.enqueue(payload.clone()) {
                    Enqueue::Enqueued | Enqueue::Dropped => {}
                    Enqueue::Saturated => {
                        warn!("Outbound queue full for connection {id}, disconnecting");
                        evicted_ids.push(*id);
                    }
                    Enqueue::Closed => {
                        debug!("Connection {id} stopped draining, removing");
                        evicted_ids.push(*id);
                    }
                }
            }

            evicted_ids
                .into_iter()
                .filter_map(|id| registry.connections.remove(&id))
                .collect::<Vec<_>>()
        };

        for connection in evicted {
            drop(connection.close());
        }
        Ok(())
    }

    pub fn connection_count(&self) -> usize {
        self.inner.registry.lock().connections.len()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.inner.registry.lock().connections.contains_key(id)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.registry.lock().shutting_down
    }

    /// Stops accepting connections and broadcasts, closes every live
    /// connection and waits for all drain tasks to finish. Safe to call more
    /// than once.
    pub async fn shutdown(&self) {
        let connections: Vec<Connection> = {
            let mut registry = self.inner.registry.lock();
            registry.shutting_down = true;
            registry.connections.drain().map(|(_, connection)| connection).collect()
        };

        info!("Shutting down hub, closing {} connection(s)", connections.len());

        let drains = connections.into_iter().map(Connection::close);
        for result in futures::future::join_all(drains).await {
            if let Err(e) = result {
                warn!("Drain task ended abnormally: {e}");
            }
        }

        info!("Hub shut down");
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubOptions::default())
    }
}

/// Non-owning handle held by drain tasks. The live set is freed once every
/// `Hub` clone is dropped, whether or not `shutdown` ran.
#[derive(Clone)]
pub(crate) struct WeakHub {
    inner: Weak<Inner>,
}

impl WeakHub {
    pub(crate) fn upgrade(&self) -> Option<Hub> {
        self.inner.upgrade().map(|inner| Hub { inner })
    }
}
