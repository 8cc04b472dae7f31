use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Sink, SinkExt};
use log::*;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

use crate::hub::{Hub, WeakHub};

/// Unique identifier for a connection (server-generated, never derived from
/// the peer address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a connection does with a message when its outbound queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Discard the message that did not fit; the peer misses it.
    DropNewest,
    /// Treat the peer as failed and remove it from the hub.
    Disconnect,
}

#[derive(Debug, PartialEq, Eq)]
pub struct BackpressurePolicyParseError;

impl fmt::Display for BackpressurePolicyParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "expected one of: drop-newest, disconnect")
    }
}

impl std::error::Error for BackpressurePolicyParseError {}

impl FromStr for BackpressurePolicy {
    type Err = BackpressurePolicyParseError;
    fn from_str(policy: &str) -> Result<BackpressurePolicy, Self::Err> {
        match policy.to_lowercase().as_str() {
            "drop-newest" => Ok(BackpressurePolicy::DropNewest),
            "disconnect" => Ok(BackpressurePolicy::Disconnect),
            _ => Err(BackpressurePolicyParseError),
        }
    }
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackpressurePolicy::DropNewest => write!(f, "drop-newest"),
            BackpressurePolicy::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Lifecycle of a connection: `Connecting → Registered → Draining → Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Drain task running, not yet a broadcast target.
    Connecting,
    Registered,
    /// Queue closed; remaining messages and the close frame are being written.
    Draining,
    /// Terminal.
    Closed,
}

/// Read-only view of a connection's state that outlives the connection itself.
#[derive(Clone, Debug)]
pub struct ConnectionStatus(watch::Receiver<ConnectionState>);

impl ConnectionStatus {
    pub fn current(&self) -> ConnectionState {
        *self.0.borrow()
    }

    /// Resolves once the drain task has finished.
    pub async fn closed(&mut self) {
        // An error means the drain task is gone, which is closed as well.
        let _ = self
            .0
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }
}

/// Outcome of offering a message to a connection's queue.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Enqueue {
    Enqueued,
    /// Queue full under `DropNewest`; the message was discarded.
    Dropped,
    /// Queue full under `Disconnect`; the hub must remove this connection.
    Saturated,
    /// The drain task is gone; the hub must remove this connection.
    Closed,
}

#[derive(Debug)]
enum DeliveryFailure {
    Write(String),
    Timeout(Duration),
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeliveryFailure::Write(reason) => write!(f, "write failed: {reason}"),
            DeliveryFailure::Timeout(limit) => write!(f, "write timed out after {limit:?}"),
        }
    }
}

/// One open duplex connection.
///
/// Owns the sending side of a bounded queue whose receiving side lives in a
/// dedicated drain task, started at construction, which is the only thing that
/// writes to the socket. Only the hub enqueues; see `Hub::broadcast`.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    queue: mpsc::Sender<Bytes>,
    policy: BackpressurePolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    drain: JoinHandle<()>,
}

impl Connection {
    /// Wraps the write half of a connection and starts its drain task.
    pub fn new<S>(hub: &Hub, sink: S) -> Self
    where
        S: Sink<Message> + Send + Unpin + 'static,
        S::Error: fmt::Display + Send,
    {
        Self::with_id(ConnectionId::new(), hub, sink)
    }

    pub fn with_id<S>(id: ConnectionId, hub: &Hub, sink: S) -> Self
    where
        S: Sink<Message> + Send + Unpin + 'static,
        S::Error: fmt::Display + Send,
    {
        let options = hub.options();
        let (queue, receiver) = mpsc::channel(options.queue_capacity.max(1));
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state);

        let drain = tokio::spawn(drain(
            DrainTask {
                id,
                hub: hub.downgrade(),
                state: Arc::clone(&state),
                write_timeout: options.write_timeout,
                ping_interval: options.ping_interval,
            },
            receiver,
            sink,
        ));

        Self {
            id,
            queue,
            policy: options.backpressure,
            state,
            drain,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus(self.state.subscribe())
    }

    /// Closes the queue and hands back the drain task. Whatever is still queued
    /// is written first, then a close frame, then the sink is closed.
    ///
    /// Consumes the connection, so it can only happen once.
    pub fn close(self) -> JoinHandle<()> {
        self.state.send_if_modified(|state| match state {
            ConnectionState::Connecting | ConnectionState::Registered => {
                *state = ConnectionState::Draining;
                true
            }
            _ => false,
        });
        drop(self.queue);
        self.drain
    }

    pub(crate) fn mark_registered(&self) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Registered;
                true
            } else {
                false
            }
        });
    }

    /// Never waits: a full queue is resolved by the backpressure policy.
    pub(crate) fn enqueue(&self, payload: Bytes) -> Enqueue {
        match self.queue.try_send(payload) {
            Ok(()) => Enqueue::Enqueued,
            Err(TrySendError::Full(_)) => match self.policy {
                BackpressurePolicy::DropNewest => {
                    warn!("Outbound queue full for connection {}, dropping message", self.id);
                    Enqueue::Dropped
                }
                BackpressurePolicy::Disconnect => Enqueue::Saturated,
            },
            Err(TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }
}

struct DrainTask {
    id: ConnectionId,
    hub: WeakHub,
    state: Arc<watch::Sender<ConnectionState>>,
    write_timeout: Duration,
    ping_interval: Option<Duration>,
}

async fn drain<S>(task: DrainTask, mut queue: mpsc::Receiver<Bytes>, mut sink: S)
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let mut keepalive = task.ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        let frame = tokio::select! {
            next = queue.recv() => match next {
                Some(payload) => Message::Binary(payload),
                None => break,
            },
            _ = tick(&mut keepalive) => Message::Ping(Bytes::new()),
        };

        if let Err(failure) = write(&mut sink, frame, task.write_timeout).await {
            warn!(
                "Delivery to connection {} failed ({failure}). Connection will be unregistered.",
                task.id
            );
            // Anything still queued is undeliverable; refuse further messages.
            queue.close();
            if let Some(hub) = task.hub.upgrade() {
                hub.unregister(&task.id);
            }
            task.state.send_replace(ConnectionState::Closed);
            return;
        }
    }

    // Queue closed by the hub and fully drained.
    if let Err(failure) = write(&mut sink, Message::Close(None), task.write_timeout).await {
        debug!("Close frame for connection {} not delivered: {failure}", task.id);
    }
    match tokio::time::timeout(task.write_timeout, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Error closing connection {}: {e}", task.id),
        Err(_) => debug!("Timed out closing connection {}", task.id),
    }
    task.state.send_replace(ConnectionState::Closed);
    debug!("Drain task for connection {} finished", task.id);
}

async fn write<S>(sink: &mut S, frame: Message, limit: Duration) -> Result<(), DeliveryFailure>
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    match tokio::time::timeout(limit, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DeliveryFailure::Write(e.to_string())),
        Err(_) => Err(DeliveryFailure::Timeout(limit)),
    }
}

async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubOptions;
    use futures::channel::mpsc as channel;
    use futures::StreamExt;

    fn hub_with(options: HubOptions) -> Hub {
        Hub::new(options)
    }

    fn quiet_options() -> HubOptions {
        HubOptions {
            ping_interval: None,
            ..HubOptions::default()
        }
    }

    #[test]
    fn test_backpressure_policy_parse() {
        assert_eq!(
            "drop-newest".parse::<BackpressurePolicy>(),
            Ok(BackpressurePolicy::DropNewest)
        );
        assert_eq!(
            "DISCONNECT".parse::<BackpressurePolicy>(),
            Ok(BackpressurePolicy::Disconnect)
        );
        assert_eq!(
            "drop-oldest".parse::<BackpressurePolicy>(),
            Err(BackpressurePolicyParseError)
        );
        assert_eq!(BackpressurePolicy::DropNewest.to_string(), "drop-newest");
    }

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[tokio::test]
    async fn test_new_connection_starts_connecting() {
        let hub = hub_with(quiet_options());
        let (sink, _rx) = channel::unbounded::<Message>();
        let connection = Connection::new(&hub, sink);

        assert_eq!(connection.state(), ConnectionState::Connecting);
        connection.mark_registered();
        assert_eq!(connection.state(), ConnectionState::Registered);
    }

    #[tokio::test]
    async fn test_close_drains_queue_then_sends_close_frame() {
        let hub = hub_with(quiet_options());
        let (sink, mut rx) = channel::unbounded::<Message>();
        let connection = Connection::new(&hub, sink);
        let mut status = connection.status();

        assert_eq!(connection.enqueue(Bytes::from_static(b"one")), Enqueue::Enqueued);
        assert_eq!(connection.enqueue(Bytes::from_static(b"two")), Enqueue::Enqueued);

        let drain = connection.close();
        assert_eq!(status.current(), ConnectionState::Draining);
        drain.await.unwrap();
        status.closed().await;
        assert_eq!(status.current(), ConnectionState::Closed);

        assert_eq!(rx.next().await, Some(Message::Binary(Bytes::from_static(b"one"))));
        assert_eq!(rx.next().await, Some(Message::Binary(Bytes::from_static(b"two"))));
        assert_eq!(rx.next().await, Some(Message::Close(None)));
        assert_eq!(rx.next().await, None);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let hub = hub_with(HubOptions {
            queue_capacity: 1,
            backpressure: BackpressurePolicy::DropNewest,
            write_timeout: Duration::from_secs(60),
            ping_interval: None,
        });
        // A zero-capacity channel that nobody reads: the drain task parks on
        // the second write and the queue backs up behind it.
        let (sink, _rx) = channel::channel::<Message>(0);
        let connection = Connection::new(&hub, sink);

        let mut outcomes = Vec::new();
        for _ in 0..8 {
            outcomes.push(connection.enqueue(Bytes::from_static(b"x")));
            tokio::task::yield_now().await;
        }

        assert!(outcomes.contains(&Enqueue::Dropped));
        assert!(!outcomes.contains(&Enqueue::Saturated));
    }

    #[tokio::test]
    async fn test_full_queue_reports_saturation_under_disconnect() {
        let hub = hub_with(HubOptions {
            queue_capacity: 1,
            backpressure: BackpressurePolicy::Disconnect,
            write_timeout: Duration::from_secs(60),
            ping_interval: None,
        });
        let (sink, _rx) = channel::channel::<Message>(0);
        let connection = Connection::new(&hub, sink);

        let mut outcomes = Vec::new();
        for _ in 0..8 {
            outcomes.push(connection.enqueue(Bytes::from_static(b"x")));
            tokio::task::yield_now().await;
        }

        assert!(outcomes.contains(&Enqueue::Saturated));
        assert!(!outcomes.contains(&Enqueue::Dropped));
    }

    #[tokio::test]
    async fn test_write_failure_closes_connection() {
        let hub = hub_with(quiet_options());
        let (sink, rx) = channel::unbounded::<Message>();
        drop(rx);
        let connection = Connection::new(&hub, sink);
        let mut status = connection.status();

        assert_eq!(connection.enqueue(Bytes::from_static(b"lost")), Enqueue::Enqueued);
        status.closed().await;

        assert_eq!(connection.enqueue(Bytes::from_static(b"late")), Enqueue::Closed);
    }

    #[tokio::test]
    async fn test_stalled_write_times_out() {
        let hub = hub_with(HubOptions {
            queue_capacity: 4,
            backpressure: BackpressurePolicy::Disconnect,
            write_timeout: Duration::from_millis(50),
            ping_interval: None,
        });
        let (sink, _rx) = channel::channel::<Message>(0);
        let connection = Connection::new(&hub, sink);
        let mut status = connection.status();

        connection.enqueue(Bytes::from_static(b"fits in the sink"));
        connection.enqueue(Bytes::from_static(b"parks the drain task"));

        tokio::time::timeout(Duration::from_secs(5), status.closed())
            .await
            .expect("stalled connection should be closed after its write timeout");
    }

    #[tokio::test]
    async fn test_keepalive_sends_ping() {
        let hub = hub_with(HubOptions {
            ping_interval: Some(Duration::from_millis(20)),
            ..HubOptions::default()
        });
        let (sink, mut rx) = channel::unbounded::<Message>();
        let _connection = Connection::new(&hub, sink);

        let frame = tokio::time::timeout(Duration::from_secs(5), rx.next())
            .await
            .unwrap();
        assert!(matches!(frame, Some(Message::Ping(_))));
    }
}
